// This file is part of the shakmaty-tb library.
// Copyright (C) 2017-2022 Niklas Fiekas <niklas.fiekas@backscattering.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

use std::{error::Error, fmt, io};

use crate::material::Material;

/// A [`Result`] type for tablebase probes.
pub type SyzygyResult<T> = Result<T, SyzygyError>;

/// Error when probing a table.
#[derive(Debug)]
pub enum SyzygyError {
    /// Position has castling rights, but tables do not contain positions
    /// with castling rights.
    Castling,
    /// Position has too many pieces. Tables only support up to 7 pieces.
    TooManyPieces,
    /// Required table not present on disk.
    MissingTable {
        material: Material,
    },
    /// I/O error while reading a table.
    Read {
        error: io::Error,
    },
    /// Table file has unexpected magic header bytes.
    Magic,
    /// Corrupted table.
    CorruptedTable {
        file: &'static str,
        line: u32,
    },
}

impl fmt::Display for SyzygyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyzygyError::Castling => {
                f.write_str("syzygy tables do not contain positions with castling rights")
            }
            SyzygyError::TooManyPieces => {
                f.write_str("syzygy tables only contain positions with up to 7 pieces")
            }
            SyzygyError::MissingTable { material } => {
                write!(f, "required table not found: {material}")
            }
            SyzygyError::Read { error } => write!(f, "i/o error when reading a table: {error}"),
            SyzygyError::Magic => f.write_str("table file has invalid magic bytes"),
            SyzygyError::CorruptedTable { file, line } => {
                write!(f, "corrupted table (detected in {file} l. {line})")
            }
        }
    }
}

impl Error for SyzygyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SyzygyError::Read { error } => Some(error),
            _ => None,
        }
    }
}

impl From<io::Error> for SyzygyError {
    fn from(error: io::Error) -> SyzygyError {
        match error.kind() {
            io::ErrorKind::UnexpectedEof => SyzygyError::CorruptedTable {
                file: file!(),
                line: line!(),
            },
            _ => SyzygyError::Read { error },
        }
    }
}

/// Return a `CorruptedTable` error.
macro_rules! throw {
    () => {
        return Err($crate::errors::SyzygyError::CorruptedTable {
            file: file!(),
            line: line!(),
        })
    };
}

/// Unwrap an `Option` or return a `CorruptedTable` error.
macro_rules! u {
    ($e:expr) => {
        match $e {
            Some(ok) => ok,
            None => $crate::errors::throw!(),
        }
    };
}

/// Ensure that a condition holds. Otherwise return a `CorruptedTable` error.
macro_rules! ensure {
    ($cond:expr) => {
        if !$cond {
            $crate::errors::throw!();
        }
    };
}

pub(crate) use {ensure, throw, u};
