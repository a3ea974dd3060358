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

//! Probe Syzygy endgame tablebases.
//!
//! Syzygy tables allow optimal play under the 50-move rule for positions
//! with up to 7 pieces. The tables come in pairs: WDL tables
//! (win/draw/loss information, probed during search) and DTZ tables
//! (distance to the next zeroing move, probed at the root).
//!
//! The [`Tablebase`] catalog is populated once by scanning a list of
//! directories for table files. Files are memory mapped lazily on first
//! probe; probing itself is thread-safe and does not allocate on the hot
//! path beyond the first access to each table.
//!
//! # Example
//!
//! ```no_run
//! use shakmaty::{fen::Fen, CastlingMode, Chess};
//! use shakmaty_tb::{Tablebase, Wdl};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut tables = Tablebase::new();
//! tables.init("/opt/syzygy/wdl345:/opt/syzygy/dtz345");
//!
//! let pos: Chess = "4k3/8/8/8/8/8/8/R3K3 w - - 0 1"
//!     .parse::<Fen>()?
//!     .into_position(CastlingMode::Standard)?;
//!
//! let (wdl, _state) = tables.probe_wdl(&pos)?;
//! assert_eq!(wdl, Wdl::Win);
//! # Ok(())
//! # }
//! ```
//!
//! # Errors
//!
//! Probes report missing tables, positions outside the tablebase domain
//! and corrupted files as [`SyzygyError`]. Damaged deployments (truncated
//! files, failed mappings, an overfull catalog) panic, since no probe can
//! recover from them.

#![doc(html_root_url = "https://docs.rs/shakmaty-tb/0.1.0")]
#![warn(missing_debug_implementations)]

mod errors;
mod filesystem;
mod lazy;
mod material;
mod table;
mod tablebase;
mod types;

pub use crate::{
    errors::{SyzygyError, SyzygyResult},
    material::{Material, MaterialSide, ParseMaterialError},
    tablebase::{RootMove, Tablebase},
    types::{Dtz, Pieces, ProbeState, Syzygy, TableFormat, Wdl, MAX_PIECES},
};
