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

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use memmap2::{Mmap, MmapOptions};

use crate::errors::{u, SyzygyResult};

/// Separator between directories in a path list.
#[cfg(windows)]
const PATH_SEPARATOR: char = ';';
#[cfg(not(windows))]
const PATH_SEPARATOR: char = ':';

/// A table file, located in one of the directories of a path list and open
/// for memory mapping.
#[derive(Debug)]
pub struct TbFile {
    path: PathBuf,
    file: File,
}

impl TbFile {
    /// Looks for `name` in the directories of the separator-joined `paths`
    /// list and opens the first existing file.
    ///
    /// Example path list: `/tb/wdl345:/tb/wdl6:/tb/dtz345:/tb/dtz6`
    /// (separated by `;` instead of `:` on Windows).
    pub fn find(paths: &str, name: &str) -> Option<TbFile> {
        for dir in paths.split(PATH_SEPARATOR).filter(|dir| !dir.is_empty()) {
            let path = Path::new(dir).join(name);
            if let Ok(file) = File::open(&path) {
                return Some(TbFile { path, file });
            }
        }
        None
    }

    /// Memory-maps the file read-only and validates the 4-byte magic
    /// header. Returns `None` on a magic mismatch, which is reported and
    /// then treated like a missing file.
    ///
    /// # Panics
    ///
    /// Panics when the file size is not congruent to 16 modulo 64 or when
    /// the mapping itself fails. Both conditions mean the deployment is
    /// damaged in a way no probe can recover from.
    pub fn map(self, magic: &[u8; 4]) -> Option<Mapping> {
        let size = match self.file.metadata() {
            Ok(meta) => meta.len(),
            Err(error) => panic!("failed to stat {}: {}", self.path.display(), error),
        };
        if size % 64 != 16 {
            panic!(
                "corrupt tablebase file {} (size {} % 64 != 16)",
                self.path.display(),
                size
            );
        }

        let mmap = match unsafe { MmapOptions::new().map(&self.file) } {
            Ok(mmap) => mmap,
            Err(error) => panic!("could not mmap {}: {}", self.path.display(), error),
        };

        #[cfg(unix)]
        let _ = mmap.advise(memmap2::Advice::Random);

        if mmap.get(..4) != Some(magic.as_slice()) {
            log::error!("corrupted table in file {}", self.path.display());
            return None;
        }

        Some(Mapping { mmap })
    }
}

/// A read-only memory mapping of a table file with bounds-checked readers.
///
/// Header integers are little-endian; the Huffman bit-stream is read as
/// big-endian 32/64-bit words. All readers copy into locals, so unaligned
/// offsets are fine on every platform.
#[derive(Debug)]
pub struct Mapping {
    mmap: Mmap,
}

impl Mapping {
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    fn bytes(&self, ptr: u64, len: usize) -> SyzygyResult<&[u8]> {
        let start = ptr as usize;
        let end = u!(start.checked_add(len));
        Ok(u!(self.mmap.get(start..end)))
    }

    pub fn read_into(&self, ptr: u64, buf: &mut [u8]) -> SyzygyResult<()> {
        buf.copy_from_slice(self.bytes(ptr, buf.len())?);
        Ok(())
    }

    pub fn read_u8(&self, ptr: u64) -> SyzygyResult<u8> {
        Ok(self.bytes(ptr, 1)?[0])
    }

    pub fn read_u16_le(&self, ptr: u64) -> SyzygyResult<u16> {
        Ok(LittleEndian::read_u16(self.bytes(ptr, 2)?))
    }

    pub fn read_u32_le(&self, ptr: u64) -> SyzygyResult<u32> {
        Ok(LittleEndian::read_u32(self.bytes(ptr, 4)?))
    }

    pub fn read_u32_be(&self, ptr: u64) -> SyzygyResult<u32> {
        Ok(BigEndian::read_u32(self.bytes(ptr, 4)?))
    }

    pub fn read_u64_be(&self, ptr: u64) -> SyzygyResult<u64> {
        Ok(BigEndian::read_u64(self.bytes(ptr, 8)?))
    }

    /// Reads a symbol pair node: 12 bits for the left child, 12 bits for
    /// the right child, packed into 3 bytes.
    pub fn read_lr(&self, ptr: u64) -> SyzygyResult<(u16, u16)> {
        let buf = self.bytes(ptr, 3)?;
        let left = (u16::from(buf[1] & 0xf) << 8) | u16::from(buf[0]);
        let right = (u16::from(buf[2]) << 4) | (u16::from(buf[1]) >> 4);
        Ok((left, right))
    }
}
