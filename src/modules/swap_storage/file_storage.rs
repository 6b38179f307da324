/*
 *  Copyright (C) 2025  Markus Elias Gerber
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::{
    fs::{remove_file, File},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use super::SwapStorageModule;
use crate::pager::{NUM_PAGES, PAGE_SIZE};

/// Swap store backed by a plain file.
///
/// The file is created, extended to its full size (so every slot reads as
/// zero) and unlinked right away. From then on it exists only through the
/// retained handle and the kernel reclaims it when the process exits, no
/// matter how the process ends.
pub struct FileSwapStorageModule {
    file: File,

    /// cached file size, so no `metadata` call necessary
    file_size: usize,
}

impl FileSwapStorageModule {
    pub fn new(path: &Path, size: usize) -> std::io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .truncate(true)
            .create(true)
            .open(path)?;

        file.set_len(size as u64)?;

        // unlink immediately; the handle keeps the data alive
        remove_file(path)?;

        log::debug!("created swap store {:?} ({} bytes, unlinked)", path, size);

        Ok(Self {
            file,
            file_size: size,
        })
    }

    /// The swap store of this process: one slot per managed page, at a
    /// pid-specific path.
    pub fn for_current_process() -> std::io::Result<Self> {
        let pid = unsafe { libc::getpid() };
        let path = PathBuf::from(format!("/tmp/vmem_pagedev_{:05}", pid));
        Self::new(&path, NUM_PAGES * PAGE_SIZE)
    }
}

impl SwapStorageModule for FileSwapStorageModule {
    fn read(&mut self, offset: usize, dest: &mut [u8]) -> Result<(), ()> {
        debug_assert!(
            offset + dest.len() <= self.file_size,
            "illegal access, offset: {}, len: {}, file_size: {}",
            offset,
            dest.len(),
            self.file_size
        );

        self.file
            .seek(SeekFrom::Start(offset as u64))
            .map_err(|_| ())?;
        self.file.read_exact(dest).map_err(|_| ())?;

        Ok(())
    }

    fn write(&mut self, offset: usize, src: &[u8]) -> Result<(), ()> {
        debug_assert!(
            offset + src.len() <= self.file_size,
            "illegal access, offset: {}, len: {}, file_size: {}",
            offset,
            src.len(),
            self.file_size
        );

        self.file
            .seek(SeekFrom::Start(offset as u64))
            .map_err(|_| ())?;
        self.file.write_all(src).map_err(|_| ())?;

        Ok(())
    }

    fn get_max_size(&self) -> usize {
        self.file_size
    }
}
