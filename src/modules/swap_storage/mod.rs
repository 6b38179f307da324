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

mod file_storage;

pub use file_storage::FileSwapStorageModule;

/// Backing store for non-resident page contents.
///
/// The pager reads a page's slot when it becomes resident and writes the
/// slot back when a dirty page is evicted. Transfers are exact: a partial
/// read or write surfaces as `Err`, which the fault path treats as fatal.
pub trait SwapStorageModule {
    /// Reads the region `[offset, offset + dest.len())` into `dest`.
    ///
    /// If this call fails, some bytes may already have been written to
    /// `dest`.
    fn read(&mut self, offset: usize, dest: &mut [u8]) -> Result<(), ()>;

    /// Writes `src` to the region `[offset, offset + src.len())`.
    fn write(&mut self, offset: usize, src: &[u8]) -> Result<(), ()>;

    /// Returns the size in bytes of this storage.
    ///
    /// It is illegal to read or write across this border.
    fn get_max_size(&self) -> usize;
}

#[cfg(test)]
pub(crate) mod test {
    use std::path::PathBuf;

    use super::{FileSwapStorageModule, SwapStorageModule};

    pub(crate) fn get_test_storage(test_name: &str, size: usize) -> FileSwapStorageModule {
        let path = PathBuf::from(format!("/tmp/{}.tmp", test_name));
        FileSwapStorageModule::new(&path, size).unwrap()
    }

    pub(crate) fn gen_number(i: usize) -> u8 {
        (i * 3 + (i % 3) * 7 + (i % 11) * 51) as u8
    }

    pub(super) const SWAP_STORAGE_TEST_SIZE: usize = 4096;

    /// test if write saves all data and read restores all of it
    pub(super) fn test_swap_storage_exact<T: SwapStorageModule>(mut module: T) {
        const SUB_TEST_SIZE: usize = SWAP_STORAGE_TEST_SIZE / 32;

        let mut source_slice = [0u8; SWAP_STORAGE_TEST_SIZE];
        for i in 0..SWAP_STORAGE_TEST_SIZE {
            source_slice[i] = gen_number(i);
        }

        let mut test_slice = [0u8; SUB_TEST_SIZE];

        for i in 0..SWAP_STORAGE_TEST_SIZE / SUB_TEST_SIZE {
            let offset = i * SUB_TEST_SIZE;
            test_slice.copy_from_slice(&source_slice[offset..offset + SUB_TEST_SIZE]);
            module.write(offset, &test_slice).unwrap();
        }

        for i in 0..SWAP_STORAGE_TEST_SIZE / SUB_TEST_SIZE {
            let offset = i * SUB_TEST_SIZE;
            module.read(offset, &mut test_slice).unwrap();

            for x in 0..SUB_TEST_SIZE {
                assert_eq!(test_slice[x], source_slice[offset + x]);
            }
        }
    }

    /// a fresh store must read back as all zeroes
    pub(super) fn test_swap_storage_zero_initialized<T: SwapStorageModule>(mut module: T) {
        let mut buffer = [0xffu8; SWAP_STORAGE_TEST_SIZE];
        module.read(0, &mut buffer).unwrap();

        for (i, byte) in buffer.iter().enumerate() {
            assert_eq!(*byte, 0, "fresh slot byte {} is not zero", i);
        }
    }
}
