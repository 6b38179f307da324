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

//! End-to-end scenarios against a live pager: real reserved range, real
//! faults, real swap file.
//!
//! All scenarios run on the FIFO policy. Its tick hook is a no-op, which
//! keeps the asynchronous timer harmless while the test harness runs on
//! several threads; CLOCK/LRU aging is covered deterministically in its
//! own unit tests.

use crate::modules::replacement_policy::FifoReplacementPolicyModule;
use crate::modules::swap_storage::{test::get_test_storage, FileSwapStorageModule};
use crate::{VMem, VMemConfig, NUM_PAGES, PAGE_SIZE};


type FifoVMem = VMem<FifoReplacementPolicyModule, FileSwapStorageModule>;

fn get_test_pager(test_name: &str, max_resident: usize) -> FifoVMem {
    let _ = env_logger::builder().is_test(true).try_init();

    let storage = get_test_storage(test_name, NUM_PAGES * PAGE_SIZE);
    VMem::new(storage, VMemConfig { max_resident }).unwrap()
}

/// Reads one byte out of the managed range, faulting as needed.
fn read_byte(pager: &FifoVMem, page: usize, offset: usize) -> u8 {
    assert!(page < NUM_PAGES && offset < PAGE_SIZE);
    unsafe { core::ptr::read_volatile(pager.start_addr().add(page * PAGE_SIZE + offset)) }
}

/// Writes one byte into the managed range, faulting as needed.
fn write_byte(pager: &FifoVMem, page: usize, offset: usize, value: u8) {
    assert!(page < NUM_PAGES && offset < PAGE_SIZE);
    unsafe {
        core::ptr::write_volatile(pager.start_addr().add(page * PAGE_SIZE + offset), value);
    }
}
