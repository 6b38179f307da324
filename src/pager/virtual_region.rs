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

use core::ptr::null_mut;

use libc::{
    c_void, mmap, mprotect, munmap, MAP_ANONYMOUS, MAP_FAILED, MAP_FIXED, MAP_PRIVATE, PROT_NONE,
};

use super::page_table::PagePerm;
use super::{PageId, NUM_PAGES, PAGE_SIZE};
use crate::util;

/// The reserved span of virtual addresses the pager manages.
///
/// After [`reserve`](VirtualRegion::reserve) the span contains no kernel
/// mappings at all. That absence is load-bearing: the first touch of any
/// page raises `SEGV_MAPERR`, which is what tells the fault router to page
/// it in. Pages are materialized one at a time with `MAP_FIXED` and removed
/// again when evicted.
pub(crate) struct VirtualRegion {
    base: *mut u8,
}

impl VirtualRegion {
    /// Probes the host address space for a free span covering the whole
    /// managed range and leaves it unmapped.
    ///
    /// The kernel picks the address (an anonymous `PROT_NONE` mapping is
    /// created and immediately removed), so the range is valid on any
    /// platform instead of hard-coding a base that might collide with the
    /// heap or shared libraries.
    pub(crate) fn reserve() -> Result<Self, ()> {
        let len = NUM_PAGES * PAGE_SIZE;

        let probe = unsafe {
            mmap(
                null_mut(),
                len,
                PROT_NONE,
                MAP_PRIVATE | MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if probe == MAP_FAILED {
            log::error!("could not probe for a free address range of {} bytes", len);
            return Err(());
        }

        if unsafe { munmap(probe, len) } != 0 {
            log::error!("could not release the probe mapping at {:p}", probe);
            return Err(());
        }

        Ok(Self {
            base: probe as *mut u8,
        })
    }

    pub(crate) fn start(&self) -> *mut u8 {
        self.base
    }

    pub(crate) fn end(&self) -> *mut u8 {
        unsafe { self.base.add(NUM_PAGES * PAGE_SIZE) }
    }

    /// Address of the first byte of `page`.
    pub(crate) fn page_addr(&self, page: PageId) -> *mut u8 {
        debug_assert!(page < NUM_PAGES);
        unsafe { self.base.add(page * PAGE_SIZE) }
    }

    /// Page containing `addr`, or `None` for addresses outside the range.
    pub(crate) fn page_of(&self, addr: usize) -> Option<PageId> {
        let start = self.base as usize;
        let end = self.end() as usize;
        if addr >= start && addr < end {
            Some((addr - start) / PAGE_SIZE)
        } else {
            None
        }
    }

    /// Materializes a private, anonymous, zero-filled read-write mapping at
    /// exactly `page_addr(page)`.
    ///
    /// Runs on the fault path; any failure (including the kernel placing
    /// the mapping elsewhere) aborts the process.
    pub(crate) unsafe fn map_page_rw(&self, page: PageId) {
        let want = self.page_addr(page) as *mut c_void;

        let got = mmap(
            want,
            PAGE_SIZE,
            PagePerm::ReadWrite.to_prot(),
            MAP_FIXED | MAP_PRIVATE | MAP_ANONYMOUS,
            -1,
            0,
        );

        if got == MAP_FAILED {
            util::fault_fatal_addr("mmap failed for page slot at", want as usize);
        }
        if got != want {
            util::fault_fatal_addr("mmap placed page slot away from", want as usize);
        }
    }

    /// Removes the mapping for the single page.
    pub(crate) unsafe fn unmap_page(&self, page: PageId) {
        let addr = self.page_addr(page) as *mut c_void;
        if munmap(addr, PAGE_SIZE) != 0 {
            util::fault_fatal_addr("munmap failed for page slot at", addr as usize);
        }
    }

    /// Applies the kernel protection corresponding to `perm` on the page.
    pub(crate) unsafe fn protect_page(&self, page: PageId, perm: PagePerm) {
        let addr = self.page_addr(page) as *mut c_void;
        if mprotect(addr, PAGE_SIZE, perm.to_prot()) != 0 {
            util::fault_fatal_addr("mprotect failed for page slot at", addr as usize);
        }
    }
}

// The raw base pointer is just an address; nothing is dereferenced without
// a mapping in place.
unsafe impl Send for VirtualRegion {}
