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

pub(crate) mod page_table;
pub(crate) mod signals;
pub(crate) mod virtual_region;

use core::slice;

use static_assertions::const_assert;

use crate::modules::replacement_policy::{PageAgingEnv, ReplacementPolicyModule};
use crate::modules::swap_storage::SwapStorageModule;
use crate::util;
use page_table::{PagePerm, PageTable};
use virtual_region::VirtualRegion;

/// Index of a page in the managed range.
pub type PageId = usize;

/// Size of one managed page. Must equal the host page size; init checks.
pub const PAGE_SIZE: usize = 4096;

/// Number of pages in the managed range.
pub const NUM_PAGES: usize = 64;

/// Cadence of the aging timer in microseconds.
pub(crate) const TICK_INTERVAL_USEC: i64 = 10_000;

const_assert!(PAGE_SIZE.is_power_of_two());
const_assert!(NUM_PAGES > 0);
const_assert!(TICK_INTERVAL_USEC > 0);

/// Everything the paging engine owns except the policy: the reserved
/// range, the page table, the swap store and the counters.
///
/// Bundling these lets the fault router borrow the policy and its
/// environment independently, and it is the object handed to policy aging
/// hooks.
pub(crate) struct PagerEnv<S: SwapStorageModule> {
    pub(crate) region: VirtualRegion,
    pub(crate) page_table: PageTable,
    pub(crate) storage: S,

    pub(crate) max_resident: usize,
    pub(crate) resident_count: usize,

    pub(crate) num_faults: u64,
    pub(crate) num_loads: u64,
    pub(crate) num_writebacks: u64,
}

impl<S: SwapStorageModule> PagerEnv<S> {
    /// Applies `perm` to the kernel mapping and then to the page-table
    /// entry.
    ///
    /// This is the only route through which the two change, and a failed
    /// protection change aborts, so they can never diverge.
    pub(crate) fn set_page_protection(&mut self, page: PageId, perm: PagePerm) {
        unsafe { self.region.protect_page(page, perm) };
        self.page_table.set_permission_bits(page, perm);
    }

    /// Checks a page's slot out of the swap store.
    ///
    /// The page gets a fresh read-write mapping at its fixed address, its
    /// slot bytes are loaded into it, and the entry is rebuilt from zero
    /// with `initial_perm` applied last. Runs on the fault path, so every
    /// failure is fatal.
    pub(crate) fn map_page(&mut self, page: PageId, initial_perm: PagePerm) {
        if self.page_table.is_resident(page) {
            util::fault_fatal("map_page called for a page that is already resident");
        }
        if self.resident_count >= self.max_resident {
            util::fault_fatal("map_page would exceed the resident budget");
        }

        util::fault_debug("mapping in page\n");

        unsafe { self.region.map_page_rw(page) };

        let dst = unsafe { slice::from_raw_parts_mut(self.region.page_addr(page), PAGE_SIZE) };
        if self.storage.read(page * PAGE_SIZE, dst).is_err() {
            util::fault_fatal("swap store read failed or came up short");
        }

        self.page_table.clear_entry(page);
        self.page_table.set_resident(page);
        self.set_page_protection(page, initial_perm);

        self.resident_count += 1;
        self.num_loads += 1;
    }

    /// Checks a page back into the swap store and removes its mapping.
    ///
    /// Only dirty pages are written back. The entry returns to its
    /// post-init state and the page is non-resident afterwards.
    pub(crate) fn unmap_page(&mut self, page: PageId) {
        if !self.page_table.is_resident(page) {
            util::fault_fatal("unmap_page called for a page that is not resident");
        }
        debug_assert!(self.resident_count > 0);

        if self.page_table.is_dirty(page) {
            util::fault_debug("writing back dirty page\n");

            // the kernel has to let us read the bytes we are about to
            // copy out; a revoked page is briefly re-upped to read-only
            self.set_page_protection(page, PagePerm::Read);

            let src = unsafe { slice::from_raw_parts(self.region.page_addr(page), PAGE_SIZE) };
            if self.storage.write(page * PAGE_SIZE, src).is_err() {
                util::fault_fatal("swap store write failed or came up short");
            }
            self.num_writebacks += 1;
        }

        unsafe { self.region.unmap_page(page) };

        self.page_table.clear_entry(page);
        self.resident_count -= 1;
    }
}

impl<S: SwapStorageModule> PageAgingEnv for PagerEnv<S> {
    fn is_page_accessed(&self, page: PageId) -> bool {
        self.page_table.is_accessed(page)
    }

    fn clear_page_accessed(&mut self, page: PageId) {
        self.page_table.clear_accessed(page)
    }

    fn revoke_page_access(&mut self, page: PageId) {
        self.set_page_protection(page, PagePerm::None)
    }
}

/// The paging engine: environment plus the replacement policy.
pub(crate) struct PagerCore<P: ReplacementPolicyModule, S: SwapStorageModule> {
    pub(crate) env: PagerEnv<S>,
    pub(crate) policy: P,
}

impl<P: ReplacementPolicyModule, S: SwapStorageModule> PagerCore<P, S> {
    /// Routes one memory-protection fault.
    ///
    /// `SEGV_MAPERR` pages the faulting page in (evicting a victim first
    /// when the budget is full). `SEGV_ACCERR` climbs the permission
    /// ladder one rung and records what the climb reveals: the first read
    /// sets the accessed bit, the first write the dirty bit. Everything
    /// else is a genuine bug and aborts.
    pub(crate) fn handle_fault(&mut self, addr: usize, code: i32) {
        let page = match self.env.region.page_of(addr) {
            Some(page) => page,
            None => util::fault_fatal_addr("segmentation fault at address", addr),
        };

        self.env.num_faults += 1;

        if code == util::SEGV_MAPERR {
            debug_assert!(self.env.resident_count <= self.env.max_resident);
            if self.env.resident_count == self.env.max_resident {
                let victim = self.policy.choose_and_evict_victim();
                if !self.env.page_table.is_resident(victim) {
                    util::fault_fatal("policy chose a victim that is not resident");
                }
                self.env.unmap_page(victim);
            }

            self.env.map_page(page, PagePerm::None);
            self.policy.page_mapped(page);
            debug_assert_eq!(self.policy.tracked_pages(), self.env.resident_count);
        } else if code == util::SEGV_ACCERR {
            if !self.env.page_table.is_resident(page) {
                util::fault_fatal("access fault on a page without a mapping");
            }

            match self.env.page_table.permission(page) {
                PagePerm::None => {
                    // first read since the last demotion
                    self.env.set_page_protection(page, PagePerm::Read);
                    self.env.page_table.set_accessed(page);
                }
                PagePerm::Read => {
                    // first write since the page was loaded
                    self.env.set_page_protection(page, PagePerm::ReadWrite);
                    self.env.page_table.set_dirty(page);
                }
                PagePerm::ReadWrite => {
                    util::fault_fatal("access fault on a page that is already read-write");
                }
            }
        } else {
            util::fault_fatal_code("unexpected fault code", code);
        }
    }

    /// Timer tick: hand the beat to the policy's aging hook.
    pub(crate) fn handle_tick(&mut self) {
        self.policy.timer_tick(&mut self.env);
    }

    /// Unmaps every page that is still resident, writing dirty ones back.
    ///
    /// Teardown path; pairs each mapping acquired in `map_page` with a
    /// release.
    pub(crate) fn release_resident_pages(&mut self) {
        let resident: Vec<PageId> = self.env.page_table.resident_pages().collect();
        for page in resident {
            self.env.unmap_page(page);
        }
    }
}
