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

use log::info;

use crate::fault_access_point::FAULT_ACCESS_POINT;
use crate::modules::replacement_policy::ReplacementPolicyModule;
use crate::modules::swap_storage::SwapStorageModule;
use crate::pager::page_table::PageTable;
use crate::pager::signals::SignalSetup;
use crate::pager::virtual_region::VirtualRegion;
use crate::pager::{PagerCore, PagerEnv, NUM_PAGES, PAGE_SIZE};
use crate::vmem_config::VMemConfig;

/// For test environment we want to wait until a new pager can be created
#[cfg(test)]
static PAGER_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// A range of virtual memory that behaves like ordinary memory but keeps
/// at most `max_resident` of its pages materialized at once.
///
/// Construction reserves the range, plugs in the swap store and the
/// replacement policy, and wires up the fault and tick channels. From then
/// on, plain loads and stores anywhere in
/// `[start_addr(), end_addr())` work: the pager services every
/// fault behind the caller's back, paging contents in from the store and
/// evicting victims chosen by `P`.
///
/// One instance per process; dropping it restores the process's signal
/// state and releases every mapping.
pub struct VMem<P: ReplacementPolicyModule, S: SwapStorageModule> {
    core: Box<PagerCore<P, S>>,
    signals: Option<SignalSetup>,

    /// For test environment we want to wait until a new pager can be
    /// created
    #[cfg(test)]
    _mutex_guard: std::sync::MutexGuard<'static, ()>,
}

impl<P: ReplacementPolicyModule, S: SwapStorageModule> VMem<P, S> {
    /// Reserves the managed range and turns the pager on.
    ///
    /// `storage` must cover the whole range (`NUM_PAGES * PAGE_SIZE`
    /// bytes); [`FileSwapStorageModule::for_current_process`] builds a
    /// matching one.
    ///
    /// [`FileSwapStorageModule::for_current_process`]:
    /// crate::modules::swap_storage::FileSwapStorageModule::for_current_process
    pub fn new(storage: S, config: VMemConfig) -> Result<Self, ()> {
        assert!(
            config.max_resident > 0 && config.max_resident <= NUM_PAGES,
            "max_resident must be in 1..=NUM_PAGES"
        );
        assert!(
            storage.get_max_size() >= NUM_PAGES * PAGE_SIZE,
            "swap storage does not cover the managed range"
        );

        // for test environment wait until a new pager can be created
        // (until FAULT_ACCESS_POINT is unset)
        #[cfg(test)]
        let mutex_guard = PAGER_MUTEX.lock().map_err(|_| {
            println!("Error while locking PAGER_MUTEX! This normally happens if one thread panics and still has access to a VMem!");
        })?;

        let host_page_size = unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) };
        if host_page_size != PAGE_SIZE as i64 {
            log::error!(
                "host page size is {} but the pager is built for {}",
                host_page_size,
                PAGE_SIZE
            );
            return Err(());
        }

        let region = VirtualRegion::reserve()?;
        let policy = P::init(config.max_resident)?;

        info!(
            "\"Physical memory\" is in the range {:p}..{:p} ({} pages total, {} maximum resident)",
            region.start(),
            region.end(),
            NUM_PAGES,
            config.max_resident
        );

        let mut core = Box::new(PagerCore {
            env: PagerEnv {
                region,
                page_table: PageTable::new(),
                storage,
                max_resident: config.max_resident,
                resident_count: 0,
                num_faults: 0,
                num_loads: 0,
                num_writebacks: 0,
            },
            policy,
        });

        let core_ptr = core.as_mut() as *mut PagerCore<P, S> as *mut ();
        unsafe { FAULT_ACCESS_POINT.set(core_ptr, dispatch_fault::<P, S>, dispatch_tick::<P, S>)? };

        let signals = match SignalSetup::install() {
            Ok(signals) => signals,
            Err(()) => {
                let _ = FAULT_ACCESS_POINT.unset();
                return Err(());
            }
        };

        Ok(Self {
            core,
            signals: Some(signals),
            #[cfg(test)]
            _mutex_guard: mutex_guard,
        })
    }

    /// First address of the managed range.
    pub fn start_addr(&self) -> *mut u8 {
        self.core.env.region.start()
    }

    /// One past the last address of the managed range.
    pub fn end_addr(&self) -> *mut u8 {
        self.core.env.region.end()
    }

    /// In-range faults serviced so far. Counts access promotions too, so
    /// this is always at least [`num_loads`](Self::num_loads).
    pub fn num_faults(&self) -> u64 {
        self.core.env.num_faults
    }

    /// Pages checked out of the swap store so far. This is the number a
    /// replacement policy tries to keep small.
    pub fn num_loads(&self) -> u64 {
        self.core.env.num_loads
    }

    /// Dirty pages written back to the swap store so far.
    pub fn num_writebacks(&self) -> u64 {
        self.core.env.num_writebacks
    }

    /// Pages currently resident.
    pub fn resident_pages(&self) -> usize {
        self.core.env.resident_count
    }

    pub fn max_resident(&self) -> usize {
        self.core.env.max_resident
    }
}

impl<P: ReplacementPolicyModule, S: SwapStorageModule> Drop for VMem<P, S> {
    fn drop(&mut self) {
        // silence both channels before touching the core, then release
        // every mapping; the swap file is already unlinked and dies with
        // its handle
        if let Some(signals) = self.signals.take() {
            signals.uninstall();
        }

        if FAULT_ACCESS_POINT.unset().is_err() {
            log::error!("fault access point was busy during teardown");
        }

        self.core.release_resident_pages();

        log::debug!(
            "pager teardown: {} faults, {} loads, {} write-backs",
            self.core.env.num_faults,
            self.core.env.num_loads,
            self.core.env.num_writebacks
        );
    }
}

unsafe fn dispatch_fault<P: ReplacementPolicyModule, S: SwapStorageModule>(
    core: *mut (),
    addr: usize,
    code: i32,
) {
    let core = &mut *(core as *mut PagerCore<P, S>);
    core.handle_fault(addr, code);
}

unsafe fn dispatch_tick<P: ReplacementPolicyModule, S: SwapStorageModule>(core: *mut ()) {
    let core = &mut *(core as *mut PagerCore<P, S>);
    core.handle_tick();
}
