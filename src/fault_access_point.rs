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

use try_lock::TryLock;

use crate::util;

/// The one process-wide handle the signal handlers can reach.
///
/// Signal handlers cannot carry user data, so the live pager registers
/// itself here at init and unregisters at teardown. Everything stored is
/// type-erased: the facade monomorphizes the two dispatch functions for
/// its concrete policy/storage pair and hands them over together with the
/// core pointer.
pub(crate) static FAULT_ACCESS_POINT: FaultAccessPoint = FaultAccessPoint::empty();

/// How long the fault dispatcher is willing to spin on the lock before
/// declaring the fault unserviceable.
const FAULT_LOCK_SPIN_LIMIT: usize = 1 << 16;

pub(crate) struct FaultAccessPoint {
    inner: TryLock<Option<FaultAccessPointInner>>,
}

struct FaultAccessPointInner {
    core: *mut (),
    dispatch_fault: unsafe fn(*mut (), usize, i32),
    dispatch_tick: unsafe fn(*mut ()),
}

impl FaultAccessPoint {
    pub(crate) const fn empty() -> Self {
        Self {
            inner: TryLock::new(None),
        }
    }

    /// Registers a live pager core.
    ///
    /// Fails if another pager is already registered; there is exactly one
    /// managed range per process.
    ///
    /// ### Safety
    ///
    /// `core` must stay valid (and must not move) until `unset` returns.
    pub(crate) unsafe fn set(
        &self,
        core: *mut (),
        dispatch_fault: unsafe fn(*mut (), usize, i32),
        dispatch_tick: unsafe fn(*mut ()),
    ) -> Result<(), ()> {
        // should not fail: only init/teardown take this lock from regular
        // code, and the handlers only run while a pager is registered
        let mut guard = self.inner.try_lock().ok_or(())?;

        if guard.is_some() {
            // already in use
            return Err(());
        }

        *guard = Some(FaultAccessPointInner {
            core,
            dispatch_fault,
            dispatch_tick,
        });

        Ok(())
    }

    pub(crate) fn unset(&self) -> Result<(), ()> {
        let mut guard = self.inner.try_lock().ok_or(())?;
        *guard = None;

        Ok(())
    }

    /// Services one `SIGSEGV`.
    ///
    /// A fault cannot be skipped: user code retries the faulting
    /// instruction the moment the handler returns, so failing to resolve
    /// it here would fault forever. With no pager registered the fault is
    /// a genuine segfault and the process aborts with a diagnostic.
    pub(crate) fn fault(&self, addr: usize, code: i32) {
        let mut spins = 0;
        let guard = loop {
            if let Some(guard) = self.inner.try_lock() {
                break guard;
            }
            spins += 1;
            if spins >= FAULT_LOCK_SPIN_LIMIT {
                util::fault_fatal_addr("fault handler could not reach the pager, fault at", addr);
            }
            core::hint::spin_loop();
        };

        match guard.as_ref() {
            Some(inner) => unsafe { (inner.dispatch_fault)(inner.core, addr, code) },
            None => util::fault_fatal_addr("segmentation fault at address", addr),
        }
    }

    /// Services one timer tick.
    ///
    /// If the point is busy (init or teardown in progress) the beat is
    /// simply skipped; aging is approximate anyway.
    pub(crate) fn tick(&self) {
        let guard = match self.inner.try_lock() {
            Some(guard) => guard,
            None => return,
        };

        if let Some(inner) = guard.as_ref() {
            unsafe { (inner.dispatch_tick)(inner.core) }
        }
    }
}

unsafe impl Send for FaultAccessPoint {}
unsafe impl Sync for FaultAccessPoint {}
