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

use core::mem;
use core::ptr::null_mut;

use libc::{
    c_int, c_void, itimerval, sigaction, siginfo_t, timeval, ITIMER_REAL, SA_ONSTACK, SA_SIGINFO,
    SIGALRM, SIGSEGV,
};

use super::TICK_INTERVAL_USEC;
use crate::fault_access_point::FAULT_ACCESS_POINT;
use crate::util;

/// The fault channel: every `SIGSEGV` lands here and is forwarded with
/// its address and classification.
///
/// The handler itself touches nothing in the managed range and prints
/// only through the signal-safe writer, so it can never re-enter itself.
extern "C" fn sigsegv_handler(_signum: c_int, info: *mut siginfo_t, _data: *mut c_void) {
    let (addr, code) = unsafe { ((*info).si_addr() as usize, (*info).si_code) };
    FAULT_ACCESS_POINT.fault(addr, code);
}

/// The tick channel: each timer expiry becomes one policy aging beat.
extern "C" fn sigalrm_handler(_signum: c_int, _info: *mut siginfo_t, _data: *mut c_void) {
    util::fault_debug("tick\n");
    FAULT_ACCESS_POINT.tick();
}

/// Kernel-side plumbing installed at init: both handlers plus the
/// periodic timer, together with everything needed to put the process
/// back the way it was.
pub(crate) struct SignalSetup {
    old_segv: sigaction,
    old_alrm: sigaction,
    old_timer: itimerval,
}

impl SignalSetup {
    /// Installs the two handlers and starts the tick timer.
    ///
    /// `SIGALRM` sits in the segfault handler's signal mask, so a tick
    /// can never interrupt fault handling and the policy never observes a
    /// beat in the middle of a page-in.
    pub(crate) fn install() -> Result<Self, ()> {
        unsafe {
            let handler_fn =
                sigsegv_handler as extern "C" fn(c_int, *mut siginfo_t, *mut c_void) as usize;

            let mut segv_action: sigaction = mem::zeroed();
            segv_action.sa_sigaction = handler_fn;
            segv_action.sa_flags = SA_SIGINFO | SA_ONSTACK;
            libc::sigemptyset(&mut segv_action.sa_mask);
            libc::sigaddset(&mut segv_action.sa_mask, SIGALRM);

            let mut old_segv: sigaction = mem::zeroed();
            if libc::sigaction(SIGSEGV, &segv_action, &mut old_segv) != 0 {
                log::error!("sigaction(SIGSEGV) failed");
                return Err(());
            }

            let tick_fn =
                sigalrm_handler as extern "C" fn(c_int, *mut siginfo_t, *mut c_void) as usize;

            let mut alrm_action: sigaction = mem::zeroed();
            alrm_action.sa_sigaction = tick_fn;
            alrm_action.sa_flags = SA_SIGINFO | SA_ONSTACK;
            libc::sigemptyset(&mut alrm_action.sa_mask);

            let mut old_alrm: sigaction = mem::zeroed();
            if libc::sigaction(SIGALRM, &alrm_action, &mut old_alrm) != 0 {
                log::error!("sigaction(SIGALRM) failed");
                libc::sigaction(SIGSEGV, &old_segv, null_mut());
                return Err(());
            }

            let tick = timeval {
                tv_sec: 0,
                tv_usec: TICK_INTERVAL_USEC as libc::suseconds_t,
            };
            let timer = itimerval {
                it_interval: tick,
                it_value: tick,
            };

            let mut old_timer: itimerval = mem::zeroed();
            if libc::setitimer(ITIMER_REAL, &timer, &mut old_timer) != 0 {
                log::error!("setitimer(ITIMER_REAL) failed");
                libc::sigaction(SIGALRM, &old_alrm, null_mut());
                libc::sigaction(SIGSEGV, &old_segv, null_mut());
                return Err(());
            }

            Ok(Self {
                old_segv,
                old_alrm,
                old_timer,
            })
        }
    }

    /// Stops the tick source and restores the previous dispositions and
    /// timer.
    pub(crate) fn uninstall(self) {
        unsafe {
            // silence our timer before handing SIGALRM back
            let disarmed: itimerval = mem::zeroed();
            libc::setitimer(ITIMER_REAL, &disarmed, null_mut());

            libc::sigaction(SIGALRM, &self.old_alrm, null_mut());
            libc::sigaction(SIGSEGV, &self.old_segv, null_mut());

            libc::setitimer(ITIMER_REAL, &self.old_timer, null_mut());
        }
    }
}
