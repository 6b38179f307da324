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

mod clock_lru;
mod fifo;

pub use clock_lru::ClockLruReplacementPolicyModule;
pub use fifo::FifoReplacementPolicyModule;

use crate::pager::PageId;

/// The slice of the pager a policy may touch from its aging hook.
///
/// Passing this in (instead of letting policies reach for process-wide
/// state) keeps policies testable against a mock and keeps the fault
/// router the only writer of everything else.
pub trait PageAgingEnv {
    /// Whether the page has been read since its accessed bit was last
    /// cleared.
    fn is_page_accessed(&self, page: PageId) -> bool;

    fn clear_page_accessed(&mut self, page: PageId);

    /// Drops the page to no-access so its next touch faults again.
    ///
    /// The dirty bit survives the demotion; only the accessed signal is
    /// being re-armed.
    fn revoke_page_access(&mut self, page: PageId);
}

/// Decides which resident page gives way when a new one must be paged in.
///
/// The pager keeps the policy's tracked set exactly equal to the resident
/// set: every `page_mapped` adds one page, every `choose_and_evict_victim`
/// removes one.
pub trait ReplacementPolicyModule {
    /// Constructs the policy state for a resident budget of `max_resident`
    /// pages.
    fn init(max_resident: usize) -> Result<Self, ()>
    where
        Self: Sized;

    /// Records that `page` just became resident.
    fn page_mapped(&mut self, page: PageId);

    /// Aging hook, invoked on every timer tick.
    fn timer_tick<E: PageAgingEnv>(&mut self, env: &mut E);

    /// Selects one resident page, removes it from the tracked set and
    /// returns it.
    ///
    /// Only called while the tracked set is non-empty.
    fn choose_and_evict_victim(&mut self) -> PageId;

    /// Number of pages currently tracked.
    fn tracked_pages(&self) -> usize;
}
