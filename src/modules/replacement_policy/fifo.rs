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

use std::collections::VecDeque;

use log::info;

use super::{PageAgingEnv, ReplacementPolicyModule};
use crate::pager::PageId;
use crate::util;

/// First-in-first-out replacement: the victim is always the page that has
/// been resident the longest, regardless of how recently it was used.
pub struct FifoReplacementPolicyModule {
    queue: VecDeque<PageId>,
    max_resident: usize,
}

impl ReplacementPolicyModule for FifoReplacementPolicyModule {
    fn init(max_resident: usize) -> Result<Self, ()> {
        if max_resident == 0 {
            return Err(());
        }

        info!("Using FIFO eviction policy");

        // full capacity up front, so page_mapped never allocates inside
        // the fault handler
        Ok(Self {
            queue: VecDeque::with_capacity(max_resident),
            max_resident,
        })
    }

    fn page_mapped(&mut self, page: PageId) {
        debug_assert!(self.queue.len() < self.max_resident);
        self.queue.push_back(page);
    }

    fn timer_tick<E: PageAgingEnv>(&mut self, _env: &mut E) {
        // FIFO ignores recency, nothing to age
    }

    fn choose_and_evict_victim(&mut self) -> PageId {
        match self.queue.pop_front() {
            Some(page) => page,
            None => util::fault_fatal("FIFO policy asked for a victim while tracking no pages"),
        }
    }

    fn tracked_pages(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod test {
    use super::super::test::MockAgingEnv;
    use super::FifoReplacementPolicyModule;
    use crate::modules::replacement_policy::ReplacementPolicyModule;

    #[test]
    fn test_init_rejects_zero_budget() {
        assert!(FifoReplacementPolicyModule::init(0).is_err());
    }

    #[test]
    fn test_victims_come_in_insertion_order() {
        let mut policy = FifoReplacementPolicyModule::init(4).unwrap();

        policy.page_mapped(7);
        policy.page_mapped(1);
        policy.page_mapped(12);
        assert_eq!(policy.tracked_pages(), 3);

        assert_eq!(policy.choose_and_evict_victim(), 7);
        assert_eq!(policy.choose_and_evict_victim(), 1);

        policy.page_mapped(3);
        assert_eq!(policy.choose_and_evict_victim(), 12);
        assert_eq!(policy.choose_and_evict_victim(), 3);
        assert_eq!(policy.tracked_pages(), 0);
    }

    #[test]
    fn test_tick_changes_nothing() {
        let mut policy = FifoReplacementPolicyModule::init(3).unwrap();
        policy.page_mapped(0);
        policy.page_mapped(1);

        let mut env = MockAgingEnv::new(4);
        env.set_accessed(0);
        env.set_accessed(1);

        policy.timer_tick(&mut env);

        // accessed bits untouched, no revocations, order unchanged
        assert!(env.revoked.is_empty());
        assert!(env.cleared.is_empty());
        assert_eq!(policy.choose_and_evict_victim(), 0);
        assert_eq!(policy.choose_and_evict_victim(), 1);
    }
}
