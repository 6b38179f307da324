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

/// CLOCK-style approximation of least-recently-used replacement.
///
/// Pages enter at the tail like FIFO. On every tick, pages that were
/// accessed since the previous tick get a second chance: their accessed
/// bit is cleared, their protection is revoked so the next touch shows up
/// again, and they move to the tail. Pages nobody touched drift to the
/// head, which is where victims are taken from.
pub struct ClockLruReplacementPolicyModule {
    queue: VecDeque<PageId>,
    max_resident: usize,
}

impl ReplacementPolicyModule for ClockLruReplacementPolicyModule {
    fn init(max_resident: usize) -> Result<Self, ()> {
        if max_resident == 0 {
            return Err(());
        }

        info!("Using CLOCK/LRU eviction policy");

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

    /// One pass over the queue as it stood when the tick arrived.
    ///
    /// The pass length is snapshotted first: re-enqueued pages land behind
    /// it, so every page is considered at most once and the walk always
    /// terminates.
    fn timer_tick<E: PageAgingEnv>(&mut self, env: &mut E) {
        if self.queue.len() < 2 {
            return;
        }

        let snapshot = self.queue.len();
        let mut idx = 0;
        for _ in 0..snapshot {
            let page = self.queue[idx];
            if env.is_page_accessed(page) {
                env.clear_page_accessed(page);
                // revoke so the next access becomes visible as a fault
                // again; the dirty bit survives
                env.revoke_page_access(page);

                let _ = self.queue.remove(idx);
                self.queue.push_back(page);
            } else {
                idx += 1;
            }
        }
    }

    fn choose_and_evict_victim(&mut self) -> PageId {
        match self.queue.pop_front() {
            Some(page) => page,
            None => {
                util::fault_fatal("CLOCK/LRU policy asked for a victim while tracking no pages")
            }
        }
    }

    fn tracked_pages(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod test {
    use super::super::test::MockAgingEnv;
    use super::ClockLruReplacementPolicyModule;
    use crate::modules::replacement_policy::{PageAgingEnv, ReplacementPolicyModule};

    fn drain(policy: &mut ClockLruReplacementPolicyModule) -> Vec<usize> {
        let mut order = Vec::new();
        while policy.tracked_pages() > 0 {
            order.push(policy.choose_and_evict_victim());
        }
        order
    }

    #[test]
    fn test_init_rejects_zero_budget() {
        assert!(ClockLruReplacementPolicyModule::init(0).is_err());
    }

    #[test]
    fn test_untouched_tick_is_idempotent() {
        let mut policy = ClockLruReplacementPolicyModule::init(4).unwrap();
        policy.page_mapped(0);
        policy.page_mapped(1);
        policy.page_mapped(2);

        let mut env = MockAgingEnv::new(4);
        policy.timer_tick(&mut env);

        assert!(env.revoked.is_empty());
        assert!(env.cleared.is_empty());
        assert_eq!(drain(&mut policy), vec![0, 1, 2]);
    }

    #[test]
    fn test_accessed_page_moves_to_tail() {
        let mut policy = ClockLruReplacementPolicyModule::init(4).unwrap();
        policy.page_mapped(0);
        policy.page_mapped(1);
        policy.page_mapped(2);

        let mut env = MockAgingEnv::new(4);
        env.set_accessed(1);
        policy.timer_tick(&mut env);

        // page 1 got its second chance and its protection was re-armed
        assert_eq!(env.revoked, vec![1]);
        assert_eq!(env.cleared, vec![1]);
        assert!(!env.is_page_accessed(1));
        assert_eq!(drain(&mut policy), vec![0, 2, 1]);
    }

    #[test]
    fn test_all_accessed_keeps_relative_order() {
        let mut policy = ClockLruReplacementPolicyModule::init(4).unwrap();
        policy.page_mapped(0);
        policy.page_mapped(1);
        policy.page_mapped(2);

        let mut env = MockAgingEnv::new(4);
        for page in 0..3 {
            env.set_accessed(page);
        }
        policy.timer_tick(&mut env);

        // each page was handled exactly once in queue order
        assert_eq!(env.revoked, vec![0, 1, 2]);
        assert_eq!(drain(&mut policy), vec![0, 1, 2]);
    }

    #[test]
    fn test_aging_protects_recently_used_page() {
        // map 0,1,2; everything starts out accessed (the router sets the
        // bit on the first read); one aging pass, then only page 0 is
        // touched again; the next victim must be page 1, not page 0
        let mut policy = ClockLruReplacementPolicyModule::init(3).unwrap();
        policy.page_mapped(0);
        policy.page_mapped(1);
        policy.page_mapped(2);

        let mut env = MockAgingEnv::new(4);
        for page in 0..3 {
            env.set_accessed(page);
        }
        policy.timer_tick(&mut env);

        env.set_accessed(0);
        policy.timer_tick(&mut env);

        assert_eq!(policy.choose_and_evict_victim(), 1);
    }

    #[test]
    fn test_short_queues_skip_the_walk() {
        let mut policy = ClockLruReplacementPolicyModule::init(2).unwrap();
        let mut env = MockAgingEnv::new(2);

        policy.timer_tick(&mut env);

        policy.page_mapped(0);
        env.set_accessed(0);
        policy.timer_tick(&mut env);

        // a single resident page is never demoted
        assert!(env.revoked.is_empty());
        assert!(env.is_page_accessed(0));
        assert_eq!(policy.choose_and_evict_victim(), 0);
    }
}
