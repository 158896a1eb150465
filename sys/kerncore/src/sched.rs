// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The scheduler proper: `schedule()`, called only from the reschedule
//! handler, picks the next process to run.
//!
//! Priority only enters at wake-up, when a waiter is reinserted into the
//! ready queue; the steady-state path below that is an O(1) rotate. This
//! keeps the reschedule handler's worst case bounded regardless of how many
//! processes are runnable.

use abi::ProcessId;

use crate::process::ProcessTable;
use abi::Ticks;

/// Picks the next process to run, applying one pending wake-up (if any) and
/// then the round-robin/priority rules over the ready queue.
pub fn schedule(table: &mut ProcessTable, now: Ticks) -> ProcessId {
    if let Some(woken) = table.find_wakeable(now) {
        table.wait_remove(woken);
        table.ready_insert_by_priority(woken);
    }

    let Some(head) = table.ready_head() else {
        return ProcessId::IDLE;
    };

    if table.get(head).time_slice == 0 {
        let fresh_slice = table.get(head).fit.slice_ticks();
        table.get_mut(head).time_slice = fresh_slice;
        table.ready_rotate_head();
    }

    table
        .ready_head()
        .expect("rotation never empties a non-empty ready queue")
}

#[cfg(test)]
mod tests {
    use super::*;
    use abi::{Fit, Nice, ProcessFlags};

    fn spawn(table: &mut ProcessTable, nice: i32) -> ProcessId {
        let pid = table.alloc_slot().unwrap();
        let slot = table.get_mut(pid);
        slot.flags = ProcessFlags::IN_USE;
        slot.nice = Nice::new(nice);
        slot.fit = Fit::new(0);
        slot.time_slice = 10;
        pid
    }

    #[test]
    fn idle_is_selected_when_ready_queue_is_empty() {
        let mut table = ProcessTable::new();
        assert_eq!(schedule(&mut table, Ticks(0)), ProcessId::IDLE);
    }

    #[test]
    fn a_higher_priority_waker_preempts_the_current_head() {
        let mut table = ProcessTable::new();
        let low = spawn(&mut table, 5);
        table.ready_push_back(low);

        let high = spawn(&mut table, -5);
        table.get_mut(high).alarm = Some(Ticks(10));
        table.wait_push_back(high);

        assert_eq!(schedule(&mut table, Ticks(10)), high);
    }

    #[test]
    fn an_exhausted_slice_rotates_to_the_tail_and_replenishes() {
        let mut table = ProcessTable::new();
        let a = spawn(&mut table, 0);
        let b = spawn(&mut table, 0);
        table.ready_push_back(a);
        table.ready_push_back(b);
        table.get_mut(a).time_slice = 0;

        assert_eq!(schedule(&mut table, Ticks(0)), b);
        assert_eq!(table.get(a).time_slice, 10);
        assert_eq!(table.ready_iter().last(), Some(a));
    }

    #[test]
    fn a_solo_runnable_process_with_exhausted_slice_just_replenishes() {
        let mut table = ProcessTable::new();
        let only = spawn(&mut table, 0);
        table.ready_push_back(only);
        table.get_mut(only).time_slice = 0;

        assert_eq!(schedule(&mut table, Ticks(0)), only);
        assert_eq!(table.get(only).time_slice, 10);
    }
}
