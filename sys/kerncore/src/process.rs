// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The process table.
//!
//! Each slot holds one process record: identity, scheduling fields, the
//! task-control-block stack pointers, and the forward/backward links used by
//! queue membership. Slots never move, so a [`ProcessId`] is just a dense
//! array index; queues are maintained in place as doubly-linked lists
//! threaded through the slots themselves, per the "raw pointers become array
//! indices" substitution noted for a safety-focused port.

use abi::{KernelError, Nice, Fit, ProcessFlags, ProcessId, Ticks, MAX_PROCESSES};

use crate::arena::Spinlock;
use crate::sem::Semaphore;

/// The two stack pointers the context manager juggles: the base of the stack
/// region returned by the allocator (kept around so `exit` can free it), and
/// the current saved stack pointer.
#[derive(Copy, Clone, Debug, Default)]
pub struct Tcb {
    pub sp_tip: usize,
    pub sp: usize,
}

/// Which queue, if any, a slot currently belongs to. Kept as an explicit tag
/// so the "at most one queue at a time" invariant is a field comparison
/// rather than an O(n) table scan.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Membership {
    None,
    Ready,
    Wait,
}

#[derive(Copy, Clone, Debug)]
pub struct Process {
    pub flags: ProcessFlags,
    /// Address of the process's entry-point function. Used only to answer
    /// "does a process with this entry point already exist" (cron's
    /// de-duplication check); otherwise opaque to the kernel.
    pub entry_point: usize,
    pub nice: Nice,
    pub fit: Fit,
    pub time_slice: u32,
    pub alarm: Option<Ticks>,
    pub sem: Option<&'static Semaphore>,
    pub tcb: Tcb,
    next: Option<ProcessId>,
    prev: Option<ProcessId>,
    membership: Membership,
}

impl Process {
    const fn vacant() -> Self {
        Process {
            flags: ProcessFlags::empty(),
            entry_point: 0,
            nice: Nice::new_const(0),
            fit: Fit::new_const(0),
            time_slice: 0,
            alarm: None,
            sem: None,
            tcb: Tcb { sp_tip: 0, sp: 0 },
            next: None,
            prev: None,
            membership: Membership::None,
        }
    }

    pub fn in_use(&self) -> bool {
        self.flags.contains(ProcessFlags::IN_USE)
    }

    /// Evaluates the AND wake-gate: the process wakes when *both* of its
    /// configured wake conditions hold. Either condition absent from the
    /// process (alarm unset, no bound semaphore) is trivially satisfied.
    fn wakeable(&self, now: Ticks) -> bool {
        let alarm_ok = self.alarm.map_or(true, |deadline| deadline <= now);
        let sem_ok = self.sem.map_or(true, |s| s.value() > 0);
        alarm_ok && sem_ok
    }

    /// Clears the wake conditions. Called once a process has actually been
    /// moved off the wait queue.
    fn clear_wake_conditions(&mut self) {
        self.alarm = None;
        self.sem = None;
    }
}

/// Head/tail pointers for one intrusive doubly-linked list threaded through
/// the process table. No separate node storage exists; `Process::next`/
/// `Process::prev` *are* the list.
#[derive(Copy, Clone, Debug, Default)]
struct List {
    head: Option<ProcessId>,
    tail: Option<ProcessId>,
}

pub struct ProcessTable {
    slots: [Process; MAX_PROCESSES],
    ready: List,
    wait: List,
    /// Guards slot allocation/release. The allocator has its own lock for
    /// the same reason: cron's spawn pass must be able to probe both without
    /// blocking and stretch to the next tick if either is held.
    pub lock: Spinlock,
}

impl ProcessTable {
    pub const fn new() -> Self {
        ProcessTable {
            slots: [Process::vacant(); MAX_PROCESSES],
            ready: List {
                head: None,
                tail: None,
            },
            wait: List {
                head: None,
                tail: None,
            },
            lock: Spinlock::new(),
        }
    }

    pub fn get(&self, pid: ProcessId) -> &Process {
        &self.slots[pid.index()]
    }

    pub fn get_mut(&mut self, pid: ProcessId) -> &mut Process {
        &mut self.slots[pid.index()]
    }

    /// Finds a free slot and marks it in-use. Returns `OutOfSlots` if the
    /// table is full.
    ///
    /// Slot 0 is not special-cased here: `boot` is required to create the
    /// idle process first, before any other caller can race it for a slot,
    /// so the first call naturally claims index 0 (every slot starts
    /// vacant) and the idle process then holds it for the lifetime of the
    /// system, since it never calls `exit`.
    pub fn alloc_slot(&mut self) -> Result<ProcessId, KernelError> {
        self.slots
            .iter()
            .enumerate()
            .find(|(_, p)| !p.in_use())
            .map(|(i, _)| ProcessId::from_index(i))
            .ok_or(KernelError::OutOfSlots)
    }

    /// Releases a slot back to the free pool. The caller must have already
    /// removed `pid` from whichever queue it occupied.
    pub fn free_slot(&mut self, pid: ProcessId) {
        debug_assert_eq!(self.slots[pid.index()].membership, Membership::None);
        self.slots[pid.index()] = Process::vacant();
    }

    // --- ready queue -----------------------------------------------------

    pub fn ready_head(&self) -> Option<ProcessId> {
        self.ready.head
    }

    pub fn ready_push_back(&mut self, pid: ProcessId) {
        Self::list_push_back(&mut self.ready, &mut self.slots, pid, Membership::Ready);
    }

    pub fn ready_remove(&mut self, pid: ProcessId) {
        Self::list_remove(&mut self.ready, &mut self.slots, pid);
    }

    /// Inserts `pid` into the ready queue immediately before the first
    /// member whose `nice` is strictly greater (less important) than
    /// `pid`'s, restricted to members with `time_slice > 0` so a head that's
    /// about to be rotated away is never jumped in front of. Appends to the
    /// tail if no such member exists.
    pub fn ready_insert_by_priority(&mut self, pid: ProcessId) {
        let nice = self.slots[pid.index()].nice;
        let mut before = None;
        for candidate in self.ready_iter() {
            let slot = &self.slots[candidate.index()];
            if slot.time_slice == 0 {
                continue;
            }
            if nice.is_more_important_than(slot.nice) {
                before = Some(candidate);
                break;
            }
        }
        match before {
            Some(before) => {
                Self::list_insert_before(&mut self.ready, &mut self.slots, pid, before, Membership::Ready)
            }
            None => self.ready_push_back(pid),
        }
    }

    /// Moves the current ready-queue head to the tail, round-robin style.
    /// A no-op if the head has no successor.
    pub fn ready_rotate_head(&mut self) {
        if let Some(head) = self.ready.head {
            if self.slots[head.index()].next.is_some() {
                self.ready_remove(head);
                self.ready_push_back(head);
            }
        }
    }

    pub fn ready_iter(&self) -> ListIter<'_> {
        ListIter {
            slots: &self.slots,
            next: self.ready.head,
        }
    }

    // --- wait queue --------------------------------------------------------

    pub fn wait_push_back(&mut self, pid: ProcessId) {
        Self::list_push_back(&mut self.wait, &mut self.slots, pid, Membership::Wait);
    }

    pub fn wait_remove(&mut self, pid: ProcessId) {
        Self::list_remove(&mut self.wait, &mut self.slots, pid);
    }

    pub fn wait_iter(&self) -> ListIter<'_> {
        ListIter {
            slots: &self.slots,
            next: self.wait.head,
        }
    }

    /// Scans the wait queue for the first process whose wake conditions both
    /// hold, clears those conditions, and returns its id without touching
    /// queue membership (the caller re-homes it).
    pub fn find_wakeable(&mut self, now: Ticks) -> Option<ProcessId> {
        let found = self.wait_iter().find(|&pid| self.slots[pid.index()].wakeable(now));
        if let Some(pid) = found {
            self.slots[pid.index()].clear_wake_conditions();
        }
        found
    }

    // --- list primitives ----------------------------------------------------

    fn list_push_back(
        list: &mut List,
        slots: &mut [Process; MAX_PROCESSES],
        pid: ProcessId,
        membership: Membership,
    ) {
        debug_assert_eq!(slots[pid.index()].membership, Membership::None);
        slots[pid.index()].prev = list.tail;
        slots[pid.index()].next = None;
        slots[pid.index()].membership = membership;
        if let Some(tail) = list.tail {
            slots[tail.index()].next = Some(pid);
        } else {
            list.head = Some(pid);
        }
        list.tail = Some(pid);
    }

    fn list_insert_before(
        list: &mut List,
        slots: &mut [Process; MAX_PROCESSES],
        pid: ProcessId,
        before: ProcessId,
        membership: Membership,
    ) {
        debug_assert_eq!(slots[pid.index()].membership, Membership::None);
        let prev = slots[before.index()].prev;
        slots[pid.index()].prev = prev;
        slots[pid.index()].next = Some(before);
        slots[pid.index()].membership = membership;
        slots[before.index()].prev = Some(pid);
        match prev {
            Some(prev) => slots[prev.index()].next = Some(pid),
            None => list.head = Some(pid),
        }
    }

    fn list_remove(list: &mut List, slots: &mut [Process; MAX_PROCESSES], pid: ProcessId) {
        let (prev, next) = (slots[pid.index()].prev, slots[pid.index()].next);
        match prev {
            Some(prev) => slots[prev.index()].next = next,
            None => list.head = next,
        }
        match next {
            Some(next) => slots[next.index()].prev = prev,
            None => list.tail = prev,
        }
        slots[pid.index()].prev = None;
        slots[pid.index()].next = None;
        slots[pid.index()].membership = Membership::None;
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward iterator over one of the queues.
pub struct ListIter<'a> {
    slots: &'a [Process; MAX_PROCESSES],
    next: Option<ProcessId>,
}

impl Iterator for ListIter<'_> {
    type Item = ProcessId;

    fn next(&mut self) -> Option<ProcessId> {
        let pid = self.next?;
        self.next = self.slots[pid.index()].next;
        Some(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn(table: &mut ProcessTable, nice: i32) -> ProcessId {
        let pid = table.alloc_slot().unwrap();
        let slot = table.get_mut(pid);
        slot.flags = ProcessFlags::IN_USE;
        slot.nice = Nice::new(nice);
        slot.time_slice = 10;
        pid
    }

    #[test]
    fn ready_queue_is_fifo_without_priority_conflicts() {
        let mut t = ProcessTable::new();
        let a = spawn(&mut t, 0);
        let b = spawn(&mut t, 0);
        t.ready_push_back(a);
        t.ready_push_back(b);
        assert_eq!(t.ready_iter().collect::<std::vec::Vec<_>>(), [a, b]);
    }

    #[test]
    fn higher_priority_waker_is_inserted_ahead_of_lower_priority_runnable() {
        let mut t = ProcessTable::new();
        let low = spawn(&mut t, 5);
        t.ready_push_back(low);
        let high = spawn(&mut t, -5);
        t.ready_insert_by_priority(high);
        assert_eq!(t.ready_head(), Some(high));
    }

    #[test]
    fn rotate_is_noop_for_a_solo_runnable_process() {
        let mut t = ProcessTable::new();
        let only = spawn(&mut t, 0);
        t.ready_push_back(only);
        t.ready_rotate_head();
        assert_eq!(t.ready_head(), Some(only));
    }

    #[test]
    fn find_wakeable_requires_both_conditions_when_both_are_set() {
        let mut t = ProcessTable::new();
        let pid = spawn(&mut t, 0);
        t.get_mut(pid).alarm = Some(Ticks(5));
        t.wait_push_back(pid);
        assert_eq!(t.find_wakeable(Ticks(4)), None);
        assert_eq!(t.find_wakeable(Ticks(5)), Some(pid));
    }
}
