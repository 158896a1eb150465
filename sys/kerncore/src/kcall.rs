// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The pure state transitions behind the single kernel-call dispatch point.
//!
//! Everything here assumes the caller has already done the arch-specific
//! part of the contract: spinning until neither the tick handler nor the
//! reschedule handler is active, and raising the interrupt mask before
//! calling in. That part has no portable expression (it's built from
//! target-specific primitives) and lives in the platform layer; this module
//! only ever touches the process table and the arena, and only while
//! already protected by that mask.

use abi::{Cmd, ProcessId};

use crate::arena::Arena;
use crate::process::ProcessTable;

/// Terminates `pid`: drops it from the ready queue, returns its stack block
/// to the arena, and releases its table slot.
pub fn exit(table: &mut ProcessTable, arena: &mut Arena, pid: ProcessId) {
    table.ready_remove(pid);
    arena.free(table.get(pid).tcb.sp_tip);
    table.free_slot(pid);
}

/// Moves `pid` from the ready queue to the tail of the wait queue. The
/// caller has already populated whichever of `alarm`/`sem` it's waiting on.
pub fn suspend(table: &mut ProcessTable, pid: ProcessId) {
    table.ready_remove(pid);
    table.wait_push_back(pid);
}

/// Dispatches on `cmd`. An unrecognized command would be a no-op per the
/// error-handling contract, but `Cmd` is exhaustively matched here so there
/// is no such case to handle.
pub fn dispatch(table: &mut ProcessTable, arena: &mut Arena, pid: ProcessId, cmd: Cmd) {
    match cmd {
        Cmd::Exit => exit(table, arena, pid),
        Cmd::Suspend => suspend(table, pid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abi::{AllocKind, ProcessFlags};

    fn spawn_with_stack(table: &mut ProcessTable, arena: &mut Arena, stack_bytes: usize) -> ProcessId {
        let base = arena.alloc(stack_bytes, AllocKind::Stack).unwrap();
        let pid = table.alloc_slot().unwrap();
        let slot = table.get_mut(pid);
        slot.flags = ProcessFlags::IN_USE;
        slot.tcb.sp_tip = base;
        slot.tcb.sp = base;
        table.ready_push_back(pid);
        pid
    }

    #[test]
    fn exit_frees_the_stack_block_and_the_slot() {
        let mut table = ProcessTable::new();
        let mut arena = Arena::new();
        arena.init(0x1000, 0x2000);

        let pid = spawn_with_stack(&mut table, &mut arena, 256);
        assert_eq!(arena.live_block_count(), 1);

        exit(&mut table, &mut arena, pid);

        assert_eq!(arena.live_block_count(), 0);
        assert!(!table.get(pid).in_use());
        assert_eq!(table.ready_iter().count(), 0);
    }

    #[test]
    fn suspend_moves_the_process_from_ready_to_wait() {
        let mut table = ProcessTable::new();
        let mut arena = Arena::new();
        arena.init(0x1000, 0x2000);

        let pid = spawn_with_stack(&mut table, &mut arena, 256);
        suspend(&mut table, pid);

        assert_eq!(table.ready_iter().count(), 0);
        assert_eq!(table.wait_iter().collect::<std::vec::Vec<_>>(), [pid]);
    }
}
