// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel event hooks, for boards that want to observe scheduling decisions
//! without a debugger attached.
//!
//! Because the kernel is SoC-independent, this module does not assume any
//! particular way of getting that information out -- a typical
//! implementation might toggle GPIOs for a logic analyzer, write to a ring
//! buffer in RAM, or increment counters read back over a debug channel.
//! Install an [`EventsTable`] from board setup with [`configure_events_table`]
//! if you want any of this; absent one, every hook call below is a single
//! atomic load and a null check.

use core::sync::atomic::{AtomicPtr, Ordering};

use abi::{ProcessId, Ticks};

/// Hooks a board can populate to observe kernel activity. All fields are
/// required, matching the teacher's own profiling table: this avoids an
/// `Option<fn(..)>` check (itself a branch) on top of the table-presence
/// check already paid on every call. Omit an event you don't care about with
/// `|_| ()`.
pub struct EventsTable {
    /// Called once per tick, after the clock has advanced.
    pub tick: fn(Ticks),
    /// Called whenever the reschedule handler hands off from one process to
    /// another (never called when it decides to resume the same process).
    pub reschedule: fn(from: ProcessId, to: ProcessId),
    /// Called when cron spawns a new process for a due entry.
    pub cron_spawn: fn(ProcessId),
}

static EVENTS_TABLE: AtomicPtr<EventsTable> = AtomicPtr::new(core::ptr::null_mut());

/// Supplies the kernel with an events table. Call from board setup, before
/// [`crate::boot`]. The table must have `'static` scope.
pub fn configure_events_table(table: &'static EventsTable) {
    EVENTS_TABLE.store(table as *const _ as *mut _, Ordering::Relaxed);
}

fn table() -> Option<&'static EventsTable> {
    let p = EVENTS_TABLE.load(Ordering::Relaxed);
    if p.is_null() {
        None
    } else {
        // Safety: only ever written from a `&'static EventsTable` above.
        unsafe { Some(&*p) }
    }
}

pub(crate) fn event_tick(ticks: Ticks) {
    if let Some(t) = table() {
        (t.tick)(ticks)
    }
}

pub(crate) fn event_reschedule(from: ProcessId, to: ProcessId) {
    if let Some(t) = table() {
        (t.reschedule)(from, to)
    }
}

pub(crate) fn event_cron_spawn(pid: ProcessId) {
    if let Some(t) = table() {
        (t.cron_spawn)(pid)
    }
}
