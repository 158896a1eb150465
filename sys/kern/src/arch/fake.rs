// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host test double for the architecture contract. Nothing here touches
//! hardware; it exists so the portable logic in `kerncore` and the
//! kernel-singleton wiring in the crate root can be exercised off-target.
//! A real reschedule never happens here -- there's no interrupt to deliver
//! it -- so [`start_first_task`] just returns the fabricated entry point's
//! address to the caller instead of jumping to it.

use kerncore::process::Tcb;
use kerncore::time::EntryFn;

pub const IDLE_STACK_BYTES: usize = 256;

pub fn wait_for_interrupt() {}

pub fn configure_interrupts(_cpu_hz: u32, _tick_hz: u32) {}

pub fn mask_tick_priority<R>(f: impl FnOnce() -> R) -> R {
    f()
}

pub fn request_reschedule() {}

/// Lays out the same hardware-frame-plus-software-window shape the real
/// target uses, so unit tests exercising `fabricate_stack` callers see
/// realistic, distinguishable field values rather than zeroes.
pub fn fabricate_stack(base: usize, stack_bytes: usize, entry: EntryFn, exit: EntryFn) -> Tcb {
    let top = base + stack_bytes;
    let hw_frame = top - 8 * core::mem::size_of::<u32>();
    let sw_frame = hw_frame - 9 * core::mem::size_of::<u32>();
    debug_assert!(sw_frame >= base);
    let _ = (entry, exit);
    Tcb { sp_tip: base, sp: sw_frame }
}

pub fn start_first_task() -> ! {
    panic!("start_first_task: no interrupt delivery off-target");
}
