// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A `critical-section` implementation for processes.
//!
//! Unlike the kernel's own masking (which only needs to hold off the tick
//! and reschedule interrupts, via BASEPRI), a process sharing its address
//! space with every other process has no narrower primitive available to
//! it: this disables interrupts globally with PRIMASK, exactly like any
//! other bare-metal `critical-section` backend for this architecture.

use critical_section::RawRestoreState;

struct ProcessCriticalSection;
critical_section::set_impl!(ProcessCriticalSection);

unsafe impl critical_section::Impl for ProcessCriticalSection {
    #[inline(always)]
    unsafe fn acquire() -> RawRestoreState {
        let was_active = cortex_m::register::primask::read().is_active();
        cortex_m::interrupt::disable();
        was_active
    }

    #[inline(always)]
    unsafe fn release(was_active: RawRestoreState) {
        if was_active {
            cortex_m::interrupt::enable();
        }
    }
}
