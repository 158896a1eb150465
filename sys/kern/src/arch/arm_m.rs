// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cortex-M (ARMv7-M) support: interrupt configuration, the PendSV-based
//! reschedule handler, the SysTick-based tick handler, and cold-start
//! stack-frame fabrication.
//!
//! There is no MPU setup here and no `SVCall`-based syscall trap: every
//! process shares one address space, so a `kcall` is just an ordinary masked
//! function call from thread mode. `SVCall` survives for exactly one use --
//! bootstrapping the very first task switch in [`start_first_task`], the same
//! trick most bare-metal schedulers use to get from `main`'s stack onto a
//! fabricated one via a genuine exception return.

use core::arch::global_asm;

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{Peripherals, SCB};
use cortex_m::register::basepri;

use kerncore::process::Tcb;
use kerncore::time::EntryFn;

/// Stack budget for the idle process. It only ever calls `wfi` in a loop, so
/// one exception frame is all it needs.
pub const IDLE_STACK_BYTES: usize = 256;

/// Return to thread mode, use PSP, no floating-point extended frame.
const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

/// The only bit every implementation of the architecture requires set in a
/// fabricated `xPSR`: the Thumb state bit.
const XPSR_THUMB: u32 = 0x0100_0000;

/// NVIC priority PendSV runs at. Lowest priority in the system, so it never
/// preempts anything; it only runs once everything else has finished.
const PENDSV_PRIO: u8 = 0xf0;

/// NVIC priority SysTick runs at -- one step above PendSV, so tick
/// accounting always completes before a pending switch is serviced, even if
/// both fire back to back.
const SYSTICK_PRIO: u8 = 0xe0;

pub fn wait_for_interrupt() {
    cortex_m::asm::wfi();
}

/// Programs SysTick for `tick_hz` interrupts per second of a `cpu_hz` core
/// clock, and gives SysTick and PendSV their relative priorities. Must be
/// called once, from `boot`, before interrupts are unmasked.
pub fn configure_interrupts(cpu_hz: u32, tick_hz: u32) {
    // Safety: single-threaded boot context, called exactly once.
    let mut p = unsafe { Peripherals::steal() };

    unsafe {
        p.SCB.set_priority(SystemHandler::PendSV, PENDSV_PRIO);
        p.SCB.set_priority(SystemHandler::SysTick, SYSTICK_PRIO);
    }

    p.SYST.set_clock_source(SystClkSource::Core);
    p.SYST.set_reload(cpu_hz / tick_hz - 1);
    p.SYST.clear_current();
    p.SYST.enable_interrupt();
    p.SYST.enable_counter();
}

/// Raises BASEPRI to the SysTick priority for the duration of `f`, blocking
/// out both the tick handler and PendSV without a full `cpsid i`. Process
/// code outside the kernel never runs at this priority, so nothing besides
/// the two kernel interrupt sources is affected.
pub fn mask_tick_priority<R>(f: impl FnOnce() -> R) -> R {
    let saved = basepri::read();
    unsafe { basepri::write(SYSTICK_PRIO) };
    let result = f();
    unsafe { basepri::write(saved) };
    result
}

/// Pends PendSV. The reschedule handler runs once nothing higher-priority is
/// active.
pub fn request_reschedule() {
    SCB::set_pendsv();
}

/// Builds a stack frame that, the first time this process is switched to,
/// makes it look exactly like a process that was just interrupted by
/// PendSV: a software-saved `r4-r11`/`lr` window sitting below a
/// hardware-shaped exception frame that lands on `entry`.
pub fn fabricate_stack(base: usize, stack_bytes: usize, entry: EntryFn, exit: EntryFn) -> Tcb {
    let top = base + stack_bytes;
    let hw_frame = top - 8 * core::mem::size_of::<u32>();

    // Safety: `hw_frame` and `sw_frame` below fall within [base, base +
    // stack_bytes), a block the arena just handed us exclusively.
    unsafe {
        let w = hw_frame as *mut u32;
        w.add(0).write(0); // r0
        w.add(1).write(0); // r1
        w.add(2).write(0); // r2
        w.add(3).write(0); // r3
        w.add(4).write(0); // r12
        w.add(5).write(exit as usize as u32); // lr: taken if entry ever returns
        w.add(6).write(entry as usize as u32); // pc
        w.add(7).write(XPSR_THUMB); // xPSR
    }

    let sw_frame = hw_frame - 9 * core::mem::size_of::<u32>();
    unsafe {
        let w = sw_frame as *mut u32;
        for i in 0..8 {
            w.add(i).write(0); // r4-r11
        }
        w.add(8).write(EXC_RETURN_THREAD_PSP); // lr
    }

    Tcb { sp_tip: base, sp: sw_frame }
}

/// Called with `bl` from the hand-written `PendSV` prologue below, as an
/// ordinary (non-naked) function so the rest of its body -- the portable
/// reschedule logic in `kerncore` -- is plain Rust.
#[no_mangle]
extern "C" fn pkernel_reschedule_entry(saved_sp: u32) -> u32 {
    // Safety: only ever called from the PendSV handler's own context.
    unsafe { crate::reschedule_entry(saved_sp as usize) as u32 }
}

/// Reads the current process's already-fabricated initial stack pointer.
/// Used once, by `SVCall`, to bootstrap the first task switch.
#[no_mangle]
extern "C" fn pkernel_initial_sp() -> u32 {
    // Safety: called once, from `SVCall`, after `boot` has populated the
    // idle process's TCB and before any reschedule has run.
    unsafe { crate::current_sp() as u32 }
}

global_asm!(
    ".global PendSV",
    ".thumb_func",
    "PendSV:",
    "mrs r0, psp",
    "stmdb r0!, {{r4-r11, lr}}",
    "bl {reschedule}",
    "cmp r0, #0",
    "beq 1f",
    "ldmia r0!, {{r4-r11, lr}}",
    "msr psp, r0",
    "1:",
    "bx lr",
    reschedule = sym pkernel_reschedule_entry,
);

global_asm!(
    ".global SVCall",
    ".thumb_func",
    "SVCall:",
    "bl {initial_sp}",
    "msr psp, r0",
    "movs r1, #2",
    "msr control, r1",
    "isb",
    "ldmia r0!, {{r4-r11, lr}}",
    "bx lr",
    initial_sp = sym pkernel_initial_sp,
);

/// Triggers the one-time bootstrap above and never returns: `SVCall`
/// performs a genuine exception return into the idle process's fabricated
/// frame.
pub fn start_first_task() -> ! {
    // Safety: `SVCall` is the naked handler defined above; this is the one
    // legitimate call site, made exactly once by `run`.
    unsafe {
        core::arch::asm!("svc 0", options(noreturn));
    }
}

#[no_mangle]
extern "C" fn SysTick() {
    // Safety: called only by hardware, at SysTick priority.
    unsafe { crate::tick_entry() };
    SCB::set_pendsv();
}
