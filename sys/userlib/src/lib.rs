// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Process-facing support library.
//!
//! This is the thin layer a process body links against: re-exports of the
//! shared [`abi`] types, and ergonomic wrappers over `kern`'s public entry
//! points. There is no syscall trap here -- processes share an address space
//! with the kernel, so every one of these is an ordinary call, not a trap.

#![no_std]

// Only built for the ARM target triples that actually pull in `cortex-m` and
// `critical-section` (see Cargo.toml); a host build of this crate has no
// masking backend to provide and doesn't need one.
#[cfg(target_arch = "arm")]
pub mod critical_section;

pub use abi::{KernelError, ProcessId, Seconds, Ticks};
pub use kerncore::sem::Semaphore;
pub use kerncore::time::EntryFn;

/// A binary semaphore used as a mutual-exclusion lock. Distinguished from a
/// general counting [`Semaphore`] only by convention: `lock`/`unlock` treat
/// its value as 0 (held) or 1 (free) and `unlock` always resets it to 1
/// rather than incrementing, so a doubled `unlock` can't oversubscribe it.
pub type Mutex = Semaphore;

/// Brings up the kernel: arena, idle process, and the tick source. Must be
/// called exactly once, before any other function in this crate.
pub fn boot(cpu_hz: u32, tick_hz: u32, arena_base: usize, arena_end: usize) {
    kern::boot(cpu_hz, tick_hz, arena_base, arena_end);
}

/// Creates a process. `nice` and `fit` are clamped to `[-10, 10]`.
pub fn new_process(
    entry: EntryFn,
    stack_bytes: usize,
    nice: i32,
    fit: i32,
) -> Result<ProcessId, KernelError> {
    kern::new_process(entry, stack_bytes, nice, fit)
}

/// Enables the tick source and enters the idle process. Never returns.
pub fn run() -> ! {
    kern::run()
}

/// Terminates the calling process. `status` is ignored; kept only so callers
/// have somewhere to put an exit code. Never returns.
pub fn exit(_status: i32) -> ! {
    kern::kcall(abi::Cmd::Exit);
    loop {
        core::hint::spin_loop();
    }
}

/// Suspends the calling process until at least `ticks` ticks have elapsed.
pub fn sleep(ticks: u32) {
    kern::set_current_alarm(ticks);
    kern::kcall(abi::Cmd::Suspend);
}

/// Waits on a counting semaphore. Returns immediately, decrementing the
/// count, if it is already positive; otherwise suspends the calling process
/// until a `post` (from anywhere, including interrupt context) makes it so.
///
/// The scheduler only ever wakes a semaphore-waiter once its value is
/// positive, so the `try_take` after waking is guaranteed to succeed -- see
/// the wake contract in `kerncore::process`.
pub fn wait(sem: &'static Semaphore) {
    if !sem.try_take() {
        kern::set_current_sem(sem);
        kern::kcall(abi::Cmd::Suspend);
        let took = sem.try_take();
        debug_assert!(took, "wake contract guarantees a positive value");
    }
}

/// Increments a counting semaphore. Safe to call from interrupt context.
pub fn post(sem: &'static Semaphore) {
    sem.post();
}

/// Locks a binary semaphore used as a mutex. Equivalent to [`wait`].
pub fn lock(m: &'static Mutex) {
    wait(m);
}

/// Unlocks a binary semaphore used as a mutex by resetting its value to 1
/// (free), rather than incrementing it -- an unbalanced `unlock` can't push
/// the count above 1 and let two callers in at once.
pub fn unlock(m: &'static Mutex) {
    m.close(1);
}

/// The current tick count.
pub fn clock() -> Ticks {
    kern::clock()
}

/// The current wall-clock time.
pub fn time() -> Seconds {
    kern::time()
}

/// Sets the wall-clock time. Only meaningful when no external real-time
/// clock hook is wired up by the platform.
pub fn settime(now: Seconds) {
    kern::settime(now);
}

/// Registers `f` to run, from the tick handler's own context, every
/// `every_ticks` ticks.
pub fn service_add(f: EntryFn, every_ticks: u32) -> Result<(), KernelError> {
    kern::service_add(f, every_ticks)
}

pub fn service_remove(f: EntryFn) {
    kern::service_remove(f);
}

/// Registers a deferred spawn of `f` at wall-clock second `at`, and every
/// `every` seconds thereafter (`every = Seconds(0)` means once, never
/// again).
#[allow(clippy::too_many_arguments)]
pub fn cron_add(
    f: EntryFn,
    stack_bytes: usize,
    nice: i32,
    fit: i32,
    privileged: bool,
    at: Seconds,
    every: Seconds,
) -> Result<(), KernelError> {
    kern::cron_add(f, stack_bytes, nice, fit, privileged, at, every)
}

pub fn cron_remove(f: EntryFn) {
    kern::cron_remove(f);
}
