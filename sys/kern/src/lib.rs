// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The privileged half of the kernel: the global kernel singleton, process
//! creation, boot, and the handful of entry points the architecture layer
//! calls into from the tick and reschedule handlers.
//!
//! Everything that doesn't need to know it's running on real hardware lives
//! in `kerncore` instead; this crate wires that portable logic to the
//! concrete interrupt vector, stack-frame layout, and masking primitives of
//! the target in [`arch`].

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod profiling;

use core::sync::atomic::{AtomicBool, Ordering};

use abi::{Cmd, Fit, KernelError, Nice, ProcessId, Seconds, Ticks};
use kerncore::arena::Arena;
use kerncore::process::ProcessTable;
use kerncore::sem::Semaphore;
use kerncore::time::{Clock, CronList, EntryFn, ServiceList};

/// The idle process's body. Installed as pid 0 during [`boot`]; never
/// exits. Declared with the same signature as an ordinary process entry
/// point (rather than `-> !`) so it can be passed around as an [`EntryFn`]
/// value; the loop below simply never lets control reach the end.
fn idle() {
    loop {
        arch::wait_for_interrupt();
    }
}

/// Resumes the current process's `kcall`-in-progress spin loop if it exits
/// its entry function normally, per the spec's cold-start convention ("a
/// plain return from `fn` becomes process termination").
fn exit_trampoline() {
    kcall(Cmd::Exit);
    // kcall(Exit) never lets this process run again; looping here just
    // occupies a stack frame that will never be scheduled back to.
    loop {
        arch::wait_for_interrupt();
    }
}

/// Everything the kernel knows about, gathered into one singleton so the
/// tick and reschedule handlers (the only two callers) have a single thing
/// to borrow.
struct Kernel {
    table: ProcessTable,
    arena: Arena,
    clock: Clock,
    services: ServiceList,
    cron: CronList,
    current: ProcessId,
}

impl Kernel {
    const fn new(tick_hz: u32) -> Self {
        Kernel {
            table: ProcessTable::new(),
            arena: Arena::new(),
            clock: Clock::new(tick_hz),
            services: ServiceList::new(),
            cron: CronList::new(),
            current: ProcessId::IDLE,
        }
    }
}

static mut KERNEL: Option<Kernel> = None;

/// Set while a `kcall` is waiting for the reschedule handler to service it;
/// cleared by the reschedule handler itself (spec step 2 of §4.3).
static KCALL_PENDING: AtomicBool = AtomicBool::new(false);

/// # Safety
/// Must only be called with tick-priority interrupts masked, or from within
/// the tick/reschedule handlers themselves, which run at a priority no other
/// kernel code shares.
#[allow(static_mut_refs)]
unsafe fn with_kernel<R>(f: impl FnOnce(&mut Kernel) -> R) -> R {
    f((*core::ptr::addr_of_mut!(KERNEL)).as_mut().expect("kernel not booted"))
}

/// Brings up the arena, creates the idle process as pid 0, and arms the tick
/// source. Must be called exactly once, before any [`new_process`].
pub fn boot(cpu_hz: u32, tick_hz: u32, arena_base: usize, arena_end: usize) {
    // Safety: single-threaded, pre-interrupt-enable boot context.
    unsafe {
        KERNEL = Some(Kernel::new(tick_hz));
        with_kernel(|k| k.arena.init(arena_base, arena_end));
    }

    let idle_pid = new_process(idle, arch::IDLE_STACK_BYTES, 0, 0)
        .expect("boot: could not create idle process");
    debug_assert_eq!(idle_pid, ProcessId::IDLE);

    arch::configure_interrupts(cpu_hz, tick_hz);
}

/// Creates a process. Allocates its stack from the arena, claims a table
/// slot, and fabricates a cold-start register window that lands on `entry`
/// the first time this process is scheduled.
pub fn new_process(
    entry: EntryFn,
    stack_bytes: usize,
    nice: i32,
    fit: i32,
) -> Result<ProcessId, KernelError> {
    // Safety: called from thread context with no reschedule in flight (boot,
    // or a process creating a sibling).
    unsafe { with_kernel(|k| spawn_locked(k, entry, stack_bytes, nice, fit, false, true)) }
}

/// The body of process creation, taking an already-borrowed [`Kernel`]
/// rather than reaching for the global itself. Shared between
/// [`new_process`] and cron's spawn pass, which already holds `k` and must
/// not re-enter [`with_kernel`] while it does. `privileged` threads cron's
/// `privilege` parameter through to the spawned slot's flags; ordinary
/// `new_process` callers always spawn unprivileged.
///
/// `blocking` selects how the arena/table locks are acquired: `new_process`
/// runs in thread context, where another process legitimately holding either
/// lock is just ordinary preemption, so it blocks until both are free.
/// Cron's spawn pass runs from the tick handler and must never block there
/// (spec.md §9); it passes `false` and fails the spawn, to be retried next
/// tick by the stretch mechanism in `evaluate_cron`.
fn spawn_locked(
    k: &mut Kernel,
    entry: EntryFn,
    stack_bytes: usize,
    nice: i32,
    fit: i32,
    privileged: bool,
    blocking: bool,
) -> Result<ProcessId, KernelError> {
    if blocking {
        k.arena.lock.acquire();
    } else if !k.arena.lock.try_acquire() {
        return Err(KernelError::OutOfMemory);
    }
    let base = k.arena.alloc(stack_bytes, abi::AllocKind::Stack);
    k.arena.lock.release();
    let base = base?;

    if blocking {
        k.table.lock.acquire();
    } else if !k.table.lock.try_acquire() {
        k.arena.free(base);
        return Err(KernelError::OutOfSlots);
    }
    let pid = k.table.alloc_slot();
    k.table.lock.release();
    let pid = match pid {
        Ok(pid) => pid,
        Err(e) => {
            k.arena.free(base);
            return Err(e);
        }
    };

    let tcb = arch::fabricate_stack(base, stack_bytes, entry, exit_trampoline);
    let slot = k.table.get_mut(pid);
    slot.flags = abi::ProcessFlags::IN_USE;
    if privileged {
        slot.flags |= abi::ProcessFlags::PRIVILEGED;
    }
    slot.entry_point = entry as usize;
    slot.nice = Nice::new(nice);
    slot.fit = Fit::new(fit);
    slot.time_slice = slot.fit.slice_ticks();
    slot.tcb = tcb;
    k.table.ready_push_back(pid);
    Ok(pid)
}

/// Enables the tick source and parks in the idle process. Never returns.
pub fn run() -> ! {
    arch::start_first_task()
}

/// The single kernel-call dispatch point. Mediates `EXIT` and `SUSPEND`
/// requests from the calling process.
pub fn kcall(cmd: Cmd) {
    // Safety: masked below for the duration of the table/arena mutation.
    arch::mask_tick_priority(|| unsafe {
        with_kernel(|k| kerncore::kcall::dispatch(&mut k.table, &mut k.arena, k.current, cmd));
    });
    KCALL_PENDING.store(true, Ordering::Release);
    arch::request_reschedule();
    while KCALL_PENDING.load(Ordering::Acquire) {
        core::hint::spin_loop();
    }
}

/// The current process's saved stack pointer. Used once, at boot, by
/// `arch::start_first_task` to bootstrap the very first task switch.
///
/// # Safety
/// Must only be called after `boot` has populated the idle process's TCB and
/// before any reschedule has run.
pub(crate) unsafe fn current_sp() -> usize {
    with_kernel(|k| k.table.get(k.current).tcb.sp)
}

/// The id of the process currently selected to run.
pub fn current() -> ProcessId {
    // Safety: read-only, and `current` only changes from the reschedule
    // handler, which cannot run concurrently with this read on a single core.
    unsafe { with_kernel(|k| k.current) }
}

/// Arms the current process's wake-up alarm for `ticks` ticks from now.
/// Used by `sleep` before suspending.
pub fn set_current_alarm(ticks: u32) {
    unsafe {
        with_kernel(|k| {
            let deadline = k.clock.ticks().checked_add_u32(ticks);
            k.table.get_mut(k.current).alarm = Some(deadline);
        })
    }
}

/// Binds the current process's wake-up condition to `sem`. Used by `wait`
/// before suspending.
pub fn set_current_sem(sem: &'static Semaphore) {
    unsafe {
        with_kernel(|k| {
            k.table.get_mut(k.current).sem = Some(sem);
        })
    }
}

pub fn clock() -> Ticks {
    unsafe { with_kernel(|k| k.clock.ticks()) }
}

pub fn time() -> Seconds {
    unsafe { with_kernel(|k| k.clock.now()) }
}

pub fn settime(now: Seconds) {
    unsafe { with_kernel(|k| k.clock.set_now(now)) }
}

pub fn service_add(f: EntryFn, every_ticks: u32) -> Result<(), KernelError> {
    unsafe {
        with_kernel(|k| {
            k.services.lock.acquire();
            let result = k.services.add(f, every_ticks);
            k.services.lock.release();
            result
        })
    }
}

pub fn service_remove(f: EntryFn) {
    unsafe {
        with_kernel(|k| {
            k.services.lock.acquire();
            k.services.remove(f);
            k.services.lock.release();
        })
    }
}

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
    unsafe {
        with_kernel(|k| {
            k.cron
                .add(f, stack_bytes, Nice::new(nice), Fit::new(fit), privileged, at, every)
        })
    }
}

pub fn cron_remove(f: EntryFn) {
    unsafe { with_kernel(|k| k.cron.remove(f)) }
}

/// Called from [`arch`]'s tick handler. Advances the clock, runs due
/// services, evaluates cron at second boundaries (and while stretching),
/// and decrements the running process's time slice. Never calls the
/// scheduler directly; the caller is responsible for requesting a
/// reschedule.
///
/// # Safety
/// Must only be called from the tick handler's own context.
pub unsafe fn tick_entry() {
    with_kernel(|k| {
        let crossed_second = k.clock.tick();
        profiling::event_tick(k.clock.ticks());

        if !k.services.lock.is_locked() {
            k.services.run_due(k.clock.ticks());
        }

        if crossed_second {
            evaluate_cron(k);
        }
        if k.cron.is_stretching() {
            evaluate_cron(k);
        }

        if k.table.ready_head().is_some() {
            let slot = k.table.get_mut(k.current);
            if slot.time_slice > 0 {
                slot.time_slice -= 1;
            }
        }
    });
}

fn evaluate_cron(k: &mut Kernel) {
    if k.arena.lock.is_locked() || k.table.lock.is_locked() {
        k.cron.set_stretch(true);
        return;
    }
    k.cron.set_stretch(false);

    let now = k.clock.now();
    let mut due = [None; abi::MAX_CRON_ENTRIES];
    let mut count = 0;
    for entry in k.cron.due(now) {
        due[count] = Some(*entry);
        count += 1;
    }

    for entry in due.into_iter().flatten() {
        let exists = k
            .table
            .ready_iter()
            .chain(k.table.wait_iter())
            .any(|pid| k.table.get(pid).entry_point == entry.f as usize);
        if exists {
            continue;
        }
        if let Ok(pid) = spawn_locked(
            k,
            entry.f,
            entry.stack_bytes,
            entry.nice.get() as i32,
            entry.fit.get() as i32,
            entry.privileged,
            false,
        ) {
            profiling::event_cron_spawn(pid);
        }
    }
}

/// Called from [`arch`]'s reschedule handler with the stack pointer it just
/// saved the outgoing process's register window to. Stores it, clears the
/// pending kernel-call flag, asks the scheduler for the next process, and
/// returns the stack pointer to switch to -- or 0 if the reschedule handler
/// should resume the same process it interrupted.
///
/// # Safety
/// Must only be called from the reschedule handler's own context, with
/// `saved_sp` pointing at a just-saved, valid register window.
pub unsafe fn reschedule_entry(saved_sp: usize) -> usize {
    with_kernel(|k| {
        k.table.get_mut(k.current).tcb.sp = saved_sp;
        KCALL_PENDING.store(false, Ordering::Release);

        let next = kerncore::sched::schedule(&mut k.table, k.clock.ticks());
        if next == k.current {
            0
        } else {
            profiling::event_reschedule(k.current, next);
            k.current = next;
            k.table.get(next).tcb.sp
        }
    })
}
