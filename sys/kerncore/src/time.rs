// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The tick clock, the periodic services list, and the cron list.
//!
//! Both lists were heap nodes in the originating design; here they are
//! fixed-capacity arrays of optional entries, the same "pointers become
//! indices" substitution applied to the process queues. Removal only clears
//! a slot, so relative insertion order among the survivors is preserved
//! without needing to compact the array.

use abi::{KernelError, Fit, Nice, Seconds, Ticks, MAX_CRON_ENTRIES, MAX_SERVICES};

use crate::arena::Spinlock;

/// A process entry point, as a bare function pointer. Two entry points
/// compare equal iff they point at the same function, which is what
/// `cron_remove`/`service_remove` key on.
pub type EntryFn = fn();

/// Monotonic tick counter plus the wall-clock second counter it's derived
/// from. `tick_hz` ticks elapse per wall-clock second.
#[derive(Copy, Clone, Debug)]
pub struct Clock {
    ticks: Ticks,
    now: Seconds,
    tick_hz: u32,
}

impl Clock {
    pub const fn new(tick_hz: u32) -> Self {
        Clock {
            ticks: Ticks(0),
            now: Seconds(0),
            tick_hz,
        }
    }

    pub fn ticks(&self) -> Ticks {
        self.ticks
    }

    pub fn now(&self) -> Seconds {
        self.now
    }

    pub fn set_now(&mut self, now: Seconds) {
        self.now = now;
    }

    /// Advances the tick counter by one. Returns `true` on the tick that also
    /// advances the wall-clock second (and did so), signalling that cron
    /// should be evaluated.
    pub fn tick(&mut self) -> bool {
        self.ticks = self.ticks.checked_add_u32(1);
        if self.tick_hz != 0 && self.ticks.0 % self.tick_hz as u64 == 0 {
            self.now = Seconds(self.now.0.wrapping_add(1));
            true
        } else {
            false
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct ServiceEntry {
    f: EntryFn,
    every_ticks: u32,
}

/// Periodic, tick-granularity callbacks. Installed with [`ServiceList::add`],
/// invoked from the tick handler's own context.
pub struct ServiceList {
    entries: [Option<ServiceEntry>; MAX_SERVICES],
    pub lock: Spinlock,
}

impl ServiceList {
    pub const fn new() -> Self {
        ServiceList {
            entries: [None; MAX_SERVICES],
            lock: Spinlock::new(),
        }
    }

    pub fn add(&mut self, f: EntryFn, every_ticks: u32) -> Result<(), KernelError> {
        let slot = self
            .entries
            .iter_mut()
            .find(|e| e.is_none())
            .ok_or(KernelError::OutOfSlots)?;
        *slot = Some(ServiceEntry { f, every_ticks });
        Ok(())
    }

    pub fn remove(&mut self, f: EntryFn) {
        if let Some(slot) = self.entries.iter_mut().find(|e| matches!(e, Some(e) if e.f == f)) {
            *slot = None;
        }
    }

    /// Invokes every entry due at `ticks`, in insertion order. The caller is
    /// responsible for skipping this entirely when [`Spinlock::is_locked`]
    /// reports configuration in progress.
    pub fn run_due(&self, ticks: Ticks) {
        for entry in self.entries.iter().flatten() {
            if entry.every_ticks != 0 && ticks.0 % entry.every_ticks as u64 == 0 {
                (entry.f)();
            }
        }
    }
}

impl Default for ServiceList {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, Debug)]
pub struct CronEntry {
    pub f: EntryFn,
    pub stack_bytes: usize,
    pub nice: Nice,
    pub fit: Fit,
    pub privileged: bool,
    pub at: Seconds,
    pub every: Seconds,
}

impl CronEntry {
    /// Does this entry fire at wall-clock second `now`? `every == 0` means
    /// "once, at `at`, never again".
    fn due_at(&self, now: Seconds) -> bool {
        if now == self.at {
            return true;
        }
        self.every.0 != 0 && now.0 >= self.at.0 && (now.0 - self.at.0) % self.every.0 == 0
    }
}

/// Deferred-spawn registrations, evaluated once per wall-clock second.
pub struct CronList {
    entries: [Option<CronEntry>; MAX_CRON_ENTRIES],
    stretch: bool,
}

impl CronList {
    pub const fn new() -> Self {
        CronList {
            entries: [None; MAX_CRON_ENTRIES],
            stretch: false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        f: EntryFn,
        stack_bytes: usize,
        nice: Nice,
        fit: Fit,
        privileged: bool,
        at: Seconds,
        every: Seconds,
    ) -> Result<(), KernelError> {
        let slot = self
            .entries
            .iter_mut()
            .find(|e| e.is_none())
            .ok_or(KernelError::OutOfSlots)?;
        *slot = Some(CronEntry {
            f,
            stack_bytes,
            nice,
            fit,
            privileged,
            at,
            every,
        });
        Ok(())
    }

    pub fn remove(&mut self, f: EntryFn) {
        if let Some(slot) = self.entries.iter_mut().find(|e| matches!(e, Some(e) if e.f == f)) {
            *slot = None;
        }
    }

    /// Entries whose wake condition matches `now`, in insertion order.
    pub fn due(&self, now: Seconds) -> impl Iterator<Item = &CronEntry> {
        self.entries.iter().flatten().filter(move |e| e.due_at(now))
    }

    pub fn is_stretching(&self) -> bool {
        self.stretch
    }

    pub fn set_stretch(&mut self, stretch: bool) {
        self.stretch = stretch;
    }
}

impl Default for CronList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    static SERVICE_HITS: AtomicU32 = AtomicU32::new(0);
    fn bump_service() {
        SERVICE_HITS.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn clock_advances_now_exactly_once_per_tick_hz_ticks() {
        let mut c = Clock::new(10);
        let mut seconds_elapsed = 0;
        for _ in 0..25 {
            if c.tick() {
                seconds_elapsed += 1;
            }
        }
        assert_eq!(seconds_elapsed, 2);
        assert_eq!(c.now(), Seconds(2));
        assert_eq!(c.ticks(), Ticks(25));
    }

    #[test]
    fn service_runs_every_n_ticks_across_fifty_ticks() {
        SERVICE_HITS.store(0, Ordering::Relaxed);
        let mut services = ServiceList::new();
        services.add(bump_service, 5).unwrap();
        for t in 1..=50u64 {
            services.run_due(Ticks(t));
        }
        assert_eq!(SERVICE_HITS.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn cron_entry_is_due_at_first_fire_and_every_period_after() {
        let entry = CronEntry {
            f: bump_service,
            stack_bytes: 256,
            nice: Nice::new(0),
            fit: Fit::new(0),
            privileged: false,
            at: Seconds(3),
            every: Seconds(10),
        };
        assert!(!entry.due_at(Seconds(2)));
        assert!(entry.due_at(Seconds(3)));
        assert!(!entry.due_at(Seconds(5)));
        assert!(entry.due_at(Seconds(13)));
        assert!(entry.due_at(Seconds(23)));
    }

    #[test]
    fn cron_remove_drops_only_the_matching_entry() {
        let mut cron = CronList::new();
        cron.add(bump_service, 256, Nice::new(0), Fit::new(0), false, Seconds(1), Seconds(0))
            .unwrap();
        assert_eq!(cron.due(Seconds(1)).count(), 1);
        cron.remove(bump_service);
        assert_eq!(cron.due(Seconds(1)).count(), 0);
    }
}
