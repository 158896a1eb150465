// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Counting semaphores.
//!
//! A semaphore is a bare atomic counter. `post` increments it; a process
//! blocked in `wait` with the semaphore bound to its wake gate observes a
//! positive count once the scheduler re-checks it. There is no "consume on
//! wake" step here: whoever wakes because the count went positive is
//! responsible for decrementing it, exactly once, after it resumes.

use core::sync::atomic::{AtomicU32, Ordering};

pub struct Semaphore {
    count: AtomicU32,
}

impl Semaphore {
    pub const fn new(initial: u32) -> Self {
        Self {
            count: AtomicU32::new(initial),
        }
    }

    pub fn value(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    pub fn post(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements the count, saturating at zero. Called by a process after
    /// it wakes from a wait gated on this semaphore.
    pub fn try_take(&self) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                v.checked_sub(1)
            })
            .is_ok()
    }

    /// Resets the count to `value` outright. Used to implement `unlock` on a
    /// binary semaphore (`value = 1`); storage lifetime is managed by the
    /// caller, not the semaphore itself.
    pub fn close(&self, value: u32) {
        self.count.store(value, Ordering::Release);
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_then_take_round_trips_to_zero() {
        let s = Semaphore::new(0);
        assert_eq!(s.value(), 0);
        s.post();
        assert_eq!(s.value(), 1);
        assert!(s.try_take());
        assert_eq!(s.value(), 0);
    }

    #[test]
    fn take_on_empty_semaphore_fails_without_underflow() {
        let s = Semaphore::new(0);
        assert!(!s.try_take());
        assert_eq!(s.value(), 0);
    }
}
