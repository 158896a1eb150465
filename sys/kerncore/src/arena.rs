// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The arena allocator.
//!
//! A single best-fit allocator serves both downward-growing process stacks
//! and upward-growing heap blocks out of one contiguous RAM extent. One
//! allocation table tracks every live block; it is kept sorted by `(tag,
//! address)` after every mutation, which makes the free space between any two
//! consecutive non-`Unused` entries a simple subtraction.

use core::sync::atomic::{AtomicBool, Ordering};

use abi::{AllocKind, KernelError, MAX_ALLOC_ENTRIES};

/// Word alignment applied to every allocation request.
const WORD: usize = core::mem::size_of::<usize>();

/// Tag ordering is significant: it is the primary sort key, so that
/// `Bottom < Block < Top < Unused` always holds and every gap lies between
/// two adjacent table entries.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum Tag {
    Bottom,
    Block,
    Top,
    Unused,
}

#[derive(Copy, Clone, Debug)]
pub struct Entry {
    pub tag: Tag,
    pub addr: usize,
    pub size: usize,
}

impl Entry {
    const fn unused() -> Self {
        Entry {
            tag: Tag::Unused,
            addr: 0,
            size: 0,
        }
    }
}

/// A spin lock with no owner tracking, matching the allocator's contract:
/// it is only ever taken from user-level code, and the tick handler only
/// ever reads [`Spinlock::is_locked`] to decide whether to stretch deferred
/// work across another tick.
pub struct Spinlock {
    busy: AtomicBool,
}

impl Spinlock {
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn try_acquire(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    /// Probe accessor for contexts (the tick handler) that must never block.
    pub fn is_locked(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Busy-waits for the lock. Only appropriate from process context; never
    /// call this from the tick handler (see [`Self::is_locked`] instead).
    pub fn acquire(&self) {
        while !self.try_acquire() {
            core::hint::spin_loop();
        }
    }
}

impl Default for Spinlock {
    fn default() -> Self {
        Self::new()
    }
}

/// The allocation table plus the spin lock that guards it.
pub struct Arena {
    entries: [Entry; MAX_ALLOC_ENTRIES],
    pub lock: Spinlock,
}

impl Arena {
    /// Creates an arena over `[base, end)`. `end - base` need not be word
    /// aligned; the allocator only ever hands out word-aligned blocks inside
    /// it.
    pub const fn new() -> Self {
        Arena {
            entries: [Entry::unused(); MAX_ALLOC_ENTRIES],
            lock: Spinlock::new(),
        }
    }

    /// Must be called exactly once, before any `alloc`/`free`.
    pub fn init(&mut self, base: usize, end: usize) {
        self.entries = [Entry::unused(); MAX_ALLOC_ENTRIES];
        self.entries[0] = Entry {
            tag: Tag::Bottom,
            addr: base,
            size: 0,
        };
        self.entries[1] = Entry {
            tag: Tag::Top,
            addr: end,
            size: 0,
        };
        self.sort();
    }

    fn sort(&mut self) {
        self.entries
            .sort_unstable_by(|a, b| a.tag.cmp(&b.tag).then(a.addr.cmp(&b.addr)));
    }

    /// Best-fit allocation. See spec'd algorithm: round up to word size, find
    /// the smallest gap that fits, place at the bottom of the gap for `Heap`
    /// or the top of the gap for `Stack`.
    pub fn alloc(&mut self, size: usize, kind: AllocKind) -> Result<usize, KernelError> {
        if size == 0 {
            return Err(KernelError::InvalidArgument);
        }
        let size = (size + WORD - 1) & !(WORD - 1);

        let free_slot = self
            .entries
            .iter()
            .position(|e| e.tag == Tag::Unused)
            .ok_or(KernelError::OutOfMemory)?;

        let mut best_gap = usize::MAX;
        let mut best_base = None;
        for pair in self.entries.windows(2) {
            let (cur, next) = (pair[0], pair[1]);
            if cur.tag == Tag::Unused || next.tag == Tag::Unused {
                continue;
            }
            let gap = next.addr - (cur.addr + cur.size);
            if size <= gap && gap < best_gap {
                best_gap = gap;
                best_base = Some(cur.addr + cur.size);
            }
        }

        let candidate = best_base.ok_or(KernelError::OutOfMemory)?;
        let base = match kind {
            AllocKind::Heap => candidate,
            AllocKind::Stack => candidate + (best_gap - size),
        };

        self.entries[free_slot] = Entry {
            tag: Tag::Block,
            addr: base,
            size,
        };
        self.sort();
        Ok(base)
    }

    /// Frees the block at `addr`. A no-op (not an error) if no such block
    /// exists, matching the allocator's sentinel-only error model.
    pub fn free(&mut self, addr: usize) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.tag == Tag::Block && e.addr == addr)
        {
            *entry = Entry::unused();
        }
        self.sort();
    }

    /// Number of table entries currently holding a live block. Exposed for
    /// invariant checks and tests.
    pub fn live_block_count(&self) -> usize {
        self.entries.iter().filter(|e| e.tag == Tag::Block).count()
    }

    #[cfg(test)]
    pub(crate) fn entries(&self) -> &[Entry] {
        &self.entries
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(size: usize) -> Arena {
        let mut a = Arena::new();
        a.init(0x1000, 0x1000 + size);
        a
    }

    #[test]
    fn bottom_and_top_always_present() {
        let a = fresh(1000);
        let bottoms = a.entries().iter().filter(|e| e.tag == Tag::Bottom).count();
        let tops = a.entries().iter().filter(|e| e.tag == Tag::Top).count();
        assert_eq!(bottoms, 1);
        assert_eq!(tops, 1);
    }

    #[test]
    fn table_stays_sorted_by_tag_then_address() {
        let mut a = fresh(1000);
        a.alloc(100, AllocKind::Heap).unwrap();
        a.alloc(50, AllocKind::Stack).unwrap();
        for pair in a.entries().windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            assert!((prev.tag, prev.addr) <= (next.tag, next.addr));
        }
    }

    #[test]
    fn rejects_zero_size() {
        let mut a = fresh(1000);
        assert_eq!(a.alloc(0, AllocKind::Heap), Err(KernelError::InvalidArgument));
    }

    #[test]
    fn best_fit_reuses_freed_gap_before_growing() {
        let mut a = fresh(1000);
        let p1 = a.alloc(100, AllocKind::Heap).unwrap();
        let _p2 = a.alloc(300, AllocKind::Heap).unwrap();
        a.free(p1);
        let p3 = a.alloc(50, AllocKind::Heap).unwrap();
        // p3 should land in the hole p1 left behind, not after p2.
        assert_eq!(p3, 0x1000);
    }

    #[test]
    fn stack_allocations_land_at_the_top_of_their_gap() {
        let mut a = fresh(1000);
        let word_aligned_400 = (400 + WORD - 1) & !(WORD - 1);
        let p = a.alloc(400, AllocKind::Stack).unwrap();
        assert_eq!(p, 0x1000 + 1000 - word_aligned_400);
    }

    #[test]
    fn free_then_alloc_round_trips_table_contents() {
        let mut a = fresh(1000);
        let before = a.live_block_count();
        let p = a.alloc(64, AllocKind::Heap).unwrap();
        a.free(p);
        assert_eq!(a.live_block_count(), before);
    }
}
