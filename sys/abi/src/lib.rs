// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel ABI definitions, shared between the kernel and process-facing code.

#![no_std]

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Upper bound on the number of process-table slots, including the idle
/// process. This is a compile-time constant so the process table can live in
/// `.bss` as a fixed-size array rather than behind an allocator.
pub const MAX_PROCESSES: usize = 32;

/// Upper bound on the number of entries in the allocation table (arena
/// allocator). Each live stack or heap block costs one entry, plus the
/// permanent `Bottom`/`Top` entries.
pub const MAX_ALLOC_ENTRIES: usize = 64;

/// Inclusive bounds on `nice` and `fit`.
pub const PRIORITY_RANGE: core::ops::RangeInclusive<i8> = -10..=10;

/// Reference time-slice length, in ticks, for a process with `fit == 0`.
pub const DEFAULT_SLICE_TICKS: u32 = 10;

/// Upper bound on concurrently registered periodic services.
pub const MAX_SERVICES: usize = 16;

/// Upper bound on concurrently registered cron entries.
pub const MAX_CRON_ENTRIES: usize = 16;

/// Process identifier. Stable for the lifetime of the slot; slot 0 is
/// reserved for the idle process and is always in use.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, FromBytes, IntoBytes, Immutable, Unaligned,
)]
#[repr(transparent)]
pub struct ProcessId(pub u8);

impl ProcessId {
    /// The idle process. Always resident, always runnable.
    pub const IDLE: Self = Self(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn from_index(index: usize) -> Self {
        Self(index as u8)
    }
}

/// Signed scheduling priority: lower is more important. Clamped to
/// [`PRIORITY_RANGE`] at construction.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[repr(transparent)]
pub struct Nice(i8);

impl Nice {
    pub fn new(value: i32) -> Self {
        Self(value.clamp(*PRIORITY_RANGE.start() as i32, *PRIORITY_RANGE.end() as i32) as i8)
    }

    /// Const constructor for static/default table entries. Does not clamp;
    /// callers must pass a value already within `PRIORITY_RANGE`.
    pub const fn new_const(value: i8) -> Self {
        Self(value)
    }

    pub fn get(self) -> i8 {
        self.0
    }

    /// Is `self` strictly higher-priority (lower value) than `other`?
    pub fn is_more_important_than(self, other: Self) -> bool {
        self.0 < other.0
    }
}

/// Signed bias on time-slice length: positive lengthens, negative shortens.
/// Clamped to [`PRIORITY_RANGE`] at construction.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[repr(transparent)]
pub struct Fit(i8);

impl Fit {
    pub fn new(value: i32) -> Self {
        Self(value.clamp(*PRIORITY_RANGE.start() as i32, *PRIORITY_RANGE.end() as i32) as i8)
    }

    /// Const constructor for static/default table entries. Does not clamp;
    /// callers must pass a value already within `PRIORITY_RANGE`.
    pub const fn new_const(value: i8) -> Self {
        Self(value)
    }

    pub fn get(self) -> i8 {
        self.0
    }

    /// Computes the time-slice length this bias implies, starting from
    /// [`DEFAULT_SLICE_TICKS`]. Floored at 1 tick.
    pub fn slice_ticks(self) -> u32 {
        let fit = f32::from(self.0);
        let scale = if fit >= 0.0 {
            0.10 * fit + 1.0
        } else {
            0.05 * fit + 1.0
        };
        let slice = (scale * DEFAULT_SLICE_TICKS as f32).round();
        if slice < 1.0 {
            1
        } else {
            slice as u32
        }
    }
}

/// Placement policy for a single arena allocation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AllocKind {
    /// Grows upward from the bottom of the chosen gap.
    Heap,
    /// Grows downward from the top of the chosen gap.
    Stack,
}

/// The three failure modes the kernel ever reports, all by sentinel return
/// value (see the allocator and process-table contracts).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KernelError {
    /// The arena allocator had no free table entry, or no gap large enough.
    OutOfMemory,
    /// The process table had no free slot.
    OutOfSlots,
    /// A zero-size allocation, or some other caller error that can be
    /// rejected without touching kernel state.
    InvalidArgument,
}

impl core::fmt::Display for KernelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            KernelError::OutOfMemory => "out of memory",
            KernelError::OutOfSlots => "out of process slots",
            KernelError::InvalidArgument => "invalid argument",
        };
        f.write_str(msg)
    }
}

/// Commands accepted by the single kernel-call dispatch point, `kcall`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Cmd {
    Exit,
    Suspend,
}

/// Monotonic tick count since boot. The kernel's only notion of elapsed time.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Default)]
#[repr(transparent)]
pub struct Ticks(pub u64);

impl Ticks {
    pub fn checked_add_u32(self, delta: u32) -> Self {
        Ticks(self.0.wrapping_add(delta as u64))
    }
}

impl From<u64> for Ticks {
    fn from(v: u64) -> Self {
        Ticks(v)
    }
}

impl From<Ticks> for u64 {
    fn from(v: Ticks) -> Self {
        v.0
    }
}

/// Wall-clock seconds since a caller-defined epoch.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Default)]
#[repr(transparent)]
pub struct Seconds(pub u32);

impl From<u32> for Seconds {
    fn from(v: u32) -> Self {
        Seconds(v)
    }
}

impl From<Seconds> for u32 {
    fn from(v: Seconds) -> Self {
        v.0
    }
}

bitflags::bitflags! {
    /// Boolean flags tracked per process slot.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
    pub struct ProcessFlags: u8 {
        /// Slot references a live allocation; when clear, every other field
        /// of the slot must be treated as garbage.
        const IN_USE = 1 << 0;
        /// Process runs with elevated/privileged access (reserved for
        /// services installed via `service_add`, which execute on the
        /// kernel stack).
        const PRIVILEGED = 1 << 1;
    }
}
