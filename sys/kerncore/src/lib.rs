// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The portable, architecture-independent core of the kernel: the arena
//! allocator, the process table, the scheduler, the tick clock and its
//! services/cron lists, and the pure state transitions behind the
//! kernel-call dispatch point.
//!
//! None of this module touches hardware. It is compiled `no_std` for the
//! real target but built against `std` under `cfg(test)` so its logic can be
//! exercised directly on the host.
#![cfg_attr(not(test), no_std)]

pub mod arena;
pub mod kcall;
pub mod process;
pub mod sched;
pub mod sem;
pub mod time;
