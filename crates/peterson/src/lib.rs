//! peterson: two-party mutual exclusion over a fixed pool of lock slots.
//!
//! Slots are claimed from a [`PairLockArena`] with [`PairLockArena::create`]
//! and addressed by [`SlotId`]. Each slot admits exactly two contenders,
//! distinguished by their [`Role`].

mod arena;
mod error;
mod slot;

pub use arena::{DEFAULT_CAPACITY, PairLockArena, SlotSnapshot};
pub use error::{PairLockError, Result};
pub use slot::{Role, SlotId};

/// Version of this crate, reported alongside the tournament version.
pub const PETERSON_VERSION: &str = env!("CARGO_PKG_VERSION");
