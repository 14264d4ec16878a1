//! Slot identifiers, contender roles, and the per-slot atomic state.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::PairLockError;

/// Index of a slot inside a [`PairLockArena`](crate::PairLockArena).
///
/// Range checking against the arena capacity happens on every operation;
/// conversion from a signed raw id only rejects negative values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(usize);

impl SlotId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for SlotId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl TryFrom<i64> for SlotId {
    type Error = PairLockError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        usize::try_from(raw)
            .map(Self)
            .map_err(|_| PairLockError::invalid(format!("slot id {raw} is negative")))
    }
}

/// Which side of a pair lock a contender plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Role {
    Zero,
    One,
}

impl Role {
    /// The role of the other contender on the same slot.
    pub const fn other(self) -> Self {
        match self {
            Role::Zero => Role::One,
            Role::One => Role::Zero,
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Role::Zero => 0,
            Role::One => 1,
        }
    }

    /// Role selected by a single bit (0 or 1).
    pub const fn from_bit(bit: usize) -> Self {
        if bit & 1 == 0 { Role::Zero } else { Role::One }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

impl From<Role> for u8 {
    fn from(role: Role) -> Self {
        role.index() as u8
    }
}

impl TryFrom<u8> for Role {
    type Error = PairLockError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Role::Zero),
            1 => Ok(Role::One),
            other => Err(PairLockError::invalid(format!("role {other} is not 0 or 1"))),
        }
    }
}

impl TryFrom<i64> for Role {
    type Error = PairLockError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Role::Zero),
            1 => Ok(Role::One),
            other => Err(PairLockError::invalid(format!("role {other} is not 0 or 1"))),
        }
    }
}

/// Atomic state of one Peterson lock.
pub(crate) struct PairLockSlot {
    pub active: AtomicBool,
    pub flag: [AtomicBool; 2],
    pub turn: AtomicU8,
}

impl PairLockSlot {
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            flag: [AtomicBool::new(false), AtomicBool::new(false)],
            turn: AtomicU8::new(0),
        }
    }

    /// Clear both intent flags and the tie-breaker. Only called by the
    /// thread that just won the claim on `active`.
    pub fn reset(&self) {
        self.flag[0].store(false, Ordering::SeqCst);
        self.flag[1].store(false, Ordering::SeqCst);
        self.turn.store(0, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn turn(&self) -> Role {
        Role::from_bit(self.turn.load(Ordering::SeqCst) as usize)
    }
}
