//! Fixed-capacity arena of Peterson lock slots.
//!
//! Slots are claimed with an atomic swap on `active`, so concurrent
//! `create` callers never share a slot. Destroying a slot is only safe once
//! no contender references it; the arena does not enforce that.

use std::sync::atomic::{AtomicU64, Ordering, fence};

use serde::Serialize;

use crate::error::{PairLockError, Result};
use crate::slot::{PairLockSlot, Role, SlotId};

/// Enough slots for a 16-way tournament (15 internal nodes).
pub const DEFAULT_CAPACITY: usize = 15;

/// Point-in-time view of one slot, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotSnapshot {
    pub id: SlotId,
    pub active: bool,
    pub flags: [bool; 2],
    pub turn: Role,
}

pub struct PairLockArena {
    slots: Box<[PairLockSlot]>,
    contended_spins: AtomicU64,
}

impl Default for PairLockArena {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for PairLockArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairLockArena")
            .field("capacity", &self.capacity())
            .field("active", &self.active_count())
            .finish()
    }
}

impl PairLockArena {
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity).map(|_| PairLockSlot::new()).collect();
        Self {
            slots,
            contended_spins: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_active()).count()
    }

    /// Whether `id` names a slot that is currently claimed.
    pub fn is_active(&self, id: SlotId) -> bool {
        self.slots.get(id.index()).is_some_and(PairLockSlot::is_active)
    }

    /// Total spin iterations spent waiting in `acquire` across all slots.
    pub fn contended_spins(&self) -> u64 {
        self.contended_spins.load(Ordering::Relaxed)
    }

    /// Claim the first inactive slot and reset its lock state.
    pub fn create(&self) -> Result<SlotId> {
        for (index, slot) in self.slots.iter().enumerate() {
            if !slot.active.swap(true, Ordering::AcqRel) {
                slot.reset();
                let id = SlotId::new(index);
                tracing::debug!(slot = %id, "Pair lock created");
                return Ok(id);
            }
        }

        tracing::warn!(capacity = self.capacity(), "Pair lock arena exhausted");
        Err(PairLockError::NoFreeSlot {
            capacity: self.capacity(),
        })
    }

    /// Enter the slot as `role`, spinning until the other role is out.
    pub fn acquire(&self, id: SlotId, role: Role) -> Result<()> {
        let slot = self.active_slot(id)?;
        let other = role.other();

        slot.flag[role.index()].store(true, Ordering::SeqCst);
        fence(Ordering::SeqCst);
        slot.turn.store(other.index() as u8, Ordering::SeqCst);
        fence(Ordering::SeqCst);

        let mut spins: u64 = 0;
        while Self::must_wait(slot, other) {
            spins += 1;
            std::thread::yield_now();
            fence(Ordering::SeqCst);
        }

        if spins > 0 {
            self.contended_spins.fetch_add(spins, Ordering::Relaxed);
            tracing::trace!(slot = %id, %role, spins, "Pair lock acquired after waiting");
        }
        Ok(())
    }

    /// One non-spinning attempt at entering the slot.
    ///
    /// Returns `Ok(false)` when the other role holds or has priority; the
    /// caller's intent flag is withdrawn again in that case.
    pub fn try_acquire(&self, id: SlotId, role: Role) -> Result<bool> {
        let slot = self.active_slot(id)?;
        let other = role.other();

        slot.flag[role.index()].store(true, Ordering::SeqCst);
        fence(Ordering::SeqCst);
        slot.turn.store(other.index() as u8, Ordering::SeqCst);
        fence(Ordering::SeqCst);

        if Self::must_wait(slot, other) {
            slot.flag[role.index()].store(false, Ordering::Release);
            fence(Ordering::SeqCst);
            return Ok(false);
        }
        Ok(true)
    }

    /// Leave the slot, letting the other role in.
    pub fn release(&self, id: SlotId, role: Role) -> Result<()> {
        let slot = self.active_slot(id)?;
        slot.flag[role.index()].store(false, Ordering::Release);
        fence(Ordering::SeqCst);
        Ok(())
    }

    /// Return the slot to the arena for a later `create`.
    pub fn destroy(&self, id: SlotId) -> Result<()> {
        let slot = self.slot(id)?;
        slot.active
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PairLockError::Inactive(id))?;
        tracing::debug!(slot = %id, "Pair lock destroyed");
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| SlotSnapshot {
                id: SlotId::new(index),
                active: slot.is_active(),
                flags: [
                    slot.flag[0].load(Ordering::SeqCst),
                    slot.flag[1].load(Ordering::SeqCst),
                ],
                turn: slot.turn(),
            })
            .collect()
    }

    fn must_wait(slot: &PairLockSlot, other: Role) -> bool {
        slot.flag[other.index()].load(Ordering::SeqCst)
            && slot.turn.load(Ordering::SeqCst) == other.index() as u8
    }

    fn slot(&self, id: SlotId) -> Result<&PairLockSlot> {
        self.slots.get(id.index()).ok_or_else(|| {
            PairLockError::invalid(format!(
                "slot id {id} out of range (capacity {})",
                self.capacity()
            ))
        })
    }

    fn active_slot(&self, id: SlotId) -> Result<&PairLockSlot> {
        let slot = self.slot(id)?;
        if !slot.is_active() {
            return Err(PairLockError::Inactive(id));
        }
        Ok(slot)
    }
}
