//! A participant's view of a tournament tree.
//!
//! State machine:
//! `Created -> Acquiring(level) -> InCriticalSection -> Releasing(level) -> Done`
//! with `Failed` terminal on any pair-lock error. A `Done` participant may
//! acquire again.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TournamentError};
use crate::tree::{PathStep, TreeInner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ParticipantState {
    Created,
    Acquiring { level: u32 },
    InCriticalSection,
    Releasing { level: u32 },
    Done,
    Failed,
}

impl ParticipantState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ParticipantState::Failed)
    }
}

pub struct Participant {
    tree: Arc<TreeInner>,
    self_index: usize,
    /// Leaf to root.
    path: Box<[PathStep]>,
    state: ParticipantState,
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("self_index", &self.self_index)
            .field("state", &self.state)
            .finish()
    }
}

impl Participant {
    pub(crate) fn new(tree: Arc<TreeInner>, self_index: usize) -> Self {
        let path = tree.path(self_index).into_boxed_slice();
        Self {
            tree,
            self_index,
            path,
            state: ParticipantState::Created,
        }
    }

    pub fn index(&self) -> usize {
        self.self_index
    }

    pub fn participant_count(&self) -> usize {
        self.tree.participant_count()
    }

    pub fn state(&self) -> ParticipantState {
        self.state
    }

    /// Locks acquired by this participant, leaf to root.
    pub fn path(&self) -> &[PathStep] {
        &self.path
    }

    /// Win every pair lock from the leaf up to the root.
    ///
    /// On a pair-lock error the levels already won are released again
    /// (root-most first) and the participant becomes `Failed`.
    pub fn acquire(&mut self) -> Result<()> {
        match self.state {
            ParticipantState::Failed => {
                return Err(TournamentError::Terminal {
                    index: self.self_index,
                });
            }
            ParticipantState::Created | ParticipantState::Done => {}
            _ => {
                return Err(TournamentError::AlreadyHeld {
                    index: self.self_index,
                });
            }
        }

        for (held, step) in self.path.iter().enumerate() {
            self.state = ParticipantState::Acquiring { level: step.level };
            tracing::trace!(
                participant = self.self_index,
                level = step.level,
                lock = step.lock_index,
                role = %step.role,
                "Acquiring pair lock"
            );

            if let Err(e) = self.tree.arena().acquire(step.slot, step.role) {
                tracing::error!(
                    participant = self.self_index,
                    level = step.level,
                    error = %e,
                    "Pair lock acquire failed - unwinding"
                );
                self.unwind(held);
                self.state = ParticipantState::Failed;
                return Err(e.into());
            }
        }

        self.state = ParticipantState::InCriticalSection;
        tracing::debug!(participant = self.self_index, "Entered critical section");
        Ok(())
    }

    /// Give up every pair lock from the root down to the leaf.
    pub fn release(&mut self) -> Result<()> {
        match self.state {
            ParticipantState::InCriticalSection => {}
            ParticipantState::Failed => {
                return Err(TournamentError::Terminal {
                    index: self.self_index,
                });
            }
            _ => {
                return Err(TournamentError::NotHeld {
                    index: self.self_index,
                });
            }
        }

        // Every level is released even after an error, so siblings sharing
        // the lower locks are not left waiting on a stale flag.
        let mut first_error = None;
        for step in self.path.iter().rev() {
            self.state = ParticipantState::Releasing { level: step.level };
            if let Err(e) = self.tree.arena().release(step.slot, step.role) {
                tracing::error!(
                    participant = self.self_index,
                    level = step.level,
                    error = %e,
                    "Pair lock release failed"
                );
                first_error.get_or_insert(e);
            }
        }

        if let Some(e) = first_error {
            self.state = ParticipantState::Failed;
            return Err(e.into());
        }

        self.state = ParticipantState::Done;
        tracing::debug!(participant = self.self_index, "Left critical section");
        Ok(())
    }

    /// Acquire and return a guard that releases when dropped.
    pub fn lock(&mut self) -> Result<CriticalSection<'_>> {
        self.acquire()?;
        Ok(CriticalSection {
            self_index: self.self_index,
            participant: Some(self),
        })
    }

    // Releases the first `held` steps of the path, root-most first.
    fn unwind(&self, held: usize) {
        for step in self.path[..held].iter().rev() {
            if let Err(e) = self.tree.arena().release(step.slot, step.role) {
                tracing::warn!(
                    participant = self.self_index,
                    level = step.level,
                    error = %e,
                    "Failed to release pair lock while unwinding"
                );
            }
        }
    }
}

/// Held tournament lock. Dropping it releases the lock.
#[must_use = "the tournament lock is released as soon as the guard is dropped"]
pub struct CriticalSection<'a> {
    self_index: usize,
    participant: Option<&'a mut Participant>,
}

impl CriticalSection<'_> {
    pub fn index(&self) -> usize {
        self.self_index
    }

    /// Release explicitly, observing any error.
    pub fn release(mut self) -> Result<()> {
        match self.participant.take() {
            Some(participant) => participant.release(),
            None => Ok(()),
        }
    }
}

impl Drop for CriticalSection<'_> {
    fn drop(&mut self) {
        if let Some(participant) = self.participant.take()
            && let Err(e) = participant.release()
        {
            tracing::error!(
                participant = self.self_index,
                error = %e,
                "Failed to release tournament lock on drop"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TournamentTree;
    use peterson::{PairLockArena, PairLockError};

    fn tree(n: usize) -> (Arc<PairLockArena>, TournamentTree) {
        let arena = Arc::new(PairLockArena::default());
        let tree = TournamentTree::new(Arc::clone(&arena), n).unwrap();
        (arena, tree)
    }

    #[test]
    fn lifecycle_reaches_done() {
        let (_arena, tree) = tree(8);
        let mut participant = tree.participant(5).unwrap();
        assert_eq!(participant.state(), ParticipantState::Created);

        participant.acquire().unwrap();
        assert_eq!(participant.state(), ParticipantState::InCriticalSection);

        participant.release().unwrap();
        assert_eq!(participant.state(), ParticipantState::Done);

        participant.acquire().unwrap();
        participant.release().unwrap();
    }

    #[test]
    fn acquire_sets_one_flag_per_level() {
        let (arena, tree) = tree(4);
        let mut participant = tree.participant(2).unwrap();
        participant.acquire().unwrap();

        let snapshot = arena.snapshot();
        // Index 2 plays role 0 on lock 2 and role 1 on the root.
        assert_eq!(snapshot[tree.slot_ids()[2].index()].flags, [true, false]);
        assert_eq!(snapshot[tree.slot_ids()[0].index()].flags, [false, true]);
        assert_eq!(snapshot[tree.slot_ids()[1].index()].flags, [false, false]);

        participant.release().unwrap();
        assert!(arena.snapshot().iter().all(|s| s.flags == [false, false]));
    }

    #[test]
    fn double_acquire_and_stray_release_are_rejected() {
        let (_arena, tree) = tree(2);
        let mut participant = tree.participant(1).unwrap();

        assert!(matches!(
            participant.release(),
            Err(TournamentError::NotHeld { index: 1 })
        ));
        participant.acquire().unwrap();
        assert!(matches!(
            participant.acquire(),
            Err(TournamentError::AlreadyHeld { index: 1 })
        ));
        participant.release().unwrap();
    }

    #[test]
    fn failure_mid_path_unwinds_and_is_terminal() {
        let (arena, tree) = tree(4);
        let root = tree.slot_ids()[0];
        arena.destroy(root).unwrap();

        let mut participant = tree.participant(1).unwrap();
        let err = participant.acquire().unwrap_err();
        assert!(matches!(
            err,
            TournamentError::Lock(PairLockError::Inactive(slot)) if slot == root
        ));
        assert_eq!(participant.state(), ParticipantState::Failed);

        // The leaf lock won before the failure was given back.
        let leaf = tree.slot_ids()[1];
        assert_eq!(arena.snapshot()[leaf.index()].flags, [false, false]);

        assert!(matches!(
            participant.acquire(),
            Err(TournamentError::Terminal { index: 1 })
        ));
    }

    #[test]
    fn release_failure_still_frees_lower_levels() {
        let (arena, tree) = tree(4);
        let mut participant = tree.participant(1).unwrap();
        participant.acquire().unwrap();

        let root = tree.slot_ids()[0];
        arena.destroy(root).unwrap();

        let err = participant.release().unwrap_err();
        assert!(matches!(
            err,
            TournamentError::Lock(PairLockError::Inactive(slot)) if slot == root
        ));
        assert_eq!(participant.state(), ParticipantState::Failed);

        // The leaf lock below the failed root was still given back, so the
        // sibling on the same leaf lock can get through.
        let leaf = tree.slot_ids()[1];
        assert_eq!(arena.snapshot()[leaf.index()].flags, [false, false]);
        assert!(arena.try_acquire(leaf, peterson::Role::Zero).unwrap());
        arena.release(leaf, peterson::Role::Zero).unwrap();
    }

    #[test]
    fn guard_reports_its_participant() {
        let (_arena, tree) = tree(8);
        let mut participant = tree.participant(6).unwrap();
        let section = participant.lock().unwrap();
        assert_eq!(section.index(), 6);
        section.release().unwrap();
    }

    #[test]
    fn guard_releases_on_drop() {
        let (arena, tree) = tree(4);
        let mut participant = tree.participant(3).unwrap();
        {
            let section = participant.lock().unwrap();
            assert_eq!(section.index(), 3);
        }
        assert_eq!(participant.state(), ParticipantState::Done);
        assert!(arena.snapshot().iter().all(|s| s.flags == [false, false]));

        let section = participant.lock().unwrap();
        section.release().unwrap();
        assert_eq!(participant.state(), ParticipantState::Done);
    }

    #[test]
    fn participant_state_serializes() {
        insta::assert_json_snapshot!(
            "participant_state_all_variants",
            [
                ParticipantState::Created,
                ParticipantState::Acquiring { level: 2 },
                ParticipantState::InCriticalSection,
                ParticipantState::Releasing { level: 0 },
                ParticipantState::Done,
                ParticipantState::Failed,
            ]
        );
    }
}
