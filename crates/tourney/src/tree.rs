//! Tournament tree over a flat array of pair locks.
//!
//! Internal node `i` (root = 0) has children `2i + 1` and `2i + 2`, so the
//! lock a participant meets at each level is a closed-form function of its
//! leaf index. Level `levels - 1` is nearest the leaves, level 0 is the root.

use std::sync::Arc;

use peterson::{PairLockArena, Role, SlotId};
use serde::Serialize;

use crate::error::{Result, TournamentError};
use crate::participant::Participant;

/// Participant counts the tree can be built for.
pub const SUPPORTED_COUNTS: [usize; 4] = [2, 4, 8, 16];

pub fn is_supported_count(participant_count: usize) -> bool {
    SUPPORTED_COUNTS.contains(&participant_count)
}

/// One pair lock on a participant's path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PathStep {
    pub level: u32,
    pub role: Role,
    /// Internal-node index within the tree.
    pub lock_index: usize,
    /// Arena slot backing that node.
    pub slot: SlotId,
}

/// Role and internal-node index for `self_index` at `level`.
pub(crate) fn locate(levels: u32, level: u32, self_index: usize) -> (Role, usize) {
    let shift = levels - level - 1;
    let bitmask = 1usize << shift;
    let role = Role::from_bit((self_index & bitmask) >> shift);
    let lock_index = (self_index >> (levels - level)) + ((1usize << level) - 1);
    (role, lock_index)
}

pub(crate) struct TreeInner {
    arena: Arc<PairLockArena>,
    participant_count: usize,
    levels: u32,
    slot_ids: Box<[SlotId]>,
    destroyed: bool,
}

impl TreeInner {
    pub(crate) fn arena(&self) -> &PairLockArena {
        &self.arena
    }

    pub(crate) fn participant_count(&self) -> usize {
        self.participant_count
    }

    /// Leaf-to-root path for `self_index`, which must already be in range.
    pub(crate) fn path(&self, self_index: usize) -> Vec<PathStep> {
        (0..self.levels)
            .rev()
            .map(|level| {
                let (role, lock_index) = locate(self.levels, level, self_index);
                PathStep {
                    level,
                    role,
                    lock_index,
                    slot: self.slot_ids[lock_index],
                }
            })
            .collect()
    }

    fn destroy_slots(&mut self) -> Result<()> {
        self.destroyed = true;
        let mut first_error = None;
        for &id in self.slot_ids.iter() {
            if let Err(e) = self.arena.destroy(id) {
                tracing::error!(slot = %id, error = %e, "Failed to destroy pair lock");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

impl Drop for TreeInner {
    fn drop(&mut self) {
        if !self.destroyed {
            tracing::warn!(
                participants = self.participant_count,
                "Tournament tree dropped without destroy - returning pair locks"
            );
            let _ = self.destroy_slots();
        }
    }
}

/// Complete binary tree of `N - 1` pair locks for `N` participants.
pub struct TournamentTree {
    inner: Arc<TreeInner>,
}

impl std::fmt::Debug for TournamentTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TournamentTree")
            .field("participant_count", &self.inner.participant_count)
            .field("levels", &self.inner.levels)
            .field("slot_ids", &self.inner.slot_ids)
            .finish()
    }
}

impl TournamentTree {
    /// Claim `participant_count - 1` pair locks from `arena`.
    ///
    /// If the arena runs out partway, the slots already claimed are returned
    /// before the error is reported.
    pub fn new(arena: Arc<PairLockArena>, participant_count: usize) -> Result<Self> {
        if !is_supported_count(participant_count) {
            return Err(TournamentError::InvalidCount(participant_count));
        }

        let levels = participant_count.trailing_zeros();
        let lock_count = participant_count - 1;

        let mut slot_ids = Vec::with_capacity(lock_count);
        for _ in 0..lock_count {
            match arena.create() {
                Ok(id) => slot_ids.push(id),
                Err(e) => {
                    for &id in &slot_ids {
                        if let Err(destroy_err) = arena.destroy(id) {
                            tracing::warn!(
                                slot = %id,
                                error = %destroy_err,
                                "Failed to return pair lock after partial build"
                            );
                        }
                    }
                    return Err(e.into());
                }
            }
        }

        tracing::info!(
            participants = participant_count,
            levels,
            locks = lock_count,
            "Tournament tree built"
        );

        Ok(Self {
            inner: Arc::new(TreeInner {
                arena,
                participant_count,
                levels,
                slot_ids: slot_ids.into_boxed_slice(),
                destroyed: false,
            }),
        })
    }

    pub fn participant_count(&self) -> usize {
        self.inner.participant_count
    }

    pub fn levels(&self) -> u32 {
        self.inner.levels
    }

    pub fn lock_count(&self) -> usize {
        self.inner.slot_ids.len()
    }

    /// Arena slots by internal-node index (index 0 is the root).
    pub fn slot_ids(&self) -> &[SlotId] {
        &self.inner.slot_ids
    }

    pub fn arena(&self) -> &Arc<PairLockArena> {
        &self.inner.arena
    }

    /// Locks `self_index` acquires, leaf to root.
    pub fn path(&self, self_index: usize) -> Result<Vec<PathStep>> {
        self.check_index(self_index)?;
        Ok(self.inner.path(self_index))
    }

    /// Locks `self_index` releases, root to leaf.
    pub fn release_path(&self, self_index: usize) -> Result<Vec<PathStep>> {
        let mut path = self.path(self_index)?;
        path.reverse();
        Ok(path)
    }

    /// A view of the tree for the participant at leaf `self_index`.
    pub fn participant(&self, self_index: usize) -> Result<Participant> {
        self.check_index(self_index)?;
        Ok(Participant::new(Arc::clone(&self.inner), self_index))
    }

    /// Participant views handed out and not yet dropped.
    pub fn outstanding_participants(&self) -> usize {
        Arc::strong_count(&self.inner) - 1
    }

    /// Return every pair lock to the arena.
    ///
    /// Refused while participant views are alive; in that case the locks go
    /// back to the arena once the last view is dropped.
    pub fn destroy(self) -> Result<()> {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.destroy_slots()?;
                tracing::info!(
                    participants = inner.participant_count,
                    "Tournament tree destroyed"
                );
                Ok(())
            }
            Err(shared) => {
                let outstanding = Arc::strong_count(&shared) - 1;
                tracing::error!(outstanding, "Tournament tree destroyed with live participants");
                Err(TournamentError::ParticipantsOutstanding { outstanding })
            }
        }
    }

    fn check_index(&self, self_index: usize) -> Result<()> {
        if self_index >= self.inner.participant_count {
            return Err(TournamentError::InvalidArgs(format!(
                "participant index {self_index} out of range for {} participants",
                self.inner.participant_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn tree(n: usize) -> TournamentTree {
        TournamentTree::new(Arc::new(PairLockArena::default()), n).unwrap()
    }

    fn steps(path: &[PathStep]) -> Vec<(u32, usize, Role)> {
        path.iter().map(|s| (s.level, s.lock_index, s.role)).collect()
    }

    #[test]
    fn supported_counts_size_the_tree() {
        for n in SUPPORTED_COUNTS {
            let arena = Arc::new(PairLockArena::default());
            let tree = TournamentTree::new(Arc::clone(&arena), n).unwrap();
            assert_eq!(tree.levels(), n.ilog2());
            assert_eq!(tree.lock_count(), n - 1);
            assert_eq!(arena.active_count(), n - 1);
            tree.destroy().unwrap();
            assert_eq!(arena.active_count(), 0);
        }
    }

    #[test]
    fn unsupported_counts_are_rejected() {
        let arena = Arc::new(PairLockArena::default());
        for n in [0, 1, 3, 6, 12, 32] {
            assert!(matches!(
                TournamentTree::new(Arc::clone(&arena), n),
                Err(TournamentError::InvalidCount(count)) if count == n
            ));
        }
        assert_eq!(arena.active_count(), 0);
    }

    #[test]
    fn four_way_paths() {
        let tree = tree(4);
        let (zero, one) = (Role::Zero, Role::One);

        assert_eq!(steps(&tree.path(0).unwrap()), [(1, 1, zero), (0, 0, zero)]);
        assert_eq!(steps(&tree.path(1).unwrap()), [(1, 1, one), (0, 0, zero)]);
        assert_eq!(steps(&tree.path(2).unwrap()), [(1, 2, zero), (0, 0, one)]);
        assert_eq!(steps(&tree.path(3).unwrap()), [(1, 2, one), (0, 0, one)]);
    }

    #[test]
    fn release_path_mirrors_acquire_path() {
        for n in SUPPORTED_COUNTS {
            let tree = tree(n);
            for index in 0..n {
                let mut acquire = tree.path(index).unwrap();
                acquire.reverse();
                assert_eq!(acquire, tree.release_path(index).unwrap());
            }
        }
    }

    #[test]
    fn paths_climb_one_node_per_level() {
        for n in SUPPORTED_COUNTS {
            let tree = tree(n);
            for index in 0..n {
                let path = tree.path(index).unwrap();
                assert_eq!(path.len(), tree.levels() as usize);

                // Leaf level: the lowest bit picks the side of the first lock.
                assert_eq!(path[0].role, Role::from_bit(index));
                let nodes: HashSet<_> = path.iter().map(|s| s.lock_index).collect();
                assert_eq!(nodes.len(), path.len());

                for pair in path.windows(2) {
                    let (child, parent) = (pair[0], pair[1]);
                    assert_eq!(parent.level + 1, child.level);
                    assert_eq!(parent.lock_index, (child.lock_index - 1) / 2);
                    let right_child = child.lock_index == 2 * parent.lock_index + 2;
                    assert_eq!(parent.role, Role::from_bit(right_child as usize));
                }
                assert_eq!(path.last().map(|s| s.lock_index), Some(0));
            }
        }
    }

    #[test]
    fn leaf_pairs_share_a_lock_with_opposite_roles() {
        let tree = tree(8);
        for index in (0..8).step_by(2) {
            let left = tree.path(index).unwrap()[0];
            let right = tree.path(index + 1).unwrap()[0];
            assert_eq!(left.lock_index, right.lock_index);
            assert_eq!((left.role, right.role), (Role::Zero, Role::One));
        }
    }

    #[test]
    fn path_index_out_of_range() {
        let tree = tree(2);
        assert!(matches!(tree.path(2), Err(TournamentError::InvalidArgs(_))));
        assert!(matches!(
            tree.participant(5),
            Err(TournamentError::InvalidArgs(_))
        ));
    }

    #[test]
    fn exhausted_arena_returns_partial_claims() {
        let arena = Arc::new(PairLockArena::new(5));
        let result = TournamentTree::new(Arc::clone(&arena), 8);
        assert!(matches!(
            result,
            Err(TournamentError::Lock(peterson::PairLockError::NoFreeSlot { capacity: 5 }))
        ));
        assert_eq!(arena.active_count(), 0);
    }

    #[test]
    fn two_sixteen_way_trees_do_not_fit_the_default_arena() {
        let arena = Arc::new(PairLockArena::default());
        let first = TournamentTree::new(Arc::clone(&arena), 16).unwrap();
        assert!(TournamentTree::new(Arc::clone(&arena), 2).is_err());
        first.destroy().unwrap();
        TournamentTree::new(arena, 16).unwrap().destroy().unwrap();
    }

    #[test]
    fn destroy_refused_while_participants_alive() {
        let arena = Arc::new(PairLockArena::default());
        let tree = TournamentTree::new(Arc::clone(&arena), 4).unwrap();
        let view = tree.participant(3).unwrap();
        assert_eq!(tree.outstanding_participants(), 1);

        assert!(matches!(
            tree.destroy(),
            Err(TournamentError::ParticipantsOutstanding { outstanding: 1 })
        ));
        assert_eq!(arena.active_count(), 3);

        drop(view);
        assert_eq!(arena.active_count(), 0);
    }

    #[test]
    fn dropped_tree_returns_locks() {
        let arena = Arc::new(PairLockArena::default());
        drop(TournamentTree::new(Arc::clone(&arena), 16).unwrap());
        assert_eq!(arena.active_count(), 0);
    }

    #[test]
    fn four_way_path_serializes() {
        let tree = tree(4);
        insta::assert_json_snapshot!("four_way_path_index_2", tree.path(2).unwrap());
    }
}
