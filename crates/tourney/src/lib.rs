//! tourney: N-way mutual exclusion from a tournament of Peterson pair locks.
//!
//! A [`TournamentTree`] claims `N - 1` pair locks from a shared
//! [`PairLockArena`](peterson::PairLockArena). Each [`Participant`] wins the
//! locks on its leaf-to-root path to enter the critical section. The
//! [`Coordinator`] spawns participants, waits for them, and tears the tree
//! down.

mod error;
mod version;

pub mod coordinator;
pub mod logging;
pub mod participant;
pub mod report;
pub mod spawner;
pub mod tree;

pub use coordinator::{Completion, Coordinator, ParticipantOutcome, TournamentConfig};
pub use error::{Result, TournamentError};
pub use participant::{CriticalSection, Participant, ParticipantState};
pub use report::RunReport;
pub use spawner::{ParticipantSpawner, SpawnError, ThreadSpawner};
pub use tree::{PathStep, SUPPORTED_COUNTS, TournamentTree, is_supported_count};
pub use version::{TOURNEY_VERSION, VersionInfo};

pub use peterson::{PairLockArena, PairLockError, Role, SlotId};
