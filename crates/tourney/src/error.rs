use peterson::PairLockError;
use thiserror::Error;

use crate::spawner::SpawnError;

#[derive(Debug, Error)]
pub enum TournamentError {
    #[error("invalid participant count {0}: must be one of 2, 4, 8 or 16")]
    InvalidCount(usize),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("pair lock: {0}")]
    Lock(#[from] PairLockError),

    #[error("failed to spawn participant {index}: {source}")]
    SpawnFailed {
        index: usize,
        #[source]
        source: SpawnError,
    },

    #[error("participant {index} failed: {reason}")]
    ParticipantFailed { index: usize, reason: String },

    #[error("participant {index} has already failed")]
    Terminal { index: usize },

    #[error("participant {index} already holds the tournament lock")]
    AlreadyHeld { index: usize },

    #[error("participant {index} does not hold the tournament lock")]
    NotHeld { index: usize },

    #[error("{outstanding} participant(s) still hold a view of the tree")]
    ParticipantsOutstanding { outstanding: usize },

    #[error("completion channel closed with {missing} participant(s) unaccounted for")]
    JoinClosed { missing: usize },
}

pub type Result<T> = std::result::Result<T, TournamentError>;
