use thiserror::Error;

use crate::slot::SlotId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairLockError {
    #[error("no free pair-lock slot (capacity {capacity})")]
    NoFreeSlot { capacity: usize },

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("pair-lock slot {0} is not active")]
    Inactive(SlotId),
}

impl PairLockError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgs(message.into())
    }
}

pub type Result<T> = std::result::Result<T, PairLockError>;
