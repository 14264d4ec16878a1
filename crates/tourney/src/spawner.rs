//! How participants are started.

/// Work a spawned participant runs to completion.
pub type ParticipantBody = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("spawn failed: {0}")]
    Other(String),
}

/// Extension point for different participant spawn strategies.
pub trait ParticipantSpawner: Send + Sync {
    fn spawn(&self, index: usize, body: ParticipantBody) -> Result<(), SpawnError>;
}

/// One named OS thread per participant.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner;

impl ParticipantSpawner for ThreadSpawner {
    fn spawn(&self, index: usize, body: ParticipantBody) -> Result<(), SpawnError> {
        std::thread::Builder::new()
            .name(format!("participant-{index}"))
            .spawn(body)?;
        Ok(())
    }
}
