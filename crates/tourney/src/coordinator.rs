//! Coordinator - builds the tree and manages participant lifecycle.
//!
//! Flow:
//! 1. Claim `N - 1` pair locks for the tree
//! 2. Spawn participants `1..N`, each with its own view of the tree
//! 3. Run participant 0 on the caller
//! 4. Wait for every spawned participant to report completion
//! 5. Destroy the tree

use std::sync::Arc;

use peterson::PairLockArena;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::{Result, TournamentError};
use crate::participant::Participant;
use crate::spawner::{ParticipantSpawner, ThreadSpawner};
use crate::tree::TournamentTree;

/// Code run inside the critical section: `(self_index, iteration)`.
pub type SectionFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

pub struct TournamentConfig {
    pub participant_count: usize,
    pub iterations: usize,
    pub arena: Arc<PairLockArena>,
    pub spawner: Arc<dyn ParticipantSpawner>,
}

impl TournamentConfig {
    pub fn new(participant_count: usize) -> Self {
        Self {
            participant_count,
            iterations: 1,
            arena: Arc::new(PairLockArena::default()),
            spawner: Arc::new(ThreadSpawner),
        }
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_arena(mut self, arena: Arc<PairLockArena>) -> Self {
        self.arena = arena;
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn ParticipantSpawner>) -> Self {
        self.spawner = spawner;
        self
    }
}

/// How a participant finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParticipantOutcome {
    Done { entries: usize },
    Failed { reason: String },
    Panicked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub index: usize,
    #[serde(flatten)]
    pub outcome: ParticipantOutcome,
}

impl Completion {
    pub fn entries(&self) -> usize {
        match self.outcome {
            ParticipantOutcome::Done { entries } => entries,
            _ => 0,
        }
    }

    fn into_result(self) -> Result<Self> {
        match &self.outcome {
            ParticipantOutcome::Done { .. } => Ok(self),
            ParticipantOutcome::Failed { reason } => Err(TournamentError::ParticipantFailed {
                index: self.index,
                reason: reason.clone(),
            }),
            ParticipantOutcome::Panicked => Err(TournamentError::ParticipantFailed {
                index: self.index,
                reason: "panicked".to_string(),
            }),
        }
    }
}

/// Sends a `Panicked` completion if the participant unwinds before
/// reporting.
struct CompletionGuard {
    index: usize,
    tx: Option<mpsc::UnboundedSender<Completion>>,
}

impl CompletionGuard {
    fn report(mut self, outcome: ParticipantOutcome) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Completion {
                index: self.index,
                outcome,
            });
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            tracing::error!(participant = self.index, "Participant exited without reporting");
            let _ = tx.send(Completion {
                index: self.index,
                outcome: ParticipantOutcome::Panicked,
            });
        }
    }
}

/// Acquire, run the section, release; `iterations` times.
fn run_sections(
    participant: &mut Participant,
    iterations: usize,
    section: &SectionFn,
) -> ParticipantOutcome {
    for iteration in 0..iterations {
        let lock = match participant.lock() {
            Ok(lock) => lock,
            Err(e) => {
                return ParticipantOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };
        section(lock.index(), iteration);
        if let Err(e) = lock.release() {
            return ParticipantOutcome::Failed {
                reason: e.to_string(),
            };
        }
    }
    ParticipantOutcome::Done {
        entries: iterations,
    }
}

fn run_spawned(
    guard: CompletionGuard,
    mut participant: Participant,
    iterations: usize,
    section: SectionFn,
) {
    let index = participant.index();
    tracing::debug!(participant = index, "Participant started");
    let outcome = run_sections(&mut participant, iterations, &section);
    if let ParticipantOutcome::Failed { reason } = &outcome {
        tracing::error!(participant = index, %reason, "Participant failed");
    }
    // The view must be gone before the coordinator learns we finished, so
    // that teardown sees no outstanding participants.
    drop(participant);
    guard.report(outcome);
}

/// Participant 0: owns the tree and collects every other participant.
pub struct Coordinator {
    tree: TournamentTree,
    own: Participant,
    iterations: usize,
    section: SectionFn,
    completions: mpsc::UnboundedReceiver<Completion>,
    pending: usize,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("tree", &self.tree)
            .field("iterations", &self.iterations)
            .field("pending", &self.pending)
            .finish()
    }
}

impl Coordinator {
    /// Build the tree and spawn participants `1..N`.
    ///
    /// A spawn failure aborts the build. Participants spawned before the
    /// failure run to completion on their own; the tree's locks return to
    /// the arena once the last of them exits.
    pub fn build(
        config: TournamentConfig,
        section: impl Fn(usize, usize) + Send + Sync + 'static,
    ) -> Result<Self> {
        let TournamentConfig {
            participant_count,
            iterations,
            arena,
            spawner,
        } = config;

        let tree = TournamentTree::new(arena, participant_count)?;
        let section: SectionFn = Arc::new(section);
        let (tx, rx) = mpsc::unbounded_channel();

        for index in 1..participant_count {
            let participant = tree.participant(index)?;
            let guard = CompletionGuard {
                index,
                tx: Some(tx.clone()),
            };
            let section = Arc::clone(&section);
            spawner
                .spawn(
                    index,
                    Box::new(move || run_spawned(guard, participant, iterations, section)),
                )
                .map_err(|source| {
                    tracing::error!(participant = index, error = %source, "Failed to spawn participant");
                    TournamentError::SpawnFailed { index, source }
                })?;
        }

        tracing::info!(
            participants = participant_count,
            iterations,
            "Participants spawned"
        );

        let own = tree.participant(0)?;
        Ok(Self {
            tree,
            own,
            iterations,
            section,
            completions: rx,
            pending: participant_count - 1,
        })
    }

    pub fn tree(&self) -> &TournamentTree {
        &self.tree
    }

    /// The coordinator's own view (index 0).
    pub fn participant(&mut self) -> &mut Participant {
        &mut self.own
    }

    /// Spawned participants not yet collected.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Run participant 0's critical sections on the calling thread.
    ///
    /// Spins while other participants hold the lock; call it from a thread
    /// that may block.
    pub fn run_own(&mut self) -> Completion {
        let outcome = run_sections(&mut self.own, self.iterations, &self.section);
        Completion { index: 0, outcome }
    }

    /// Wait for the next spawned participant to finish.
    ///
    /// Returns `None` once every participant has been collected.
    pub async fn wait_for_any(&mut self) -> Option<Completion> {
        if self.pending == 0 {
            return None;
        }
        let completion = self.completions.recv().await?;
        self.pending -= 1;
        tracing::debug!(
            participant = completion.index,
            outcome = ?completion.outcome,
            "Participant collected"
        );
        Some(completion)
    }

    /// Collect every spawned participant.
    ///
    /// All participants are collected before a failure is reported.
    pub async fn wait_for_participants(&mut self) -> Result<Vec<Completion>> {
        let mut collected = Vec::with_capacity(self.pending);
        while self.pending > 0 {
            match self.wait_for_any().await {
                Some(completion) => collected.push(completion),
                None => {
                    return Err(TournamentError::JoinClosed {
                        missing: self.pending,
                    });
                }
            }
        }
        collected.sort_by_key(|c| c.index);

        let mut first_failure = None;
        for completion in &collected {
            if let Err(e) = completion.clone().into_result() {
                first_failure.get_or_insert(e);
            }
        }
        match first_failure {
            Some(e) => Err(e),
            None => Ok(collected),
        }
    }

    /// Tear down the tree. Every spawned participant must have been
    /// collected first.
    pub fn destroy(self) -> Result<()> {
        if self.pending > 0 {
            return Err(TournamentError::ParticipantsOutstanding {
                outstanding: self.pending,
            });
        }
        let Self { tree, own, .. } = self;
        drop(own);
        tracing::info!("Cleaning up tournament lock structure");
        tree.destroy()
    }
}
