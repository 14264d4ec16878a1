//! Summary of a tournament run, printed by the driver with `--report`.

use peterson::SlotId;
use serde::Serialize;

use crate::coordinator::Completion;
use crate::tree::TournamentTree;
use crate::version::VersionInfo;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub version: VersionInfo,
    pub participants: usize,
    pub levels: u32,
    pub lock_slots: Vec<SlotId>,
    pub iterations: usize,
    /// Critical sections completed across all participants.
    pub entries: usize,
    /// Spin iterations spent waiting on pair locks.
    pub contended_spins: u64,
    /// When the run started (ISO 8601 format).
    pub started_at: String,
    /// When the run completed (ISO 8601 format), if finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outcomes: Vec<Completion>,
}

impl RunReport {
    /// Start a report for `tree` with the current time as `started_at`.
    pub fn starting(tree: &TournamentTree, iterations: usize) -> Self {
        Self {
            version: VersionInfo::new(),
            participants: tree.participant_count(),
            levels: tree.levels(),
            lock_slots: tree.slot_ids().to_vec(),
            iterations,
            entries: 0,
            contended_spins: 0,
            started_at: chrono::Utc::now().to_rfc3339(),
            completed_at: None,
            outcomes: Vec::new(),
        }
    }

    /// Record every participant's completion, sorted by index.
    pub fn completed(mut self, mut outcomes: Vec<Completion>, contended_spins: u64) -> Self {
        outcomes.sort_by_key(|c| c.index);
        self.entries = outcomes.iter().map(Completion::entries).sum();
        self.contended_spins = contended_spins;
        self.completed_at = Some(chrono::Utc::now().to_rfc3339());
        self.outcomes = outcomes;
        self
    }
}
