//! Version information for tourney.

/// Tourney version from Cargo.toml
pub const TOURNEY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Versions of the crates making up the lock stack.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionInfo {
    pub tourney: &'static str,
    pub peterson: &'static str,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            tourney: TOURNEY_VERSION,
            peterson: peterson::PETERSON_VERSION,
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tourney {} (peterson {})", self.tourney, self.peterson)
    }
}
