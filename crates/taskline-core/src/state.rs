//! Shared sync state types.

use std::fmt;

/// Orchestrator phase published to observers.
///
/// `Failed` is transient and is always followed by `Idle`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncPhase {
    #[default]
    Idle,
    Syncing,
    Reconciling,
    Failed,
}

impl SyncPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Reconciling => "reconciling",
            Self::Failed => "failed",
        }
    }

    /// Whether a round is running
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Syncing | Self::Reconciling)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
