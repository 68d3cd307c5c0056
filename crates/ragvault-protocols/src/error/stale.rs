//! Staleness flags attached to query responses.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why keyword results were served from an older snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    /// The relaxed consistency policy allows serving the previous snapshot.
    RelaxedPolicy,
    /// A strict rebuild exceeded its synchronous budget.
    RebuildTimedOut,
}

/// Not an error: keyword scoring used a snapshot older than the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleIndexWarning {
    pub snapshot_version: u64,
    pub store_version: u64,
    pub reason: StaleReason,
}

impl StaleIndexWarning {
    pub fn new(snapshot_version: u64, store_version: u64, reason: StaleReason) -> Self {
        Self {
            snapshot_version,
            store_version,
            reason,
        }
    }

    /// Number of mutations the snapshot is behind.
    pub fn lag(&self) -> u64 {
        self.store_version.saturating_sub(self.snapshot_version)
    }
}

impl fmt::Display for StaleIndexWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self.reason {
            StaleReason::RelaxedPolicy => "relaxed policy",
            StaleReason::RebuildTimedOut => "rebuild timed out",
        };
        write!(
            f,
            "keyword index at version {} behind store version {} ({})",
            self.snapshot_version, self.store_version, reason
        )
    }
}
