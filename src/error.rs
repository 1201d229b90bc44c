//! Error types for the tracker.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the state store and the remote history client.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// A state file exists but does not hold a valid tracker state.
    /// Never repaired automatically; delete the file to reinitialize.
    #[error("State file {path} is corrupt: {reason}. Delete it (rtrack reset) to reinitialize.")]
    StateCorrupt { path: PathBuf, reason: String },

    /// Network timeout, 5xx, or an explicit retry-later signal that
    /// persisted through the whole retry budget.
    #[error("Transient fetch failure after {attempts} attempt(s): {message}")]
    TransientFetch { attempts: u32, message: String },

    /// The request quota is exhausted; retrying before the reset is pointless.
    #[error("API rate limit exceeded{}; supply or raise credentials", format_reset(.reset_at))]
    RateLimitExceeded { reset_at: Option<DateTime<Utc>> },

    /// Credentials were rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Any other non-retryable API failure.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn format_reset(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(ts) => format!(" (resets at {})", ts.to_rfc3339()),
        None => String::new(),
    }
}

impl TrackerError {
    /// Whether this error should stop a multi-project run outright.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TrackerError::Auth(_) | TrackerError::StateCorrupt { .. } | TrackerError::Config(_)
        )
    }
}

/// The step of a sync that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    LoadState,
    Bootstrap,
    IncrementalFetch,
    Changelog,
    Persistence,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStage::LoadState => "load-state",
            SyncStage::Bootstrap => "bootstrap",
            SyncStage::IncrementalFetch => "incremental-fetch",
            SyncStage::Changelog => "changelog",
            SyncStage::Persistence => "persistence",
        };
        f.write_str(name)
    }
}

/// A failed sync: which stage broke, and whether persisted state moved.
#[derive(Error, Debug)]
#[error(
    "sync of '{project_id}' failed during {stage} (state {}): {source}",
    advanced_label(.state_advanced)
)]
pub struct SyncError {
    pub project_id: String,
    pub stage: SyncStage,
    pub state_advanced: bool,
    #[source]
    pub source: TrackerError,
}

fn advanced_label(advanced: &bool) -> &'static str {
    if *advanced {
        "advanced"
    } else {
        "not advanced"
    }
}

impl SyncError {
    pub fn new(project_id: &str, stage: SyncStage, source: TrackerError) -> Self {
        Self {
            project_id: project_id.to_string(),
            stage,
            state_advanced: false,
            source,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.source.is_fatal()
    }
}
