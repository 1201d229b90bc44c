//! Core data models used throughout the tracker.
//!
//! These types represent the persisted tracker state, the commits and
//! releases that flow through one sync, and the result handed to the
//! synthesis stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Durable processing state for one tracked project.
///
/// Owned by [`StateStore`](crate::state::StateStore) on disk and replaced
/// wholesale by each successful sync. Timestamps never move backward and
/// the counters only grow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerState {
    pub project_id: String,
    #[serde(default)]
    pub last_commit_marker: Option<String>,
    #[serde(default)]
    pub last_commit_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_release_marker: Option<String>,
    #[serde(default)]
    pub last_release_timestamp: Option<DateTime<Utc>>,
    pub last_sync_timestamp: DateTime<Utc>,
    pub total_commits_processed: u64,
    pub total_releases_processed: u64,
}

impl TrackerState {
    /// A state that has never seen any history.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            last_commit_marker: None,
            last_commit_timestamp: None,
            last_release_marker: None,
            last_release_timestamp: None,
            last_sync_timestamp: Utc::now(),
            total_commits_processed: 0,
            total_releases_processed: 0,
        }
    }
}

/// A change category assigned by the commit classifier.
///
/// Ordering follows declaration order so category sets iterate stably.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Feature,
    BugFix,
    BreakingChange,
    Documentation,
    Deprecation,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Feature,
        Category::BugFix,
        Category::BreakingChange,
        Category::Documentation,
        Category::Deprecation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Feature => "feature",
            Category::BugFix => "bug-fix",
            Category::BreakingChange => "breaking-change",
            Category::Documentation => "documentation",
            Category::Deprecation => "deprecation",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One upstream commit seen during a sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub hash: String,
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub url: Option<String>,
    /// Empty until the classifier has run; empty afterwards means uncategorized.
    #[serde(default)]
    pub categories: BTreeSet<Category>,
}

impl CommitRecord {
    /// First line of the commit message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    /// Seven-character abbreviated hash.
    pub fn short_hash(&self) -> &str {
        let end = self
            .hash
            .char_indices()
            .nth(7)
            .map(|(i, _)| i)
            .unwrap_or(self.hash.len());
        &self.hash[..end]
    }
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub url: String,
    pub size: u64,
}

/// One upstream release seen during a sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub tag: String,
    pub name: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub body: String,
    pub url: String,
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
    /// Matching section of the project's changelog, when one was found.
    #[serde(default)]
    pub changelog: Option<String>,
}

/// Which path a sync took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// No state existed; a bounded window of recent history was fetched.
    Bootstrap,
    /// Only items newer than the stored markers were fetched.
    Incremental,
}

/// Output of one sync, handed to the synthesis stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub mode: SyncMode,
    /// New commits, oldest first.
    pub commits: Vec<CommitRecord>,
    /// New releases, oldest first.
    pub releases: Vec<ReleaseRecord>,
    /// The state as persisted at the end of the sync.
    pub state: TrackerState,
}

impl SyncResult {
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty() && self.releases.is_empty()
    }
}
