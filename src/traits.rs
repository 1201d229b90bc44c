//! The remote history seam.
//!
//! [`IncrementalSync`](crate::ingest::IncrementalSync) talks to the hosting
//! service only through [`RemoteHistory`]. The GitHub client in
//! [`connector_github`](crate::connector_github) is the built-in
//! implementation; tests and other hosts plug in their own.
//!
//! ```text
//! ┌──────────────┐      ┌───────────────┐      ┌──────────────┐
//! │  StateStore  │◀────▶│IncrementalSync│─────▶│RemoteHistory │
//! └──────────────┘      └───────┬───────┘      │ GitHub / ... │
//!                               ▼              └──────────────┘
//!                          SyncResult
//! ```
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use repo_tracker::error::TrackerError;
//! use repo_tracker::models::{CommitRecord, ReleaseRecord};
//! use repo_tracker::traits::RemoteHistory;
//!
//! pub struct Quiet;
//!
//! #[async_trait]
//! impl RemoteHistory for Quiet {
//!     fn name(&self) -> &str { "quiet" }
//!
//!     async fn commits_since(&self, _: Option<&str>, _: usize)
//!         -> Result<Vec<CommitRecord>, TrackerError> { Ok(vec![]) }
//!
//!     async fn releases_since(&self, _: Option<&str>, _: usize)
//!         -> Result<Vec<ReleaseRecord>, TrackerError> { Ok(vec![]) }
//!
//!     async fn read_file(&self, _: &str)
//!         -> Result<Option<String>, TrackerError> { Ok(None) }
//! }
//! ```

use async_trait::async_trait;

use crate::error::TrackerError;
use crate::models::{CommitRecord, ReleaseRecord};

/// Read access to one upstream project's commit and release history.
#[async_trait]
pub trait RemoteHistory: Send + Sync {
    /// Identifier of the upstream project (e.g. `"owner/repo"`), for logs.
    fn name(&self) -> &str;

    /// Commits newer than `marker`, oldest first.
    ///
    /// With `marker == None`, returns up to `limit` of the most recent
    /// commits. With a marker, returns every commit after it that one
    /// logical fetch can see; `limit` is ignored. The marker commit itself
    /// is never included.
    async fn commits_since(
        &self,
        marker: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CommitRecord>, TrackerError>;

    /// Releases newer than the release tagged `marker`, oldest first.
    /// Same bounds as [`commits_since`](RemoteHistory::commits_since).
    async fn releases_since(
        &self,
        marker: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ReleaseRecord>, TrackerError>;

    /// Raw content of `path` at the default branch tip, `None` if absent.
    async fn read_file(&self, path: &str) -> Result<Option<String>, TrackerError>;
}
