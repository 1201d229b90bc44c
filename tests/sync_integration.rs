//! Integration tests for the sync pipeline.
//!
//! These drive `IncrementalSync` end to end against an in-memory
//! `RemoteHistory` and a real on-disk `StateStore`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use repo_tracker::error::{SyncStage, TrackerError};
use repo_tracker::ingest::IncrementalSync;
use repo_tracker::models::{Category, CommitRecord, ReleaseRecord, SyncMode};
use repo_tracker::state::StateStore;
use repo_tracker::traits::RemoteHistory;
use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

// ─── In-memory remote ───────────────────────────────────────────────

/// Remote holding commits and releases oldest first.
#[derive(Default)]
struct InMemoryRemote {
    commits: Mutex<Vec<CommitRecord>>,
    releases: Mutex<Vec<ReleaseRecord>>,
    files: Mutex<HashMap<String, String>>,
    fail_fetch: AtomicBool,
    unauthorized_files: AtomicBool,
    /// Extra items returned on every listing, to exercise deduplication.
    repeat_last_commit: AtomicBool,
}

fn window<T: Clone>(items: &[T], marker: Option<&str>, limit: usize, key: fn(&T) -> &str) -> Vec<T> {
    match marker {
        None => {
            let start = items.len().saturating_sub(limit);
            items[start..].to_vec()
        }
        Some(m) => match items.iter().position(|i| key(i) == m) {
            Some(pos) => items[pos + 1..].to_vec(),
            None => items.to_vec(),
        },
    }
}

#[async_trait]
impl RemoteHistory for InMemoryRemote {
    fn name(&self) -> &str {
        "inmemory/repo"
    }

    async fn commits_since(
        &self,
        marker: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CommitRecord>, TrackerError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(TrackerError::TransientFetch {
                attempts: 3,
                message: "HTTP 502".to_string(),
            });
        }
        let commits = self.commits.lock().unwrap();
        let mut out = window(commits.as_slice(), marker, limit, |c| c.hash.as_str());
        if self.repeat_last_commit.load(Ordering::SeqCst) {
            if let Some(last) = out.last().cloned() {
                out.push(last);
            }
        }
        Ok(out)
    }

    async fn releases_since(
        &self,
        marker: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ReleaseRecord>, TrackerError> {
        let releases = self.releases.lock().unwrap();
        Ok(window(releases.as_slice(), marker, limit, |r| r.tag.as_str()))
    }

    async fn read_file(&self, path: &str) -> Result<Option<String>, TrackerError> {
        if self.unauthorized_files.load(Ordering::SeqCst) {
            return Err(TrackerError::Auth("Bad credentials".to_string()));
        }
        Ok(self.files.lock().unwrap().get(path).cloned())
    }
}

impl InMemoryRemote {
    fn push_commit(&self, hash: &str, message: &str, at: DateTime<Utc>) {
        self.commits.lock().unwrap().push(commit(hash, message, at));
    }

    fn push_release(&self, tag: &str, at: DateTime<Utc>) {
        self.releases.lock().unwrap().push(release(tag, at));
    }

    fn set_file(&self, path: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

fn commit(hash: &str, message: &str, at: DateTime<Utc>) -> CommitRecord {
    CommitRecord {
        hash: hash.to_string(),
        message: message.to_string(),
        author: "dev".to_string(),
        timestamp: at,
        url: None,
        categories: Default::default(),
    }
}

fn release(tag: &str, at: DateTime<Utc>) -> ReleaseRecord {
    ReleaseRecord {
        tag: tag.to_string(),
        name: None,
        published_at: Some(at),
        author: None,
        body: String::new(),
        url: format!("https://example.test/releases/{}", tag),
        prerelease: false,
        assets: vec![],
        changelog: None,
    }
}

/// Remote with `n` commits an hour apart and `m` releases a day apart.
fn seeded_remote(n: usize, m: usize) -> InMemoryRemote {
    let remote = InMemoryRemote::default();
    for i in 0..n {
        remote.push_commit(
            &format!("c{:04}", i),
            &format!("chore: step {}", i),
            base_time() + Duration::hours(i as i64),
        );
    }
    for i in 0..m {
        remote.push_release(&format!("v1.{}.0", i), base_time() + Duration::days(i as i64));
    }
    remote
}

fn setup() -> (TempDir, StateStore) {
    let tmp = TempDir::new().unwrap();
    let store = StateStore::new(tmp.path().join("state"));
    (tmp, store)
}

// ─── Bootstrap ──────────────────────────────────────────────────────

#[tokio::test]
async fn bootstrap_takes_bounded_window() {
    let (_tmp, store) = setup();
    let remote = seeded_remote(120, 20);

    let result = IncrementalSync::new("demo", &store, &remote)
        .bootstrap_limits(100, 15)
        .run()
        .await
        .unwrap();

    assert_eq!(result.mode, SyncMode::Bootstrap);
    assert_eq!(result.commits.len(), 100);
    assert_eq!(result.releases.len(), 15);
    assert_eq!(result.state.total_commits_processed, 100);
    assert_eq!(result.state.total_releases_processed, 15);
    assert_eq!(result.state.last_commit_marker.as_deref(), Some("c0119"));
    assert_eq!(result.state.last_release_marker.as_deref(), Some("v1.19.0"));

    let stored = store.load("demo").unwrap().unwrap();
    assert_eq!(stored, result.state);
}

#[tokio::test]
async fn bootstrap_of_empty_repo_persists_state() {
    let (_tmp, store) = setup();
    let remote = InMemoryRemote::default();

    let result = IncrementalSync::new("empty", &store, &remote)
        .run()
        .await
        .unwrap();

    assert!(result.is_empty());
    assert_eq!(result.state.last_commit_marker, None);
    assert!(store.load("empty").unwrap().is_some());

    // Next run is incremental
    let again = IncrementalSync::new("empty", &store, &remote)
        .run()
        .await
        .unwrap();
    assert_eq!(again.mode, SyncMode::Incremental);
}

// ─── Incremental ────────────────────────────────────────────────────

#[tokio::test]
async fn incremental_fetches_only_new_items() {
    let (_tmp, store) = setup();
    let remote = seeded_remote(10, 2);

    IncrementalSync::new("demo", &store, &remote)
        .run()
        .await
        .unwrap();

    remote.push_commit("n1", "feat: add export", base_time() + Duration::days(30));
    remote.push_commit("n2", "fix: crash on start", base_time() + Duration::days(31));
    remote.push_release("v2.0.0", base_time() + Duration::days(31));

    let result = IncrementalSync::new("demo", &store, &remote)
        .run()
        .await
        .unwrap();

    assert_eq!(result.mode, SyncMode::Incremental);
    let hashes: Vec<&str> = result.commits.iter().map(|c| c.hash.as_str()).collect();
    assert_eq!(hashes, vec!["n1", "n2"]);
    assert!(result.commits[0].categories.contains(&Category::Feature));
    assert!(result.commits[1].categories.contains(&Category::BugFix));
    assert_eq!(result.releases.len(), 1);
    assert_eq!(result.state.last_commit_marker.as_deref(), Some("n2"));
    assert_eq!(result.state.total_commits_processed, 12);
    assert_eq!(result.state.total_releases_processed, 3);
}

#[tokio::test]
async fn rerun_without_upstream_change_is_idempotent() {
    let (_tmp, store) = setup();
    let remote = seeded_remote(5, 1);

    IncrementalSync::new("demo", &store, &remote)
        .run()
        .await
        .unwrap();
    let before = fs::read_to_string(store.state_path("demo")).unwrap();

    let result = IncrementalSync::new("demo", &store, &remote)
        .run()
        .await
        .unwrap();

    assert!(result.is_empty());
    let after = fs::read_to_string(store.state_path("demo")).unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn skewed_timestamps_never_move_state_backward() {
    let (_tmp, store) = setup();
    let remote = seeded_remote(3, 0);

    let first = IncrementalSync::new("demo", &store, &remote)
        .run()
        .await
        .unwrap();
    let first_ts = first.state.last_commit_timestamp.unwrap();

    // A newer commit whose author date predates the stored timestamp.
    remote.push_commit("late", "rebase artifact", base_time() - Duration::days(5));

    let second = IncrementalSync::new("demo", &store, &remote)
        .run()
        .await
        .unwrap();

    assert_eq!(second.commits.len(), 1);
    assert_eq!(second.state.last_commit_timestamp, Some(first_ts));
    assert!(second.state.last_sync_timestamp >= first.state.last_sync_timestamp);
    assert_eq!(second.state.total_commits_processed, 4);
}

#[tokio::test]
async fn skewed_head_is_not_redelivered() {
    let (_tmp, store) = setup();
    let remote = seeded_remote(3, 0);

    IncrementalSync::new("demo", &store, &remote)
        .run()
        .await
        .unwrap();

    let n1_at = base_time() + Duration::days(2);
    remote.push_commit("n1", "feat: next", n1_at);
    remote.push_commit("late", "fix: rebased", base_time() - Duration::days(5));

    let second = IncrementalSync::new("demo", &store, &remote)
        .run()
        .await
        .unwrap();
    let hashes: Vec<&str> = second.commits.iter().map(|c| c.hash.as_str()).collect();
    assert_eq!(hashes, vec!["n1", "late"]);
    assert_eq!(second.state.last_commit_marker.as_deref(), Some("late"));
    assert_eq!(second.state.last_commit_timestamp, Some(n1_at));
    assert_eq!(second.state.total_commits_processed, 5);
    let before = fs::read_to_string(store.state_path("demo")).unwrap();

    let third = IncrementalSync::new("demo", &store, &remote)
        .run()
        .await
        .unwrap();
    assert!(third.is_empty());
    assert_eq!(third.state.total_commits_processed, 5);
    assert_eq!(fs::read_to_string(store.state_path("demo")).unwrap(), before);
}

#[tokio::test]
async fn release_published_out_of_listing_order_is_not_redelivered() {
    let (_tmp, store) = setup();
    let remote = seeded_remote(1, 2);

    IncrementalSync::new("demo", &store, &remote)
        .run()
        .await
        .unwrap();

    // Listed by creation; the second one was published earlier.
    let published = base_time() + Duration::days(10);
    remote.push_release("v2.0.0", published);
    remote.push_release("v1.2.0", base_time() + Duration::days(3));

    let second = IncrementalSync::new("demo", &store, &remote)
        .run()
        .await
        .unwrap();
    assert_eq!(second.releases.len(), 2);
    assert_eq!(second.state.last_release_marker.as_deref(), Some("v1.2.0"));
    assert_eq!(second.state.last_release_timestamp, Some(published));

    let third = IncrementalSync::new("demo", &store, &remote)
        .run()
        .await
        .unwrap();
    assert!(third.is_empty());
    assert_eq!(third.state.total_releases_processed, 4);
}

#[tokio::test]
async fn repeated_records_are_counted_once() {
    let (_tmp, store) = setup();
    let remote = seeded_remote(4, 0);
    remote.repeat_last_commit.store(true, Ordering::SeqCst);

    let result = IncrementalSync::new("demo", &store, &remote)
        .run()
        .await
        .unwrap();

    assert_eq!(result.commits.len(), 4);
    assert_eq!(result.state.total_commits_processed, 4);
}

// ─── Changelog enrichment ───────────────────────────────────────────

const CHANGELOG: &str = "# Changelog

## [2.5.0] - 2026-02-01

### Added
- Export to CSV

## [2.4.0] - 2026-01-10

- Older notes
";

#[tokio::test]
async fn releases_get_matching_changelog_section() {
    let (_tmp, store) = setup();
    let remote = InMemoryRemote::default();
    remote.push_release("v2.5.0", base_time());
    remote.push_release("v2.6.0-rc1", base_time() + Duration::days(1));
    remote.set_file("CHANGELOG.md", CHANGELOG);

    let result = IncrementalSync::new("demo", &store, &remote)
        .changelog(Some("CHANGELOG.md".to_string()))
        .run()
        .await
        .unwrap();

    let enriched = &result.releases[0];
    assert_eq!(enriched.tag, "v2.5.0");
    let section = enriched.changelog.as_deref().unwrap();
    assert!(section.contains("Export to CSV"));
    assert!(!section.contains("Older notes"));

    // Unmatched release is still reported, just without notes.
    assert_eq!(result.releases[1].tag, "v2.6.0-rc1");
    assert!(result.releases[1].changelog.is_none());
    assert_eq!(result.state.total_releases_processed, 2);
}

#[tokio::test]
async fn missing_changelog_does_not_fail_sync() {
    let (_tmp, store) = setup();
    let remote = seeded_remote(0, 1);

    let result = IncrementalSync::new("demo", &store, &remote)
        .changelog(Some("CHANGELOG.md".to_string()))
        .run()
        .await
        .unwrap();

    assert_eq!(result.releases.len(), 1);
    assert!(result.releases[0].changelog.is_none());
}

#[tokio::test]
async fn rejected_credentials_on_changelog_abort() {
    let (_tmp, store) = setup();
    let remote = seeded_remote(0, 1);
    remote.unauthorized_files.store(true, Ordering::SeqCst);

    let err = IncrementalSync::new("demo", &store, &remote)
        .changelog(Some("CHANGELOG.md".to_string()))
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.stage, SyncStage::Changelog);
    assert!(err.is_fatal());
    assert!(store.load("demo").unwrap().is_none());
}

// ─── Failure atomicity ──────────────────────────────────────────────

#[tokio::test]
async fn failed_fetch_leaves_state_untouched() {
    let (_tmp, store) = setup();
    let remote = seeded_remote(5, 0);

    IncrementalSync::new("demo", &store, &remote)
        .run()
        .await
        .unwrap();
    let before = store.load("demo").unwrap().unwrap();

    remote.push_commit("n1", "feat: new", base_time() + Duration::days(2));
    remote.fail_fetch.store(true, Ordering::SeqCst);

    let err = IncrementalSync::new("demo", &store, &remote)
        .run()
        .await
        .unwrap_err();
    assert_eq!(err.stage, SyncStage::IncrementalFetch);
    assert!(!err.state_advanced);
    assert!(matches!(err.source, TrackerError::TransientFetch { .. }));
    assert_eq!(store.load("demo").unwrap().unwrap(), before);

    // Once the remote recovers, the same commit is picked up.
    remote.fail_fetch.store(false, Ordering::SeqCst);
    let result = IncrementalSync::new("demo", &store, &remote)
        .run()
        .await
        .unwrap();
    assert_eq!(result.commits.len(), 1);
    assert_eq!(result.commits[0].hash, "n1");
}

#[tokio::test]
async fn failed_bootstrap_fetch_reports_bootstrap_stage() {
    let (_tmp, store) = setup();
    let remote = seeded_remote(5, 0);
    remote.fail_fetch.store(true, Ordering::SeqCst);

    let err = IncrementalSync::new("demo", &store, &remote)
        .run()
        .await
        .unwrap_err();
    assert_eq!(err.stage, SyncStage::Bootstrap);
    assert!(store.load("demo").unwrap().is_none());
}

#[tokio::test]
async fn failed_write_keeps_previous_state() {
    let (_tmp, store) = setup();
    let remote = seeded_remote(3, 0);

    IncrementalSync::new("demo", &store, &remote)
        .run()
        .await
        .unwrap();
    let before = store.load("demo").unwrap().unwrap();

    // A directory where the temp file should go makes the write fail.
    fs::create_dir_all(store.dir().join("demo.json.tmp")).unwrap();
    remote.push_commit("n1", "feat: new", base_time() + Duration::days(2));

    let err = IncrementalSync::new("demo", &store, &remote)
        .run()
        .await
        .unwrap_err();
    assert_eq!(err.stage, SyncStage::Persistence);
    assert!(!err.state_advanced);
    assert_eq!(store.load("demo").unwrap().unwrap(), before);
}

#[tokio::test]
async fn corrupt_state_is_surfaced_not_repaired() {
    let (_tmp, store) = setup();
    let remote = seeded_remote(3, 0);
    fs::create_dir_all(store.dir()).unwrap();
    fs::write(store.state_path("demo"), "{ not json").unwrap();

    let err = IncrementalSync::new("demo", &store, &remote)
        .run()
        .await
        .unwrap_err();
    assert_eq!(err.stage, SyncStage::LoadState);
    assert!(err.is_fatal());
    assert!(matches!(err.source, TrackerError::StateCorrupt { .. }));
    assert_eq!(
        fs::read_to_string(store.state_path("demo")).unwrap(),
        "{ not json"
    );
}
