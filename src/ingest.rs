//! Incremental sync orchestration.
//!
//! One [`IncrementalSync::run`] moves a project through
//!
//! ```text
//! UNINITIALIZED ──▶ BOOTSTRAPPING ──▶ SYNCED ──▶ INCREMENTAL_FETCH ──▶ SYNCED
//!   (no state)       (bounded window)              (since markers)
//! ```
//!
//! 1. Load the state. None on disk means bootstrap: fetch the `N` most
//!    recent commits and `M` most recent releases.
//! 2. Otherwise fetch what is newer than the stored markers.
//! 3. Drop repeats and the marker itself, classify each commit.
//! 4. Attach matching changelog sections to new releases.
//! 5. Compute the next state: markers move to the newest item by
//!    timestamp, timestamps never go backward, counters add the batch size.
//! 6. Persist, then hand the [`SyncResult`] back.
//!
//! Any failure aborts before step 6, so the stored state is exactly what
//! it was and the next run retries from the same markers. An incremental
//! run that finds nothing new does not rewrite the state.

use std::collections::HashSet;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::changelog;
use crate::classify::classify;
use crate::config::{BootstrapConfig, Config, ProjectConfig};
use crate::connector_github::GitHubClient;
use crate::error::{SyncError, SyncStage, TrackerError};
use crate::models::{CommitRecord, ReleaseRecord, SyncMode, SyncResult, TrackerState};
use crate::progress::{NoProgress, ProgressMode, SyncPhase, SyncProgressEvent, SyncProgressReporter};
use crate::report::ChangeReport;
use crate::state::StateStore;
use crate::traits::RemoteHistory;

/// Sync driver for one project.
pub struct IncrementalSync<'a> {
    project_id: String,
    store: &'a StateStore,
    remote: &'a dyn RemoteHistory,
    bootstrap_commits: usize,
    bootstrap_releases: usize,
    changelog_path: Option<String>,
    progress: &'a dyn SyncProgressReporter,
}

impl<'a> IncrementalSync<'a> {
    pub fn new(
        project_id: impl Into<String>,
        store: &'a StateStore,
        remote: &'a dyn RemoteHistory,
    ) -> Self {
        let defaults = BootstrapConfig::default();
        Self {
            project_id: project_id.into(),
            store,
            remote,
            bootstrap_commits: defaults.commits,
            bootstrap_releases: defaults.releases,
            changelog_path: None,
            progress: &NoProgress,
        }
    }

    /// Driver wired from configuration for `project_id`.
    pub fn from_config(
        config: &Config,
        project_id: &str,
        project: &ProjectConfig,
        store: &'a StateStore,
        remote: &'a dyn RemoteHistory,
    ) -> Self {
        Self::new(project_id, store, remote)
            .bootstrap_limits(config.bootstrap.commits, config.bootstrap.releases)
            .changelog(project.changelog().map(str::to_string))
    }

    /// Window sizes for the first sync.
    pub fn bootstrap_limits(mut self, commits: usize, releases: usize) -> Self {
        self.bootstrap_commits = commits;
        self.bootstrap_releases = releases;
        self
    }

    /// Changelog file to enrich releases from; `None` disables enrichment.
    pub fn changelog(mut self, path: Option<String>) -> Self {
        self.changelog_path = path;
        self
    }

    pub fn progress(mut self, reporter: &'a dyn SyncProgressReporter) -> Self {
        self.progress = reporter;
        self
    }

    fn phase(&self, phase: SyncPhase) {
        self.progress.report(SyncProgressEvent::Phase {
            project: self.project_id.clone(),
            phase,
        });
    }

    fn fail(&self, stage: SyncStage) -> impl Fn(TrackerError) -> SyncError + '_ {
        move |e| SyncError::new(&self.project_id, stage, e)
    }

    /// Run one sync. See the module docs for the algorithm.
    pub async fn run(&self) -> Result<SyncResult, SyncError> {
        let id = self.project_id.as_str();

        self.phase(SyncPhase::LoadingState);
        let previous = self.store.load(id).map_err(self.fail(SyncStage::LoadState))?;

        let (mode, stage) = match previous {
            None => {
                info!(project = id, remote = self.remote.name(), "no state found, bootstrapping");
                self.phase(SyncPhase::Bootstrapping);
                (SyncMode::Bootstrap, SyncStage::Bootstrap)
            }
            Some(_) => {
                self.phase(SyncPhase::IncrementalFetch);
                (SyncMode::Incremental, SyncStage::IncrementalFetch)
            }
        };
        let base = previous
            .clone()
            .unwrap_or_else(|| TrackerState::new(id));

        let commit_marker = base.last_commit_marker.as_deref();
        let release_marker = base.last_release_marker.as_deref();

        let fetched_commits = self
            .remote
            .commits_since(commit_marker, self.bootstrap_commits)
            .await
            .map_err(self.fail(stage))?;
        let mut commits = dedup_by_key(fetched_commits, commit_marker, |c| &c.hash);
        self.progress.report(SyncProgressEvent::Fetched {
            project: id.to_string(),
            kind: "commits",
            count: commits.len() as u64,
        });

        let fetched_releases = self
            .remote
            .releases_since(release_marker, self.bootstrap_releases)
            .await
            .map_err(self.fail(stage))?;
        let mut releases = dedup_by_key(fetched_releases, release_marker, |r| &r.tag);
        self.progress.report(SyncProgressEvent::Fetched {
            project: id.to_string(),
            kind: "releases",
            count: releases.len() as u64,
        });

        for commit in &mut commits {
            commit.categories = classify(&commit.message);
        }

        if !releases.is_empty() {
            self.phase(SyncPhase::Enriching);
            self.enrich(&mut releases)
                .await
                .map_err(self.fail(SyncStage::Changelog))?;
        }

        if let (SyncMode::Incremental, Some(state)) = (mode, previous) {
            if commits.is_empty() && releases.is_empty() {
                info!(project = id, "no new commits or releases");
                return Ok(SyncResult {
                    mode,
                    commits,
                    releases,
                    state,
                });
            }
        }

        let next = next_state(&base, &commits, &releases, Utc::now());

        self.phase(SyncPhase::Persisting);
        self.store
            .save(&next)
            .map_err(self.fail(SyncStage::Persistence))?;

        info!(
            project = id,
            commits = commits.len(),
            releases = releases.len(),
            commit_marker = next.last_commit_marker.as_deref().unwrap_or(""),
            release_marker = next.last_release_marker.as_deref().unwrap_or(""),
            "sync complete"
        );

        Ok(SyncResult {
            mode,
            commits,
            releases,
            state: next,
        })
    }

    /// Attach matching changelog sections. A missing changelog, or one the
    /// API will not serve, only skips enrichment; quota and credential
    /// failures still abort the sync.
    async fn enrich(&self, releases: &mut [ReleaseRecord]) -> Result<(), TrackerError> {
        let Some(path) = self.changelog_path.as_deref() else {
            return Ok(());
        };

        let content = match self.remote.read_file(path).await {
            Ok(Some(content)) => content,
            Ok(None) => {
                debug!(project = %self.project_id, path, "no changelog, skipping enrichment");
                return Ok(());
            }
            Err(e @ (TrackerError::Auth(_) | TrackerError::RateLimitExceeded { .. })) => {
                return Err(e)
            }
            Err(e) => {
                warn!(project = %self.project_id, path, "changelog unavailable, skipping enrichment: {}", e);
                return Ok(());
            }
        };

        let document = changelog::parse(&content);
        let mut matched = 0usize;
        for release in releases.iter_mut() {
            let entry = document.find_version(&release.tag).or_else(|| {
                release
                    .name
                    .as_deref()
                    .and_then(|name| document.find_version(name))
            });
            if let Some(entry) = entry {
                release.changelog = Some(entry.body.clone());
                matched += 1;
            }
        }
        debug!(
            project = %self.project_id,
            sections = document.len(),
            matched,
            "changelog enrichment"
        );
        Ok(())
    }
}

/// Run `rtrack sync <target>`, where `target` is a project id or `all`.
///
/// With `all`, projects run one after another. Quota, network, and API
/// failures are reported and the run moves on; credential or state
/// corruption failures stop it. Any failure makes the command fail.
pub async fn run_sync(config: &Config, target: &str, json: bool, progress: ProgressMode) -> Result<()> {
    let ids: Vec<String> = if target == "all" {
        if config.projects.is_empty() {
            bail!("No projects configured");
        }
        config.projects.keys().cloned().collect()
    } else {
        config.project(target)?;
        vec![target.to_string()]
    };

    let store = StateStore::new(config.state.dir.clone());
    let reporter = progress.reporter();
    let mut failed = 0usize;

    for id in &ids {
        let project = config.project(id)?;
        let client = GitHubClient::new(&project.repo, &config.github, config.retry.policy())?;

        let outcome = IncrementalSync::from_config(config, id, project, &store, &client)
            .progress(reporter.as_ref())
            .run()
            .await;

        match outcome {
            Ok(result) => {
                if json {
                    print_json(id, &result)?;
                } else {
                    print_human(id, &result);
                }
            }
            Err(e) if e.is_fatal() || ids.len() == 1 => return Err(e.into()),
            Err(e) => {
                error!(project = %id, stage = %e.stage, "{}", e);
                eprintln!("sync {} failed: {}", id, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} project(s) failed to sync", failed, ids.len());
    }
    Ok(())
}

fn mode_label(mode: SyncMode) -> &'static str {
    match mode {
        SyncMode::Bootstrap => "bootstrap",
        SyncMode::Incremental => "incremental",
    }
}

fn print_human(id: &str, result: &SyncResult) {
    let report = ChangeReport::from_commits(&result.commits);
    println!("sync {} ({})", id, mode_label(result.mode));
    println!("  new commits: {}", result.commits.len());
    for (label, count) in report.counts() {
        println!("    {}: {}", label, count);
    }
    println!("  new releases: {}", result.releases.len());
    for release in &result.releases {
        let enriched = if release.changelog.is_some() {
            " (changelog)"
        } else {
            ""
        };
        println!("    {}{}", release.tag, enriched);
    }
    println!(
        "  commit marker: {}",
        result.state.last_commit_marker.as_deref().unwrap_or("-")
    );
    println!(
        "  release marker: {}",
        result.state.last_release_marker.as_deref().unwrap_or("-")
    );
    println!("ok");
}

fn print_json(id: &str, result: &SyncResult) -> Result<()> {
    let report = ChangeReport::from_commits(&result.commits);
    let obj = serde_json::json!({
        "project": id,
        "mode": result.mode,
        "commits": result.commits,
        "releases": result.releases,
        "report": report,
        "state": result.state,
    });
    println!("{}", serde_json::to_string(&obj)?);
    Ok(())
}

/// Keep the first occurrence of each identifier and drop the marker itself.
pub fn dedup_by_key<T, F>(items: Vec<T>, marker: Option<&str>, key: F) -> Vec<T>
where
    F: Fn(&T) -> &String,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        let id = key(&item);
        if marker == Some(id.as_str()) {
            continue;
        }
        if seen.insert(id.clone()) {
            kept.push(item);
        }
    }
    kept
}

/// Item to store as the marker for an oldest-first batch.
///
/// The remote bounds the next fetch by list position, so the marker is the
/// last listed item. When that item is not also the latest by timestamp the
/// disagreement is logged and position wins.
fn marker_of<'a, T, F>(items: &'a [T], timestamp: F, id: impl Fn(&T) -> &str) -> Option<&'a T>
where
    F: Fn(&T) -> Option<DateTime<Utc>>,
{
    let last = items.last()?;
    if let Some(newest) = items.iter().max_by_key(|item| timestamp(item)) {
        if timestamp(newest) > timestamp(last) {
            warn!(
                newest = id(newest),
                marker = id(last),
                "latest item is not last in list order, keeping list position as the marker"
            );
        }
    }
    Some(last)
}

fn batch_max<T, F>(items: &[T], timestamp: F) -> Option<DateTime<Utc>>
where
    F: Fn(&T) -> Option<DateTime<Utc>>,
{
    items.iter().filter_map(timestamp).max()
}

fn later(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// State after processing `commits` and `releases` on top of `previous`.
pub fn next_state(
    previous: &TrackerState,
    commits: &[CommitRecord],
    releases: &[ReleaseRecord],
    now: DateTime<Utc>,
) -> TrackerState {
    let mut next = previous.clone();

    if let Some(marker) = marker_of(commits, |c| Some(c.timestamp), |c| c.hash.as_str()) {
        next.last_commit_marker = Some(marker.hash.clone());
        next.last_commit_timestamp = later(
            previous.last_commit_timestamp,
            batch_max(commits, |c| Some(c.timestamp)),
        );
    }
    if let Some(marker) = marker_of(releases, |r| r.published_at, |r| r.tag.as_str()) {
        next.last_release_marker = Some(marker.tag.clone());
        next.last_release_timestamp = later(
            previous.last_release_timestamp,
            batch_max(releases, |r| r.published_at),
        );
    }

    next.total_commits_processed += commits.len() as u64;
    next.total_releases_processed += releases.len() as u64;
    next.last_sync_timestamp = now.max(previous.last_sync_timestamp);
    next
}
