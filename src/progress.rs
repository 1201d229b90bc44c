//! Sync progress reporting.
//!
//! Reports what a running `rtrack sync` is doing so users can tell a slow
//! fetch from a hang. Progress is emitted on **stderr** so stdout remains
//! parseable for scripts and for `--json` output.

use std::io::Write;

/// Phase of a sync.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyncPhase {
    /// Reading the persisted state.
    LoadingState,
    /// No state on disk: fetching a bounded window of recent history.
    Bootstrapping,
    /// Fetching only what is newer than the stored markers.
    IncrementalFetch,
    /// Matching new releases against the changelog.
    Enriching,
    /// Writing the new state.
    Persisting,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::LoadingState => "loading-state",
            SyncPhase::Bootstrapping => "bootstrapping",
            SyncPhase::IncrementalFetch => "incremental-fetch",
            SyncPhase::Enriching => "enriching",
            SyncPhase::Persisting => "persisting",
        }
    }
}

/// A single progress event for sync.
#[derive(Clone, Debug)]
pub enum SyncProgressEvent {
    /// Entered a phase.
    Phase { project: String, phase: SyncPhase },
    /// A fetch finished with `count` new items of `kind` (`commits` / `releases`).
    Fetched {
        project: String,
        kind: &'static str,
        count: u64,
    },
}

/// Reports sync progress. Implementations write to stderr (human or JSON).
pub trait SyncProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the sync pipeline.
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "sync browseros  fetched  1,234 commits".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Phase { project, phase } => {
                format!("sync {}  {}...\n", project, phase.as_str())
            }
            SyncProgressEvent::Fetched {
                project,
                kind,
                count,
            } => format!("sync {}  fetched  {} {}\n", project, format_number(*count), kind),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let obj = match &event {
            SyncProgressEvent::Phase { project, phase } => serde_json::json!({
                "event": "progress",
                "project": project,
                "phase": phase.as_str()
            }),
            SyncProgressEvent::Fetched {
                project,
                kind,
                count,
            } => serde_json::json!({
                "event": "fetched",
                "project": project,
                "kind": kind,
                "count": count
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse a `--progress` value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
