//! Human- and machine-readable views of a sync.
//!
//! [`ChangeReport`] groups a batch of classified commits by category for the
//! synthesis stage; [`summary`] renders a stored [`TrackerState`] for
//! `rtrack status`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Category, CommitRecord, TrackerState};

/// One commit as it appears in a report bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub message: String,
    pub sha: String,
    pub date: DateTime<Utc>,
}

impl From<&CommitRecord> for ReportEntry {
    fn from(commit: &CommitRecord) -> Self {
        Self {
            message: commit.summary().to_string(),
            sha: commit.short_hash().to_string(),
            date: commit.timestamp,
        }
    }
}

/// Commits of one batch grouped by category.
///
/// A commit with several categories is listed in each of them; one with
/// none lands in `other`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeReport {
    pub features: Vec<ReportEntry>,
    pub bug_fixes: Vec<ReportEntry>,
    pub breaking_changes: Vec<ReportEntry>,
    pub documentation: Vec<ReportEntry>,
    pub deprecations: Vec<ReportEntry>,
    pub other: Vec<ReportEntry>,
}

impl ChangeReport {
    pub fn from_commits(commits: &[CommitRecord]) -> Self {
        let mut report = ChangeReport::default();
        for commit in commits {
            if commit.categories.is_empty() {
                report.other.push(ReportEntry::from(commit));
                continue;
            }
            for category in &commit.categories {
                report.bucket_mut(*category).push(ReportEntry::from(commit));
            }
        }
        report
    }

    fn bucket_mut(&mut self, category: Category) -> &mut Vec<ReportEntry> {
        match category {
            Category::Feature => &mut self.features,
            Category::BugFix => &mut self.bug_fixes,
            Category::BreakingChange => &mut self.breaking_changes,
            Category::Documentation => &mut self.documentation,
            Category::Deprecation => &mut self.deprecations,
        }
    }

    pub fn bucket(&self, category: Category) -> &[ReportEntry] {
        match category {
            Category::Feature => &self.features,
            Category::BugFix => &self.bug_fixes,
            Category::BreakingChange => &self.breaking_changes,
            Category::Documentation => &self.documentation,
            Category::Deprecation => &self.deprecations,
        }
    }

    /// Non-empty buckets as `(label, count)`, in display order.
    pub fn counts(&self) -> Vec<(&'static str, usize)> {
        let mut counts: Vec<(&'static str, usize)> = Category::ALL
            .iter()
            .map(|c| (c.as_str(), self.bucket(*c).len()))
            .collect();
        counts.push(("other", self.other.len()));
        counts.retain(|(_, n)| *n > 0);
        counts
    }

    pub fn is_empty(&self) -> bool {
        self.counts().is_empty()
    }
}

fn or_placeholder<T: ToString>(value: Option<T>, placeholder: &str) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| placeholder.to_string())
}

/// Plain-text summary of a stored state.
pub fn summary(state: &TrackerState) -> String {
    format!(
        "Project: {}\n\
         Last commit: {} ({})\n\
         Last release: {} ({})\n\
         Commits processed: {}\n\
         Releases processed: {}\n\
         Last sync: {}\n",
        state.project_id,
        or_placeholder(state.last_commit_marker.as_deref(), "none"),
        or_placeholder(state.last_commit_timestamp.map(|t| t.to_rfc3339()), "n/a"),
        or_placeholder(state.last_release_marker.as_deref(), "none"),
        or_placeholder(state.last_release_timestamp.map(|t| t.to_rfc3339()), "n/a"),
        state.total_commits_processed,
        state.total_releases_processed,
        state.last_sync_timestamp.to_rfc3339(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use chrono::TimeZone;

    fn commit(hash: &str, message: &str) -> CommitRecord {
        CommitRecord {
            hash: hash.to_string(),
            message: message.to_string(),
            author: "dev".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap(),
            url: None,
            categories: classify(message),
        }
    }

    #[test]
    fn groups_by_category_with_other_bucket() {
        let commits = vec![
            commit("aaaaaaaaaa", "feat: add export\n\ndetails"),
            commit("bbbbbbbbbb", "Bump version to 1.2"),
        ];
        let report = ChangeReport::from_commits(&commits);
        assert_eq!(report.features.len(), 1);
        assert_eq!(report.features[0].message, "feat: add export");
        assert_eq!(report.features[0].sha, "aaaaaaa");
        assert_eq!(report.other.len(), 1);
        assert_eq!(report.other[0].sha, "bbbbbbb");
    }

    #[test]
    fn multi_label_commit_in_every_bucket() {
        let commits = vec![commit("c0ffee0000", "fix: remove deprecated flag")];
        let report = ChangeReport::from_commits(&commits);
        assert_eq!(report.bug_fixes.len(), 1);
        assert_eq!(report.breaking_changes.len(), 1);
        assert_eq!(report.deprecations.len(), 1);
        assert!(report.other.is_empty());
        let labels: Vec<&str> = report.counts().iter().map(|(l, _)| *l).collect();
        assert_eq!(labels, vec!["bug-fix", "breaking-change", "deprecation"]);
    }

    #[test]
    fn empty_batch_is_empty_report() {
        assert!(ChangeReport::from_commits(&[]).is_empty());
    }

    #[test]
    fn summary_of_fresh_state() {
        let state = TrackerState::new("demo");
        let text = summary(&state);
        assert!(text.contains("Project: demo"));
        assert!(text.contains("Last commit: none (n/a)"));
        assert!(text.contains("Commits processed: 0"));
    }

    #[test]
    fn summary_shows_markers() {
        let mut state = TrackerState::new("demo");
        state.last_release_marker = Some("v2.5.0".to_string());
        state.last_release_timestamp = Some(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap());
        state.total_releases_processed = 15;
        let text = summary(&state);
        assert!(text.contains("Last release: v2.5.0 (2026-02-01T00:00:00+00:00)"));
        assert!(text.contains("Releases processed: 15"));
    }
}
