//! Changelog parsing.
//!
//! Splits a "Keep a Changelog"-style document into sections keyed by their
//! version heading, preserving document order:
//!
//! ```text
//! ## [2.5.0] - 2026-02-01      ← heading "[2.5.0] - 2026-02-01", version "2.5.0"
//! ### Added
//! - New feature X             ← body
//! ## [2.4.1] - 2026-01-10
//! ...
//! ```
//!
//! A heading is a markdown heading line whose text starts with a version
//! number, optionally bracketed or `v`-prefixed, optionally followed by a
//! date. Headings such as `## [Unreleased]` are not version headings and
//! their text folds into the preceding section (or is dropped before the
//! first heading). Documents without any version heading parse to an empty
//! document.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

/// One version section of a changelog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogEntry {
    /// Heading text with the leading `#` markers removed.
    pub heading: String,
    /// Version with any leading `v` stripped (e.g. `2.5.0`).
    pub version: String,
    pub date: Option<NaiveDate>,
    /// Text between this heading and the next, trimmed.
    pub body: String,
}

/// Ordered heading → body mapping parsed from a changelog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangelogDocument {
    entries: Vec<ChangelogEntry>,
}

impl ChangelogDocument {
    /// Entries in document order (newest first by convention).
    pub fn entries(&self) -> &[ChangelogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Body for an exact heading text.
    pub fn get(&self, heading: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.heading == heading)
            .map(|e| e.body.as_str())
    }

    /// Entry whose version matches `version_or_tag` (a leading `v`/`V` is ignored).
    pub fn find_version(&self, version_or_tag: &str) -> Option<&ChangelogEntry> {
        let wanted = normalize_version(version_or_tag);
        if wanted.is_empty() {
            return None;
        }
        self.entries.iter().find(|e| e.version == wanted)
    }
}

fn heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^#{1,6}\s+\[?[vV]?(?P<version>\d+(?:\.\d+)+(?:[-+][0-9A-Za-z.\-+]*)?)\]?(?:\s*(?:-|–|—)?\s*\(?(?P<date>\d{4}-\d{2}-\d{2})\)?)?",
        )
        .expect("changelog heading pattern is valid")
    })
}

/// Strip surrounding whitespace and a leading `v`/`V` from a tag or version.
pub fn normalize_version(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed)
}

/// Parse a changelog document. Never fails.
pub fn parse(document: &str) -> ChangelogDocument {
    let re = heading_regex();
    let mut entries: Vec<ChangelogEntry> = Vec::new();
    let mut current: Option<(ChangelogEntry, Vec<&str>)> = None;

    for line in document.lines() {
        if let Some(caps) = re.captures(line) {
            if let Some((entry, body)) = current.take() {
                push_entry(&mut entries, entry, &body);
            }
            let heading = line.trim_start_matches('#').trim().to_string();
            let version = caps["version"].to_string();
            let date = caps
                .name("date")
                .and_then(|m| NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").ok());
            current = Some((
                ChangelogEntry {
                    heading,
                    version,
                    date,
                    body: String::new(),
                },
                Vec::new(),
            ));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }

    if let Some((entry, body)) = current.take() {
        push_entry(&mut entries, entry, &body);
    }

    ChangelogDocument { entries }
}

/// First occurrence of a heading wins; a repeated heading is ignored.
fn push_entry(entries: &mut Vec<ChangelogEntry>, mut entry: ChangelogEntry, body: &[&str]) {
    if entries.iter().any(|e| e.heading == entry.heading) {
        return;
    }
    entry.body = body.join("\n").trim().to_string();
    entries.push(entry);
}
