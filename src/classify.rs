//! Keyword-based commit classification.
//!
//! A commit message is lowercased and checked for each category's keyword
//! stems as plain substrings. Every matching category is reported; a
//! message that matches nothing yields the empty set.

use std::collections::BTreeSet;

use crate::models::Category;

/// Keyword stems per category, matched case-insensitively as substrings.
pub const KEYWORDS: [(Category, &[&str]); 5] = [
    (
        Category::Feature,
        &["feat", "feature", "add", "implement", "new"],
    ),
    (
        Category::BugFix,
        &["fix", "bug", "issue", "resolve", "patch"],
    ),
    (
        Category::BreakingChange,
        &["breaking", "break", "major", "remove"],
    ),
    (
        Category::Documentation,
        &["docs", "doc", "documentation", "readme"],
    ),
    (
        Category::Deprecation,
        &["deprecate", "deprecated", "obsolete"],
    ),
];

/// Classify a commit message into zero or more categories.
pub fn classify(message: &str) -> BTreeSet<Category> {
    let lowered = message.to_lowercase();
    KEYWORDS
        .iter()
        .filter(|(_, stems)| stems.iter().any(|stem| lowered.contains(stem)))
        .map(|(category, _)| *category)
        .collect()
}
