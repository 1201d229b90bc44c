//! # Repo Tracker
//!
//! Incremental tracking of upstream repository history.
//!
//! Repo Tracker remembers, per project, the newest commit and release it has
//! processed. Each sync fetches only what is newer than those markers,
//! classifies the new commits, attaches changelog sections to new releases,
//! and durably advances the markers. The first sync of a project fetches a
//! bounded window of recent history instead.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌──────────────┐
//! │  StateStore  │◀─▶│ IncrementalSync │──▶│RemoteHistory │
//! │ (JSON files) │   │ classify+enrich │   │   (GitHub)   │
//! └──────────────┘   └────────┬────────┘   └──────────────┘
//!                             ▼
//!                       SyncResult ──▶ ChangeReport
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rtrack projects               # list configured projects
//! rtrack sync browseros         # bootstrap or incremental sync
//! rtrack sync all --json        # every project, machine-readable
//! rtrack status browseros       # stored markers and counters
//! rtrack reset browseros        # forget state, next sync bootstraps
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`state`] | Durable per-project state |
//! | [`traits`] | Remote history seam |
//! | [`connector_github`] | GitHub REST client |
//! | [`retry`] | Bounded exponential backoff |
//! | [`classify`] | Keyword commit classification |
//! | [`changelog`] | Changelog section parsing |
//! | [`ingest`] | Sync orchestration |
//! | [`report`] | Grouped reports and summaries |
//! | [`projects`] | Project listing, status, and reset commands |
//! | [`progress`] | Sync progress on stderr |

pub mod changelog;
pub mod classify;
pub mod config;
pub mod connector_github;
pub mod error;
pub mod ingest;
pub mod models;
pub mod progress;
pub mod projects;
pub mod report;
pub mod retry;
pub mod state;
pub mod traits;
