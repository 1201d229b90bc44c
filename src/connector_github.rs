//! GitHub implementation of [`RemoteHistory`].
//!
//! Talks to the GitHub REST API (`/repos/{owner}/{repo}/commits`,
//! `/releases`, `/contents/{path}`) with an optional bearer token.
//!
//! # Markers and pagination
//!
//! GitHub lists commits and releases newest first. On bootstrap the client
//! reads pages until it holds `limit` items. With a marker it reads pages
//! until it meets the marker (which is excluded). Either way it stops when
//! the listing ends or `max_pages` pages have been read. Results are returned oldest first.
//! Records repeated across pages (the listing can shift while paging) are
//! kept once.
//!
//! # Failures
//!
//! | Response | Outcome |
//! |----------|---------|
//! | network error, timeout, 408, 5xx | retried, then [`TrackerError::TransientFetch`] |
//! | 429, or 403 with `Retry-After` / secondary limit | retried, then `TransientFetch` |
//! | 403/429 with `X-RateLimit-Remaining: 0` | [`TrackerError::RateLimitExceeded`], not retried |
//! | 401 | [`TrackerError::Auth`] |
//! | 409 on a listing (empty repository) | empty result |
//! | 404 on `read_file` | `Ok(None)` |
//! | other 4xx | [`TrackerError::Api`] |

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, ACCEPT, RETRY_AFTER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::GitHubConfig;
use crate::error::TrackerError;
use crate::models::{CommitRecord, ReleaseAsset, ReleaseRecord};
use crate::retry::{retry_with_backoff, RetryAction, RetryPolicy};
use crate::traits::RemoteHistory;

const JSON_ACCEPT: &str = "application/vnd.github+json";
const RAW_ACCEPT: &str = "application/vnd.github.raw+json";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("repo-tracker/", env!("CARGO_PKG_VERSION"));

// ═══════════════════════════════════════════════════════════════════════
// API payloads
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct GitHubCommit {
    sha: String,
    html_url: Option<String>,
    commit: GitCommitDetail,
    author: Option<GitHubUser>,
}

#[derive(Debug, Deserialize)]
struct GitCommitDetail {
    message: String,
    author: Option<GitSignature>,
    committer: Option<GitSignature>,
}

#[derive(Debug, Deserialize)]
struct GitSignature {
    name: Option<String>,
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: String,
    name: Option<String>,
    body: Option<String>,
    html_url: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
    published_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
    author: Option<GitHubUser>,
    #[serde(default)]
    assets: Vec<GitHubAsset>,
}

#[derive(Debug, Deserialize)]
struct GitHubAsset {
    name: String,
    browser_download_url: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct GitHubErrorBody {
    message: String,
}

/// A listed item with a stable identifier.
trait Listed {
    fn key(&self) -> &str;

    fn is_listed(&self) -> bool {
        true
    }
}

impl Listed for GitHubCommit {
    fn key(&self) -> &str {
        &self.sha
    }
}

impl Listed for GitHubRelease {
    fn key(&self) -> &str {
        &self.tag_name
    }

    fn is_listed(&self) -> bool {
        !self.draft
    }
}

impl GitHubCommit {
    fn into_record(self) -> Option<CommitRecord> {
        let detail = self.commit;
        // Committer dates follow the branch order; author dates survive rebases.
        let timestamp = detail
            .committer
            .as_ref()
            .and_then(|c| c.date)
            .or_else(|| detail.author.as_ref().and_then(|a| a.date))?;
        let author = detail
            .author
            .and_then(|a| a.name)
            .or(self.author.map(|u| u.login))
            .unwrap_or_else(|| "unknown".to_string());

        Some(CommitRecord {
            hash: self.sha,
            message: detail.message,
            author,
            timestamp,
            url: self.html_url,
            categories: Default::default(),
        })
    }
}

impl From<GitHubRelease> for ReleaseRecord {
    fn from(release: GitHubRelease) -> Self {
        ReleaseRecord {
            tag: release.tag_name,
            name: release.name.filter(|n| !n.is_empty()),
            published_at: release.published_at.or(release.created_at),
            author: release.author.map(|u| u.login),
            body: release.body.unwrap_or_default(),
            url: release.html_url,
            prerelease: release.prerelease,
            assets: release
                .assets
                .into_iter()
                .map(|a| ReleaseAsset {
                    name: a.name,
                    url: a.browser_download_url,
                    size: a.size,
                })
                .collect(),
            changelog: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Request errors
// ═══════════════════════════════════════════════════════════════════════

/// Outcome of one HTTP attempt that did not produce a usable response.
#[derive(Debug)]
enum RequestError {
    Retryable(String),
    Fatal(TrackerError),
}

impl RequestError {
    fn action(&self) -> RetryAction {
        match self {
            RequestError::Retryable(_) => RetryAction::Retry,
            RequestError::Fatal(_) => RetryAction::Abort,
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Retryable(message) => f.write_str(message),
            RequestError::Fatal(e) => write!(f, "{}", e),
        }
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// Percent-encode each `/`-separated segment of a repository path.
fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn api_message(body: &str) -> String {
    serde_json::from_str::<GitHubErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.chars().take(300).collect())
}

/// Map a non-success status to retry-or-surface.
fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str) -> RequestError {
    let message = api_message(body);
    let code = status.as_u16();

    match code {
        401 => RequestError::Fatal(TrackerError::Auth(message)),
        403 | 429 => {
            let remaining = header_value(headers, "x-ratelimit-remaining")
                .and_then(|v| v.parse::<u64>().ok());
            if remaining == Some(0) {
                let reset_at = header_value(headers, "x-ratelimit-reset")
                    .and_then(|v| v.parse::<i64>().ok())
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
                return RequestError::Fatal(TrackerError::RateLimitExceeded { reset_at });
            }
            if code == 429
                || headers.contains_key(RETRY_AFTER)
                || message.to_lowercase().contains("rate limit")
            {
                return RequestError::Retryable(format!("HTTP {}: {}", code, message));
            }
            RequestError::Fatal(TrackerError::Api {
                status: code,
                message,
            })
        }
        408 | 500..=599 => RequestError::Retryable(format!("HTTP {}: {}", code, message)),
        _ => RequestError::Fatal(TrackerError::Api {
            status: code,
            message,
        }),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Client
// ═══════════════════════════════════════════════════════════════════════

/// GitHub REST client for one repository.
pub struct GitHubClient {
    repo: String,
    api_url: String,
    token: Option<String>,
    per_page: usize,
    max_pages: usize,
    retry: RetryPolicy,
    http: reqwest::Client,
}

impl GitHubClient {
    /// Build a client for `repo` (`owner/name`).
    ///
    /// The bearer token is read from the environment variable named in
    /// `github.token_env`; without one requests run unauthenticated at the
    /// lower public quota.
    pub fn new(repo: &str, github: &GitHubConfig, retry: RetryPolicy) -> Result<Self, TrackerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(github.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TrackerError::Config(format!("failed to build HTTP client: {}", e)))?;

        let token = github.token();
        if token.is_none() {
            info!(
                "{} not set - using unauthenticated GitHub API (lower rate limit)",
                github.token_env
            );
        }

        Ok(Self {
            repo: repo.trim().to_string(),
            api_url: github.api_url.trim_end_matches('/').to_string(),
            token,
            per_page: github.per_page.clamp(1, 100),
            max_pages: github.max_pages.max(1),
            retry,
            http,
        })
    }

    /// Replace the token picked up from the environment.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn repo_url(&self, rest: &str) -> String {
        format!("{}/repos/{}/{}", self.api_url, self.repo, rest)
    }

    fn contents_url(&self, path: &str) -> String {
        self.repo_url(&format!("contents/{}", encode_path(path)))
    }

    async fn send_once(&self, url: &str, accept: &str) -> Result<(StatusCode, String), RequestError> {
        let mut request = self
            .http
            .get(url)
            .header(ACCEPT, accept)
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RequestError::Retryable(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| RequestError::Retryable(format!("reading {} failed: {}", url, e)))?;

        if status.is_success() || status == StatusCode::NOT_FOUND || status == StatusCode::CONFLICT
        {
            return Ok((status, body));
        }

        Err(classify_status(status, &headers, &body))
    }

    /// GET with the bounded retry policy applied.
    async fn get(&self, url: &str, accept: &str) -> Result<(StatusCode, String), TrackerError> {
        debug!(url, "GET");
        retry_with_backoff(&self.retry, RequestError::action, || {
            self.send_once(url, accept)
        })
        .await
        .map_err(|failure| match failure.error {
            RequestError::Retryable(message) => TrackerError::TransientFetch {
                attempts: failure.attempts,
                message,
            },
            RequestError::Fatal(e) => e,
        })
    }

    /// Walk a newest-first listing. Returns items newest first, without
    /// the marker and without repeats.
    async fn scan_listing<R>(
        &self,
        endpoint: &str,
        marker: Option<&str>,
        limit: usize,
    ) -> Result<Vec<R>, TrackerError>
    where
        R: DeserializeOwned + Listed,
    {
        if marker.is_none() && limit == 0 {
            return Ok(Vec::new());
        }

        let per_page = match marker {
            Some(_) => self.per_page,
            None => self.per_page.min(limit),
        };

        let mut items: Vec<R> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut page = 1usize;

        loop {
            let url = self.repo_url(&format!("{}?per_page={}&page={}", endpoint, per_page, page));
            let (status, body) = self.get(&url, JSON_ACCEPT).await?;

            if status == StatusCode::CONFLICT {
                debug!(repo = %self.repo, endpoint, "repository is empty");
                return Ok(Vec::new());
            }
            if status == StatusCode::NOT_FOUND {
                return Err(TrackerError::Api {
                    status: status.as_u16(),
                    message: format!("{} not found: {}", self.repo, api_message(&body)),
                });
            }

            let batch: Vec<R> = serde_json::from_str(&body).map_err(|e| TrackerError::Api {
                status: status.as_u16(),
                message: format!("unexpected {} response: {}", endpoint, e),
            })?;
            let batch_len = batch.len();
            let mut reached_marker = false;

            for item in batch {
                if marker == Some(item.key()) {
                    reached_marker = true;
                    break;
                }
                if !item.is_listed() || !seen.insert(item.key().to_string()) {
                    continue;
                }
                items.push(item);
                if marker.is_none() && items.len() >= limit {
                    return Ok(items);
                }
            }

            if reached_marker || batch_len < per_page {
                break;
            }
            if page >= self.max_pages {
                if marker.is_some() {
                    warn!(
                        repo = %self.repo,
                        endpoint,
                        "marker not found within {} page(s); treating the window as new",
                        self.max_pages
                    );
                }
                break;
            }
            page += 1;
        }

        Ok(items)
    }
}

#[async_trait]
impl RemoteHistory for GitHubClient {
    fn name(&self) -> &str {
        &self.repo
    }

    async fn commits_since(
        &self,
        marker: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CommitRecord>, TrackerError> {
        let listed: Vec<GitHubCommit> = self.scan_listing("commits", marker, limit).await?;
        let mut commits: Vec<CommitRecord> = listed
            .into_iter()
            .filter_map(|c| {
                let sha = c.sha.clone();
                let record = c.into_record();
                if record.is_none() {
                    warn!(sha = %sha, "skipping commit without a date");
                }
                record
            })
            .collect();
        commits.reverse();
        Ok(commits)
    }

    async fn releases_since(
        &self,
        marker: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ReleaseRecord>, TrackerError> {
        let listed: Vec<GitHubRelease> = self.scan_listing("releases", marker, limit).await?;
        let mut releases: Vec<ReleaseRecord> = listed.into_iter().map(Into::into).collect();
        releases.reverse();
        Ok(releases)
    }

    async fn read_file(&self, path: &str) -> Result<Option<String>, TrackerError> {
        let url = self.contents_url(path);
        let (status, body) = self.get(&url, RAW_ACCEPT).await?;
        if status == StatusCode::NOT_FOUND {
            debug!(repo = %self.repo, path, "file not found");
            return Ok(None);
        }
        if status == StatusCode::CONFLICT {
            return Ok(None);
        }
        Ok(Some(body))
    }
}
