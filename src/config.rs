use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./data/state")
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
            per_page: default_per_page(),
            max_pages: default_max_pages(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_per_page() -> usize {
    100
}
fn default_max_pages() -> usize {
    10
}

impl GitHubConfig {
    /// Bearer token from the configured environment variable, if set.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_secs() -> u64 {
    1
}
fn default_max_delay_secs() -> u64 {
    30
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay_secs: self.base_delay_secs,
            max_delay_secs: self.max_delay_secs,
        }
    }
}

/// Window fetched on a project's first sync.
#[derive(Debug, Deserialize, Clone)]
pub struct BootstrapConfig {
    #[serde(default = "default_bootstrap_commits")]
    pub commits: usize,
    #[serde(default = "default_bootstrap_releases")]
    pub releases: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            commits: default_bootstrap_commits(),
            releases: default_bootstrap_releases(),
        }
    }
}

fn default_bootstrap_commits() -> usize {
    100
}
fn default_bootstrap_releases() -> usize {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProjectConfig {
    /// `owner/name` on the hosting service.
    pub repo: String,
    #[serde(default = "default_changelog_path")]
    pub changelog_path: String,
}

fn default_changelog_path() -> String {
    "CHANGELOG.md".to_string()
}

impl ProjectConfig {
    /// Changelog path, or `None` when enrichment is switched off.
    pub fn changelog(&self) -> Option<&str> {
        let path = self.changelog_path.trim();
        if path.is_empty() {
            None
        } else {
            Some(path)
        }
    }

    /// Split `repo` into owner and name.
    pub fn owner_and_name(&self) -> Option<(&str, &str)> {
        let (owner, name) = self.repo.trim().split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some((owner, name))
    }
}

impl Config {
    pub fn project(&self, id: &str) -> Result<&ProjectConfig> {
        match self.projects.get(id) {
            Some(p) => Ok(p),
            None => {
                let known: Vec<&str> = self.projects.keys().map(String::as_str).collect();
                bail!(
                    "Unknown project: '{}'. Configured: {}",
                    id,
                    if known.is_empty() {
                        "(none)".to_string()
                    } else {
                        known.join(", ")
                    }
                )
            }
        }
    }
}

fn valid_project_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

fn validate(config: &Config) -> Result<()> {
    // Validate github
    if !(1..=100).contains(&config.github.per_page) {
        bail!("github.per_page must be in [1, 100]");
    }
    if config.github.max_pages == 0 {
        bail!("github.max_pages must be >= 1");
    }
    if config.github.timeout_secs == 0 {
        bail!("github.timeout_secs must be > 0");
    }

    // Validate retry
    if config.retry.max_attempts == 0 {
        bail!("retry.max_attempts must be >= 1");
    }
    if config.retry.base_delay_secs > config.retry.max_delay_secs {
        bail!("retry.base_delay_secs must not exceed retry.max_delay_secs");
    }

    // Validate bootstrap
    if config.bootstrap.commits == 0 || config.bootstrap.releases == 0 {
        bail!("bootstrap.commits and bootstrap.releases must be >= 1");
    }

    // Validate projects
    for (id, project) in &config.projects {
        if !valid_project_id(id) {
            bail!(
                "Invalid project id '{}': use letters, digits, '-', '_' or '.'",
                id
            );
        }
        if project.owner_and_name().is_none() {
            bail!(
                "projects.{}.repo must look like 'owner/name', got '{}'",
                id,
                project.repo
            );
        }
    }

    Ok(())
}
