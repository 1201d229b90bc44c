//! # Repo Tracker CLI (`rtrack`)
//!
//! The `rtrack` binary syncs configured upstream projects and inspects their
//! stored state.
//!
//! ## Usage
//!
//! ```bash
//! rtrack --config ./config/tracker.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rtrack projects` | List configured projects and whether they have state |
//! | `rtrack sync <project\|all>` | Bootstrap or incrementally sync |
//! | `rtrack status <project>` | Show stored markers and counters |
//! | `rtrack reset <project>` | Delete stored state; next sync bootstraps |
//!
//! Logs go to stderr and are controlled by `RUST_LOG` (default `warn`).

use anyhow::bail;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use repo_tracker::progress::ProgressMode;
use repo_tracker::{config, ingest, projects};

/// Repo Tracker CLI: remembers which upstream commits and releases were
/// processed and fetches only what is new.
#[derive(Parser)]
#[command(
    name = "rtrack",
    about = "Incremental upstream repository tracker",
    version,
    long_about = "Repo Tracker keeps per-project markers for the newest processed commit and \
    release, fetches only newer history from GitHub, classifies commits, and attaches \
    changelog sections to new releases."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/tracker.toml`.
    #[arg(long, global = true, default_value = "./config/tracker.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// List configured projects.
    Projects,

    /// Sync one project, or `all`.
    ///
    /// A project with no stored state is bootstrapped from a bounded window
    /// of recent history; otherwise only items newer than the stored markers
    /// are fetched.
    Sync {
        /// Project id from `[projects.<id>]`, or `all`.
        project: String,

        /// Print one JSON object per project on stdout.
        #[arg(long)]
        json: bool,

        /// Progress on stderr: `off`, `human`, or `json`.
        /// Defaults to `human` when stderr is a terminal.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Show the stored state of a project.
    Status {
        project: String,

        /// Print the raw state as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete a project's stored state.
    Reset { project: String },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Projects => {
            projects::list_projects(&cfg)?;
        }
        Commands::Sync {
            project,
            json,
            progress,
        } => {
            let mode = match progress.as_deref() {
                None => ProgressMode::default_for_tty(),
                Some(value) => match ProgressMode::parse(value) {
                    Some(mode) => mode,
                    None => bail!("Invalid --progress '{}': use off, human, or json", value),
                },
            };
            ingest::run_sync(&cfg, &project, json, mode).await?;
        }
        Commands::Status { project, json } => {
            projects::show_status(&cfg, &project, json)?;
        }
        Commands::Reset { project } => {
            projects::reset_project(&cfg, &project)?;
        }
    }

    Ok(())
}
