//! `rtrack projects`, `rtrack status`, and `rtrack reset`.

use anyhow::Result;

use crate::config::Config;
use crate::report;
use crate::state::StateStore;

/// List configured projects with whether each has been synced yet.
pub fn list_projects(config: &Config) -> Result<()> {
    let store = StateStore::new(config.state.dir.clone());

    println!("{:<20} {:<32} {:<8} STATE FILE", "PROJECT", "REPO", "SYNCED");
    for (id, project) in &config.projects {
        let synced = match store.load(id) {
            Ok(Some(_)) => "yes",
            Ok(None) => "no",
            Err(_) => "corrupt",
        };
        println!(
            "{:<20} {:<32} {:<8} {}",
            id,
            project.repo,
            synced,
            store.state_path(id).display()
        );
    }
    Ok(())
}

/// Print the stored state of one project.
pub fn show_status(config: &Config, id: &str, json: bool) -> Result<()> {
    let project = config.project(id)?;
    let store = StateStore::new(config.state.dir.clone());

    match store.load(id)? {
        Some(state) if json => println!("{}", serde_json::to_string_pretty(&state)?),
        Some(state) => {
            println!("Repo: {}", project.repo);
            print!("{}", report::summary(&state));
        }
        None if json => println!("null"),
        None => println!("{} has not been synced yet", id),
    }
    Ok(())
}

/// Forget a project's state so its next sync bootstraps.
pub fn reset_project(config: &Config, id: &str) -> Result<()> {
    config.project(id)?;
    let store = StateStore::new(config.state.dir.clone());

    if store.remove(id)? {
        println!("reset {}: state removed", id);
    } else {
        println!("reset {}: no state to remove", id);
    }
    Ok(())
}
