//! Durable tracker state, one JSON file per project.
//!
//! `save` writes the whole record to a sibling temp file, flushes it to
//! disk, then renames it over the live file. A reader therefore sees the
//! previous complete state or the new complete state, never a mix. A
//! leftover temp file from an interrupted save is ignored by `load` and
//! overwritten by the next `save`.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::TrackerError;
use crate::models::TrackerState;

const STATE_EXT: &str = "json";
const TEMP_EXT: &str = "json.tmp";

/// File-backed store holding one [`TrackerState`] per project id.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the live state file for `project_id`.
    pub fn state_path(&self, project_id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", project_id, STATE_EXT))
    }

    fn temp_path(&self, project_id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", project_id, TEMP_EXT))
    }

    /// Load the state for `project_id`.
    ///
    /// Returns `Ok(None)` when no state file exists (never synced).
    ///
    /// # Errors
    ///
    /// [`TrackerError::StateCorrupt`] if the file exists but does not parse,
    /// or parses to a different project id. [`TrackerError::Io`] for any
    /// other read failure.
    pub fn load(&self, project_id: &str) -> Result<Option<TrackerState>, TrackerError> {
        let path = self.state_path(project_id);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(TrackerError::StateCorrupt {
                    path,
                    reason: e.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let state: TrackerState =
            serde_json::from_str(&content).map_err(|e| TrackerError::StateCorrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        if state.project_id != project_id {
            return Err(TrackerError::StateCorrupt {
                path,
                reason: format!(
                    "file belongs to project '{}', expected '{}'",
                    state.project_id, project_id
                ),
            });
        }

        debug!(project = project_id, path = %path.display(), "loaded tracker state");
        Ok(Some(state))
    }

    /// Replace the stored state for `state.project_id` atomically.
    pub fn save(&self, state: &TrackerState) -> Result<(), TrackerError> {
        fs::create_dir_all(&self.dir)?;

        let temp_path = self.temp_path(&state.project_id);
        self.write_temp(&temp_path, state)?;

        let path = self.state_path(&state.project_id);
        fs::rename(&temp_path, &path)?;
        sync_dir(&self.dir);

        debug!(project = %state.project_id, path = %path.display(), "saved tracker state");
        Ok(())
    }

    fn write_temp(&self, temp_path: &Path, state: &TrackerState) -> Result<(), TrackerError> {
        let file = File::create(temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, state).map_err(std::io::Error::from)?;
        writer.write_all(b"\n")?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }

    /// Delete the state for `project_id`. Returns whether a file was removed.
    pub fn remove(&self, project_id: &str) -> Result<bool, TrackerError> {
        let _ = fs::remove_file(self.temp_path(project_id));
        match fs::remove_file(self.state_path(project_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Flush the directory entry after a rename. Best effort: not every
/// platform lets a directory be opened for syncing.
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}
