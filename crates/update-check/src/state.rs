use crate::error::{Result, UpdateCheckError};
use crate::record::BuildRecord;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Snapshot written after every successful discovery run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    /// Wall-clock time of the run, unix seconds.
    pub checked_at: u64,
    /// Records found by that run, in manifest order.
    pub records: Vec<BuildRecord>,
}

/// JSON file holding the last [`PersistedState`].
///
/// Reads never fail: a missing or unreadable snapshot is an empty prior
/// state. Writes replace the whole file atomically. Concurrent writers are
/// the caller's problem.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store backed by the JSON file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records from the last successful run, or none.
    pub fn load(&self) -> Vec<BuildRecord> {
        self.load_snapshot()
            .map(|state| state.records)
            .unwrap_or_default()
    }

    /// Time of the last successful run, if one was recorded.
    pub fn last_checked(&self) -> Option<u64> {
        self.load_snapshot().map(|state| state.checked_at)
    }

    /// Full snapshot of the last successful run, or `None` when it is
    /// missing, unreadable or corrupt.
    pub fn load_snapshot(&self) -> Option<PersistedState> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "state snapshot unreadable, starting empty");
                return None;
            }
        };

        match serde_json::from_slice::<PersistedState>(&bytes) {
            Ok(state) => Some(state),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "state snapshot corrupt, starting empty");
                None
            }
        }
    }

    /// Replace the snapshot with `records`, stamped with the current time.
    pub fn save(&self, records: &[BuildRecord]) -> Result<PersistedState> {
        let state = PersistedState {
            checked_at: unix_now(),
            records: records.to_vec(),
        };
        self.save_snapshot(&state)?;
        Ok(state)
    }

    /// Atomically write `state`. On failure the previous file is untouched.
    pub fn save_snapshot(&self, state: &PersistedState) -> Result<()> {
        let payload = serde_json::to_vec_pretty(state)?;
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        write_atomic(parent, &self.path, |file| file.write_all(&payload))
            .map_err(UpdateCheckError::StateWrite)?;
        debug!(path = %self.path.display(), records = state.records.len(), "state saved");
        Ok(())
    }
}

/// Write a temp file in `parent` through `write_payload`, then rename it
/// over `target`. Any error drops the temp file and leaves `target` as it was.
fn write_atomic<W>(parent: &Path, target: &Path, write_payload: W) -> io::Result<()>
where
    W: FnOnce(&mut NamedTempFile) -> io::Result<()>,
{
    fs::create_dir_all(parent)?;
    let mut temp = NamedTempFile::new_in(parent)?;
    write_payload(&mut temp)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|err| err.error)?;
    Ok(())
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
