use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to write job history {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize job history: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
struct HistoryFile {
    job_uids: BTreeSet<String>,
}

/// Every job uid that has ever been alerted on, backed by a JSON file.
///
/// The set only grows. Membership is the sole test for "already alerted".
pub struct JobHistory {
    path: PathBuf,
    seen: HashSet<String>,
    /// Set while the file lags behind `seen`.
    dirty: bool,
}

impl JobHistory {
    /// Load the history at `path`. A missing or unreadable file gives an
    /// empty history rather than an error.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let seen = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HistoryFile>(&raw) {
                Ok(file) => file.job_uids.into_iter().collect(),
                Err(e) => {
                    warn!("Job history at {} is corrupted ({}), starting fresh", path.display(), e);
                    HashSet::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => {
                warn!("Could not read job history at {} ({}), starting fresh", path.display(), e);
                HashSet::new()
            }
        };
        info!("Loaded {} previously seen jobs", seen.len());
        Self { path, seen, dirty: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, job_uid: &str) -> bool {
        self.seen.contains(job_uid)
    }

    /// Returns true when the uid was not already present.
    pub fn add(&mut self, job_uid: &str) -> bool {
        let inserted = self.seen.insert(job_uid.to_string());
        self.dirty |= inserted;
        inserted
    }

    /// True when uids were added since the last successful persist.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Sorted copy of the tracked uids.
    pub fn uids(&self) -> Vec<&str> {
        let mut uids: Vec<&str> = self.seen.iter().map(String::as_str).collect();
        uids.sort_unstable();
        uids
    }

    /// Overwrite the file with the full in-memory set. Written to a sibling
    /// temp file first so a crash mid-write cannot truncate the history.
    pub fn persist(&mut self) -> Result<(), HistoryError> {
        let io_err = |source| HistoryError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file = HistoryFile {
            job_uids: self.seen.iter().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        self.dirty = false;
        Ok(())
    }
}
