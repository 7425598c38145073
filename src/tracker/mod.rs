use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);
const TEMP_PREFIX: &str = ".ledgerline.tmp.";

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker io error: {0}")]
    Io(#[from] io::Error),
    #[error("tracker state error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One consumed-file ledger entry. The content hash is recorded for
/// diagnostics; membership in the ledger is keyed by the file identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumedFile {
    pub sha256: String,
    pub ingested_at: String,
}

/// Persistent set of source-file identifiers already folded into the store.
/// Read at the start of every incremental run; entries are never removed by
/// this core. Save is load-merge-save over an atomic rename so a racing run
/// cannot lose entries or tear the file.
#[derive(Debug)]
pub struct IngestionTracker {
    path: PathBuf,
    files: HashMap<String, ConsumedFile>,
    /// Ids registered since the last successful save. These carry this run's
    /// hash and timestamp and must win the save-time merge.
    dirty: HashSet<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrackerState {
    files: HashMap<String, ConsumedFile>,
}

impl IngestionTracker {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, TrackerError> {
        let path = path.into();
        let files = read_state(&path)?.files;
        Ok(Self {
            path,
            files,
            dirty: HashSet::new(),
        })
    }

    pub fn is_consumed(&self, id: &str) -> bool {
        self.files.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Marks a file consumed in memory. Not visible to other runs until
    /// [`IngestionTracker::save`] lands.
    pub fn register(&mut self, id: &str, sha256: String) {
        self.files.insert(
            id.to_string(),
            ConsumedFile {
                sha256,
                ingested_at: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            },
        );
        self.dirty.insert(id.to_string());
    }

    /// Merges the in-memory set with whatever is currently on disk, then
    /// replaces the file atomically. Ids registered by this run overwrite
    /// their disk entry (the ledger records the most recent ingest of a
    /// file); for everything else the on-disk entry is kept, so a racing
    /// run's additions survive.
    pub fn save(&mut self) -> Result<(), TrackerError> {
        let mut merged = read_state(&self.path)?.files;
        for (id, entry) in &self.files {
            if self.dirty.contains(id) {
                merged.insert(id.clone(), entry.clone());
            } else {
                merged.entry(id.clone()).or_insert_with(|| entry.clone());
            }
        }
        self.files = merged;

        let state = TrackerState {
            files: self.files.clone(),
        };
        let content = serde_json::to_string_pretty(&state)?;
        atomic_write(&self.path, content.as_bytes())?;
        self.dirty.clear();
        Ok(())
    }
}

fn read_state(path: &Path) -> Result<TrackerState, TrackerError> {
    if !path.exists() {
        return Ok(TrackerState::default());
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write-to-temp-in-parent then rename, with fsync on the file and the
/// parent directory. A failed write leaves the previous state intact.
fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path `{}` has no parent directory", path.display()),
        )
    })?;
    fs::create_dir_all(parent)?;

    let tmp_path = temp_path_in(parent, path)?;
    let result = (|| -> io::Result<()> {
        let mut tmp = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp_path)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, path)?;
        sync_parent_dir(parent)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn temp_path_in(parent: &Path, final_path: &Path) -> io::Result<PathBuf> {
    let file_name = final_path
        .file_name()
        .and_then(|value| value.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid target filename"))?;
    let epoch_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| io::Error::other(err.to_string()))?
        .as_nanos();
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{TEMP_PREFIX}{file_name}.{epoch_nanos}.{}.{}",
        std::process::id(),
        counter
    );
    Ok(parent.join(tmp_name))
}

#[cfg(unix)]
fn sync_parent_dir(parent: &Path) -> io::Result<()> {
    File::open(parent)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent_dir(_parent: &Path) -> io::Result<()> {
    Ok(())
}
