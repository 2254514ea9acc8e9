use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::constants::history::MAX_ROLLING_BACKUPS;
use crate::context::history::Turn;
use crate::context::persistence;
use crate::error::{ChatError, Result};

const SNAPSHOT_PREFIX: &str = "snapshot_";
const ROLLING_PREFIX: &str = "rolling_";

/// Why a copy of the history was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotReason {
    Clear,
    Truncate,
    /// Periodic copy taken while appending; subject to automatic rotation.
    Rolling,
}

impl SnapshotReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotReason::Clear => "clear",
            SnapshotReason::Truncate => "truncate",
            SnapshotReason::Rolling => "rolling",
        }
    }

    fn from_file_name(name: &str) -> Option<Self> {
        if name.starts_with(ROLLING_PREFIX) && name.ends_with(".json") {
            return Some(SnapshotReason::Rolling);
        }
        let stem = name.strip_prefix(SNAPSHOT_PREFIX)?.strip_suffix(".json")?;
        if stem.contains("_clear") {
            Some(SnapshotReason::Clear)
        } else if stem.contains("_truncate") {
            Some(SnapshotReason::Truncate)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackupInfo {
    pub path: PathBuf,
    pub reason: SnapshotReason,
    pub size: u64,
}

/// Timestamped, write-once copies of an agent's history.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a full copy of `turns`. Snapshot files are never rewritten.
    pub fn snapshot(&self, turns: &[Turn], reason: SnapshotReason) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| ChatError::storage(&self.dir, e))?;

        let path = self.unique_path(reason);
        persistence::write_json_atomic(&path, turns)?;
        tracing::info!(
            path = %path.display(),
            turns = turns.len(),
            reason = reason.as_str(),
            "History snapshot written"
        );

        if reason == SnapshotReason::Rolling {
            self.rotate_rolling(MAX_ROLLING_BACKUPS)?;
        }
        Ok(path)
    }

    fn unique_path(&self, reason: SnapshotReason) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let base = match reason {
            SnapshotReason::Rolling => format!("{ROLLING_PREFIX}{stamp}"),
            _ => format!("{SNAPSHOT_PREFIX}{stamp}_{}", reason.as_str()),
        };

        let mut path = self.dir.join(format!("{base}.json"));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{base}_{n:03}.json"));
            n += 1;
        }
        path
    }

    /// All backups, oldest first.
    pub fn list(&self) -> Result<Vec<BackupInfo>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ChatError::storage(&self.dir, e)),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ChatError::storage(&self.dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(reason) = SnapshotReason::from_file_name(&name) else {
                continue;
            };
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            backups.push(BackupInfo {
                path: entry.path(),
                reason,
                size,
            });
        }

        backups.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(backups)
    }

    pub fn load(&self, path: &Path) -> Result<Vec<Turn>> {
        persistence::read_json(path)?.ok_or_else(|| {
            ChatError::storage(path, io::Error::new(io::ErrorKind::NotFound, "backup not found"))
        })
    }

    /// Delete all but the newest `keep` destructive snapshots. Returns how many were removed.
    pub fn prune(&self, keep: usize) -> Result<usize> {
        self.remove_oldest(keep, |r| r != SnapshotReason::Rolling)
    }

    fn rotate_rolling(&self, keep: usize) -> Result<usize> {
        self.remove_oldest(keep, |r| r == SnapshotReason::Rolling)
    }

    fn remove_oldest(&self, keep: usize, select: impl Fn(SnapshotReason) -> bool) -> Result<usize> {
        let selected: Vec<BackupInfo> = self
            .list()?
            .into_iter()
            .filter(|b| select(b.reason))
            .collect();

        let excess = selected.len().saturating_sub(keep);
        for backup in &selected[..excess] {
            fs::remove_file(&backup.path).map_err(|e| ChatError::storage(&backup.path, e))?;
        }
        if excess > 0 {
            tracing::info!(removed = excess, dir = %self.dir.display(), "Pruned history backups");
        }
        Ok(excess)
    }
}
