use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::history::BACKUP_INTERVAL;
use crate::context::backup::{BackupStore, SnapshotReason};
use crate::context::persistence;
use crate::error::{ChatError, Result};
use crate::llm::{Message, Role};

/// One message of a conversation. Never modified after it is appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn to_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.content.clone(),
        }
    }

    /// First `max_chars` characters, with an ellipsis when cut.
    pub fn preview(&self, max_chars: usize) -> String {
        let mut chars = self.content.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{head}...")
        } else {
            head
        }
    }
}

/// Aggregate numbers over a history. Pure function of the turns.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistoryStatistics {
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub system_messages: usize,
    pub total_characters: usize,
    pub estimated_tokens: usize,
    pub average_message_length: usize,
    pub first_message: Option<DateTime<Utc>>,
    pub last_message: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
}

impl HistoryStatistics {
    pub fn compute(turns: &[Turn]) -> Self {
        let mut stats = Self {
            total_messages: turns.len(),
            ..Self::default()
        };

        for turn in turns {
            match turn.role {
                Role::User => stats.user_messages += 1,
                Role::Assistant => stats.assistant_messages += 1,
                Role::System => stats.system_messages += 1,
            }
            stats.total_characters += turn.content.chars().count();
        }

        // Rough heuristic, ~4 characters per token.
        stats.estimated_tokens = stats.total_characters / 4;
        if !turns.is_empty() {
            stats.average_message_length = stats.total_characters / turns.len();
        }

        stats.first_message = turns.first().map(|t| t.timestamp);
        stats.last_message = turns.last().map(|t| t.timestamp);
        if let (Some(first), Some(last)) = (stats.first_message, stats.last_message) {
            stats.duration_secs = Some((last - first).num_seconds().max(0));
        }

        stats
    }

    /// Conversation span as `H:MM:SS`.
    pub fn duration_display(&self) -> Option<String> {
        self.duration_secs.map(|secs| {
            format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
        })
    }
}

/// Ordered, size-bounded conversation log backed by `history.json`.
///
/// Every mutation is written to disk (temp file + rename) before the
/// in-memory state changes, so a failed write leaves both untouched.
pub struct HistoryStore {
    path: PathBuf,
    backups: BackupStore,
    turns: Vec<Turn>,
    max_size: usize,
    appends_since_backup: usize,
}

impl HistoryStore {
    /// Open the store at `path`, loading existing turns. A persisted history
    /// longer than `max_size` is truncated (with a snapshot) on open.
    pub fn open(path: impl Into<PathBuf>, backups: BackupStore, max_size: usize) -> Result<Self> {
        if max_size == 0 {
            return Err(ChatError::Config("max_history_size must be positive".into()));
        }

        let path = path.into();
        let turns: Vec<Turn> = persistence::read_json(&path)?.unwrap_or_default();
        tracing::info!(path = %path.display(), turns = turns.len(), "History loaded");

        let mut store = Self {
            path,
            backups,
            turns,
            max_size,
            appends_since_backup: 0,
        };
        store.truncate(max_size)?;
        Ok(store)
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// The last `n` turns (fewer if the history is shorter).
    pub fn last(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn append(&mut self, turn: Turn) -> Result<()> {
        self.append_all([turn])
    }

    /// Append several turns as one durable update, evicting the oldest turns
    /// until the size bound holds again.
    pub fn append_all(&mut self, turns: impl IntoIterator<Item = Turn>) -> Result<()> {
        let mut next = self.turns.clone();
        let before = next.len();
        next.extend(turns);
        let added = next.len() - before;

        let evicted = next.len().saturating_sub(self.max_size);
        next.drain(..evicted);

        self.commit(next)?;
        if evicted > 0 {
            tracing::info!("History truncated: {evicted} old messages removed");
        }

        self.appends_since_backup += added;
        if self.appends_since_backup >= BACKUP_INTERVAL {
            self.appends_since_backup = 0;
            // The history itself is already durable; a failed rolling copy is not fatal.
            if let Err(e) = self.backups.snapshot(&self.turns, SnapshotReason::Rolling) {
                tracing::warn!("Rolling backup failed: {e}");
            }
        }
        Ok(())
    }

    /// Turns whose content contains `term`, case-insensitively, in order.
    /// The iterator is lazy and can be cloned to restart.
    pub fn search(&self, term: &str) -> impl Iterator<Item = &Turn> + Clone + '_ {
        let needle = term.to_lowercase();
        self.turns
            .iter()
            .filter(move |t| t.content.to_lowercase().contains(&needle))
    }

    /// Keep only the last `n` turns. A snapshot of the prior state is taken
    /// first; returns its path, or `None` when nothing had to be removed.
    pub fn truncate(&mut self, n: usize) -> Result<Option<PathBuf>> {
        if self.turns.len() <= n {
            return Ok(None);
        }
        let remove = self.turns.len() - n;
        self.with_snapshot(SnapshotReason::Truncate, |turns| {
            turns.drain(..remove);
        })
        .map(Some)
    }

    /// Remove every turn after snapshotting the current history.
    pub fn clear(&mut self) -> Result<Option<PathBuf>> {
        if self.turns.is_empty() {
            return Ok(None);
        }
        let snapshot = self.with_snapshot(SnapshotReason::Clear, Vec::clear)?;
        tracing::info!("Conversation history cleared");
        Ok(Some(snapshot))
    }

    /// Change the bound, truncating (with a snapshot) if it shrank below the
    /// current length. On failure the store keeps its old bound and turns.
    pub fn set_max_size(&mut self, max_size: usize) -> Result<Option<PathBuf>> {
        if max_size == 0 {
            return Err(ChatError::Config("max_history_size must be positive".into()));
        }
        let snapshot = self.truncate(max_size)?;
        self.max_size = max_size;
        Ok(snapshot)
    }

    pub fn statistics(&self) -> HistoryStatistics {
        HistoryStatistics::compute(&self.turns)
    }

    /// Snapshot, mutate a working copy, then commit. The snapshot survives
    /// even if the commit fails.
    fn with_snapshot(
        &mut self,
        reason: SnapshotReason,
        mutate: impl FnOnce(&mut Vec<Turn>),
    ) -> Result<PathBuf> {
        let snapshot = self.backups.snapshot(&self.turns, reason)?;
        let mut next = self.turns.clone();
        mutate(&mut next);
        self.commit(next)?;
        Ok(snapshot)
    }

    fn commit(&mut self, next: Vec<Turn>) -> Result<()> {
        persistence::write_json_atomic(&self.path, &next)?;
        self.turns = next;
        Ok(())
    }
}
