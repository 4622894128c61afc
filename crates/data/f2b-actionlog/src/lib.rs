//! Action log
//!
//! Append-only record of every ban/unban performed through the API, kept as
//! JSON Lines:
//! ```text
//! <data dir>/f2b-dashboard/
//! └── actions.jsonl    # one ActionLogEntry per line, oldest first
//! ```
//!
//! Writers are serialized by an async mutex. Ids and timestamps are assigned
//! under that lock, so ids strictly increase and timestamps never go
//! backwards, even across restarts. An id is spent once assigned: a failed
//! write leaves a gap, never a duplicate.
//!
//! A line is either fully on disk or not at all. A torn tail (crash, short
//! write) is cut back to the last newline before anything else is appended.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use f2b_core::{ActionKind, ActionLogEntry, Outcome};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Append task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// What the caller knows about an action; the store adds id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub action: ActionKind,
    pub jail: String,
    pub ip: String,
    pub outcome: Outcome,
    pub error: Option<String>,
}

impl NewEntry {
    pub fn success(action: ActionKind, jail: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            action,
            jail: jail.into(),
            ip: ip.into(),
            outcome: Outcome::Success,
            error: None,
        }
    }

    pub fn failure(
        action: ActionKind,
        jail: impl Into<String>,
        ip: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            action,
            jail: jail.into(),
            ip: ip.into(),
            outcome: Outcome::Failure,
            error: Some(error.into()),
        }
    }
}

/// Filters for [`ActionLog::query`]. All fields are optional.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    /// Only entries at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Keep the newest N matches.
    pub limit: Option<usize>,
    pub jail: Option<String>,
    pub action: Option<ActionKind>,
}

impl LogQuery {
    fn matches(&self, entry: &ActionLogEntry) -> bool {
        self.since.map_or(true, |since| entry.timestamp >= since)
            && self.jail.as_deref().map_or(true, |jail| entry.jail == jail)
            && self.action.map_or(true, |action| entry.action == action)
    }
}

struct Cursor {
    next_id: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

pub struct ActionLog {
    path: PathBuf,
    cursor: Arc<Mutex<Cursor>>,
}

impl ActionLog {
    /// Open (or create) the log at `path`. Sequence ids continue from the
    /// highest id already on disk.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error(parent, source))?;
        }

        let mut file = open_for_append(&path).await?;
        whole_lines_len(&path, &mut file).await?;

        let existing = read_entries(&path).await?;
        let cursor = Cursor {
            next_id: existing.iter().map(|e| e.id).max().map_or(1, |id| id + 1),
            last_timestamp: existing.iter().map(|e| e.timestamp).max(),
        };
        tracing::info!(
            path = %path.display(),
            entries = existing.len(),
            next_id = cursor.next_id,
            "action log opened"
        );

        Ok(Self {
            path,
            cursor: Arc::new(Mutex::new(cursor)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry stamped with the current time.
    pub async fn append(&self, entry: NewEntry) -> Result<ActionLogEntry> {
        self.append_at(entry, Utc::now()).await
    }

    /// Append with an explicit clock reading. A reading earlier than the
    /// last written timestamp is raised to it.
    ///
    /// Once the lock is taken the write runs on its own task, so dropping
    /// the returned future cannot stop a line halfway or hand its id out
    /// twice.
    pub async fn append_at(&self, entry: NewEntry, now: DateTime<Utc>) -> Result<ActionLogEntry> {
        let mut cursor = self.cursor.clone().lock_owned().await;

        let timestamp = cursor.last_timestamp.map_or(now, |last| last.max(now));
        let record = ActionLogEntry {
            id: cursor.next_id,
            timestamp,
            action: entry.action,
            jail: entry.jail,
            ip: entry.ip,
            outcome: entry.outcome,
            error: entry.error,
        };
        cursor.next_id += 1;
        cursor.last_timestamp = Some(timestamp);

        let path = self.path.clone();
        let task = tokio::spawn(async move {
            let written = write_line(&path, &record).await;
            drop(cursor);
            written.map(|()| record)
        });
        let record = task.await??;

        tracing::debug!(id = record.id, action = %record.action, jail = %record.jail, ip = %record.ip, "action logged");
        Ok(record)
    }

    /// Matching entries in timestamp order. With a limit, the newest N are
    /// kept and still returned oldest first.
    pub async fn query(&self, query: &LogQuery) -> Result<Vec<ActionLogEntry>> {
        let mut entries = {
            let _guard = self.cursor.lock().await;
            read_entries(&self.path).await?
        };

        entries.retain(|e| query.matches(e));
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

        if let Some(limit) = query.limit {
            let skip = entries.len().saturating_sub(limit);
            entries.drain(..skip);
        }
        Ok(entries)
    }

    /// Timestamps of successful bans, for the live timeline.
    pub async fn ban_times_since(&self, since: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>> {
        let query = LogQuery {
            since: Some(since),
            action: Some(ActionKind::Ban),
            ..LogQuery::default()
        };
        Ok(self
            .query(&query)
            .await?
            .into_iter()
            .filter(|e| e.succeeded())
            .map(|e| e.timestamp)
            .collect())
    }
}

async fn read_entries(path: &Path) -> Result<Vec<ActionLogEntry>> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(io_error(path, source)),
    };

    let mut entries = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ActionLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => tracing::warn!(
                path = %path.display(),
                line = index + 1,
                error = %e,
                "skipping corrupt action log line"
            ),
        }
    }
    Ok(entries)
}

async fn open_for_append(path: &Path) -> Result<File> {
    tokio::fs::OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .await
        .map_err(|source| io_error(path, source))
}

/// Length of the file once any torn tail is cut off.
async fn whole_lines_len(path: &Path, file: &mut File) -> Result<u64> {
    let len = file
        .metadata()
        .await
        .map_err(|source| io_error(path, source))?
        .len();
    let torn = len > 0
        && !ends_with_newline(file, len)
            .await
            .map_err(|source| io_error(path, source))?;
    if torn {
        return truncate_torn_tail(path).await;
    }
    Ok(len)
}

async fn ends_with_newline(file: &mut File, len: u64) -> std::io::Result<bool> {
    file.seek(SeekFrom::Start(len - 1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] == b'\n')
}

/// Cut the file back to just after its last newline. Returns the new length.
async fn truncate_torn_tail(path: &Path) -> Result<u64> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| io_error(path, source))?;
    let keep = bytes
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1);

    tracing::warn!(
        path = %path.display(),
        dropped_bytes = bytes.len() - keep,
        "truncating torn action log tail"
    );
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(|source| io_error(path, source))?;
    file.set_len(keep as u64)
        .await
        .map_err(|source| io_error(path, source))?;
    file.sync_data()
        .await
        .map_err(|source| io_error(path, source))?;
    Ok(keep as u64)
}

/// Append one record as a full line and sync it. On failure the file is cut
/// back to its previous length.
async fn write_line(path: &Path, record: &ActionLogEntry) -> Result<()> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');

    let mut file = open_for_append(path).await?;
    let len = whole_lines_len(path, &mut file).await?;

    if let Err(source) = write_synced(&mut file, &line).await {
        if let Err(e) = file.set_len(len).await {
            tracing::warn!(path = %path.display(), error = %e, "could not roll back partial action log line");
        }
        return Err(io_error(path, source));
    }
    Ok(())
}

async fn write_synced(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await?;
    file.sync_data().await
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}
