//! Persistence boundary for the mutation log.

use super::types::LogEntry;
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Persisted log contents: the entries and how many of them are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredLog {
    pub entries: Vec<LogEntry>,
    pub cursor: usize,
}

impl StoredLog {
    fn append(&mut self, position: usize, entry: LogEntry) {
        self.entries.truncate(position);
        self.entries.push(entry);
        self.cursor = self.entries.len();
    }

    fn move_cursor(&mut self, cursor: usize) {
        self.cursor = cursor.min(self.entries.len());
    }

    fn undo(&mut self, position: usize, entry: LogEntry) {
        if let Some(slot) = self.entries.get_mut(position) {
            *slot = entry;
        }
        self.move_cursor(position);
    }
}

/// Storage collaborator for log entries.
///
/// Implementations must make each call atomic: after a failed call the
/// stored log is exactly what it was before.
pub trait LogStore: Send {
    /// Store `entry` as entry number `position`, discarding every stored entry
    /// at or after that position. The cursor moves to just past `entry`.
    fn append_entry(&mut self, position: usize, entry: &LogEntry) -> Result<(), StoreError>;

    /// Record an undo or redo.
    fn record_cursor(&mut self, cursor: usize) -> Result<(), StoreError>;

    /// Record an undo of entry `position` that also rewrites the stored entry
    /// as `entry`. The cursor moves to `position`.
    fn record_undo(&mut self, position: usize, entry: &LogEntry) -> Result<(), StoreError>;

    fn load(&self) -> Result<StoredLog, StoreError>;
}

/// Keeps the log in memory only.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    log: StoredLog,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for MemoryStore {
    fn append_entry(&mut self, position: usize, entry: &LogEntry) -> Result<(), StoreError> {
        self.log.append(position, entry.clone());
        Ok(())
    }

    fn record_cursor(&mut self, cursor: usize) -> Result<(), StoreError> {
        self.log.move_cursor(cursor);
        Ok(())
    }

    fn record_undo(&mut self, position: usize, entry: &LogEntry) -> Result<(), StoreError> {
        self.log.undo(position, entry.clone());
        Ok(())
    }

    fn load(&self) -> Result<StoredLog, StoreError> {
        Ok(self.log.clone())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum Record {
    Append { position: usize, entry: LogEntry },
    Cursor { cursor: usize },
    Undo { position: usize, entry: LogEntry },
}

/// Append-only file with one JSON record per line.
///
/// Truncation and cursor moves are themselves appended records, so every
/// write is a single line and a torn write can only lose the last record.
#[derive(Debug, Clone)]
pub struct JsonLinesStore {
    path: PathBuf,
}

impl JsonLinesStore {
    /// Open (creating if needed) a log file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, record: &Record) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }
}

impl LogStore for JsonLinesStore {
    fn append_entry(&mut self, position: usize, entry: &LogEntry) -> Result<(), StoreError> {
        debug!("Appending log entry {} at position {}", entry.sequence, position);
        self.write(&Record::Append {
            position,
            entry: entry.clone(),
        })
    }

    fn record_cursor(&mut self, cursor: usize) -> Result<(), StoreError> {
        self.write(&Record::Cursor { cursor })
    }

    fn record_undo(&mut self, position: usize, entry: &LogEntry) -> Result<(), StoreError> {
        debug!("Rewriting log entry {} on undo", entry.sequence);
        self.write(&Record::Undo {
            position,
            entry: entry.clone(),
        })
    }

    fn load(&self) -> Result<StoredLog, StoreError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let lines = reader.lines().collect::<Result<Vec<_>, _>>()?;
        let lines: Vec<&str> = lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()).collect();
        let mut log = StoredLog::default();
        for (index, line) in lines.iter().enumerate() {
            let record = match serde_json::from_str::<Record>(line) {
                Ok(record) => record,
                Err(err) if index + 1 == lines.len() => {
                    warn!("Ignoring torn final record in {}: {}", self.path.display(), err);
                    break;
                }
                Err(err) => return Err(err.into()),
            };
            match record {
                Record::Append { position, entry } => log.append(position, entry),
                Record::Cursor { cursor } => log.move_cursor(cursor),
                Record::Undo { position, entry } => log.undo(position, entry),
            }
        }
        Ok(log)
    }
}
