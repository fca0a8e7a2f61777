//! Append-only per-day run log that operators read after a run.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Local, NaiveDate};
use uuid::Uuid;

use crate::batch::Operation;
use crate::error::{ApiError, HolidirResult};
use crate::mailbox::{Mailbox, ShardKey};

/// What gets written for one mailbox or shard outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry<'a> {
    Added { mailbox: &'a Mailbox, count: usize },
    Removed { mailbox: &'a Mailbox, count: usize },
    NothingToRemove { mailbox: &'a Mailbox },
    FirstAttemptFailed { mailbox: &'a Mailbox, operation: Operation, error: &'a ApiError },
    Fatal { mailbox: &'a Mailbox, error: &'a ApiError },
    ShardFailed { shard: ShardKey, reason: &'a str },
}

impl LogEntry<'_> {
    fn message(&self) -> String {
        match self {
            LogEntry::Added { mailbox, count } => {
                format!("Added {count} holidays to mailbox: {mailbox}")
            }
            LogEntry::Removed { mailbox, count } => {
                format!("Removed {count} holidays from the calendar of {mailbox}")
            }
            LogEntry::NothingToRemove { mailbox } => {
                format!("Nothing to remove for mailbox: {mailbox}")
            }
            LogEntry::FirstAttemptFailed {
                mailbox,
                operation,
                error,
            } => {
                let phase = match operation {
                    Operation::Insert => "initial add",
                    Operation::Remove => "initial removal",
                };
                format!("Error during {phase} - mailbox: {mailbox}; {error}")
            }
            LogEntry::Fatal { mailbox, error } => {
                format!("Fatal: mailbox {mailbox} failed on retry; will not retry. {error}")
            }
            LogEntry::ShardFailed { shard, reason } => {
                format!("Shard {shard} could not be processed: {reason}")
            }
        }
    }
}

enum Sink {
    File(File),
    Memory(Vec<String>),
}

/// Line-oriented run log. Whole lines are written under a lock, so
/// concurrent shards never interleave partial lines.
pub struct RunLog {
    run_id: Uuid,
    sink: Mutex<Sink>,
}

impl RunLog {
    /// Open (appending) the log file for `operation` on `date` in `dir`.
    pub fn open(dir: &Path, operation: Operation, date: NaiveDate) -> HolidirResult<Self> {
        std::fs::create_dir_all(dir)?;
        let path = Self::path_for(dir, operation, date);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let log = RunLog {
            run_id: Uuid::new_v4(),
            sink: Mutex::new(Sink::File(file)),
        };
        log.write_line(&format!("Run {} started ({})", log.run_id, operation));
        Ok(log)
    }

    /// A log kept in memory, for tests and dry tooling.
    pub fn in_memory() -> Self {
        RunLog {
            run_id: Uuid::new_v4(),
            sink: Mutex::new(Sink::Memory(Vec::new())),
        }
    }

    pub fn path_for(dir: &Path, operation: Operation, date: NaiveDate) -> PathBuf {
        let kind = match operation {
            Operation::Insert => "add",
            Operation::Remove => "undo",
        };
        dir.join(format!("{}_{kind}_holiday_log.txt", date.format("%m%d%Y")))
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn record(&self, entry: LogEntry<'_>) {
        self.write_line(&entry.message());
    }

    /// Lines written so far, for in-memory logs. File logs return nothing.
    pub fn lines(&self) -> Vec<String> {
        match &*self.lock() {
            Sink::Memory(lines) => lines.clone(),
            Sink::File(_) => Vec::new(),
        }
    }

    fn write_line(&self, message: &str) {
        let line = format!("{} - {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message);

        match &mut *self.lock() {
            Sink::File(file) => {
                if let Err(e) = writeln!(file, "{line}").and_then(|_| file.flush()) {
                    tracing::error!(error = %e, "could not write run log line: {line}");
                }
            }
            Sink::Memory(lines) => lines.push(line),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Sink> {
        self.sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
