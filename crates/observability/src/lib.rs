//! Append-only JSONL event log with daily rotation.
//!
//! One file per UTC date at `<base>/YYYY-MM-DD_events.jsonl`. Every write
//! takes an OS-level exclusive lock on the file, appends a single line,
//! flushes, and releases, so concurrent daemon tasks and API requests can
//! share the log. Logging never raises: on persistent lock contention or
//! I/O failure the event degrades to stderr.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock};
use std::thread;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use fs2::FileExt;
use serde_json::{Map, Value, json};

const LOCK_RETRIES: u32 = 3;

#[derive(Debug)]
pub struct EventLog {
    base_dir: PathBuf,
}

impl EventLog {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        if let Err(e) = fs::create_dir_all(&base_dir) {
            eprintln!(
                "[observability] cannot create {}: {e}",
                base_dir.display()
            );
        }
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Append one event line. `metadata` must be a JSON object (or null).
    pub fn log(&self, event: &str, metadata: Value) {
        let now = Utc::now();
        let path = self
            .base_dir
            .join(format!("{}_events.jsonl", now.format("%Y-%m-%d")));

        let mut entry = Map::new();
        entry.insert("ts".into(), json!(now.to_rfc3339()));
        entry.insert("event".into(), json!(event));
        if let Value::Object(fields) = metadata {
            entry.extend(fields);
        }
        let line = Value::Object(entry).to_string();

        for attempt in 0..LOCK_RETRIES {
            match self.try_append(&path, &line) {
                Ok(()) => return,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if attempt + 1 < LOCK_RETRIES {
                        thread::sleep(Duration::from_millis(10 * (attempt as u64 + 1)));
                    } else {
                        eprintln!(
                            "[observability] failed to log event after {LOCK_RETRIES} attempts: {event}"
                        );
                    }
                }
                Err(e) => {
                    eprintln!("[observability] error logging event '{event}': {e}");
                    return;
                }
            }
        }
    }

    fn try_append(&self, path: &Path, line: &str) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        file.try_lock_exclusive()?;
        let result = (|| {
            let mut f = &file;
            f.write_all(line.as_bytes())?;
            f.write_all(b"\n")?;
            f.flush()
        })();
        let _ = fs2::FileExt::unlock(&file);
        result
    }

    /// Remove event files older than `retention_days`. Returns the number
    /// of files removed. Files with unparseable names are skipped.
    pub fn cleanup_old_files(&self, retention_days: i64) -> usize {
        let Ok(entries) = fs::read_dir(&self.base_dir) else {
            return 0;
        };
        let cutoff = Utc::now().date_naive() - chrono::Duration::days(retention_days);
        let mut removed = 0;

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(date_str) = name.strip_suffix("_events.jsonl") else {
                continue;
            };
            let Ok(file_date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
                continue;
            };
            if file_date < cutoff {
                match fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => eprintln!(
                        "[observability] error removing {}: {e}",
                        entry.path().display()
                    ),
                }
            }
        }

        removed
    }
}

// ── Process-wide singleton ───────────────────────────────────────────────────

static LOGGER: OnceLock<RwLock<Option<EventLog>>> = OnceLock::new();

fn slot() -> &'static RwLock<Option<EventLog>> {
    LOGGER.get_or_init(|| RwLock::new(None))
}

/// Point the global logger at a directory. Later calls replace the target
/// (tests use this as the reset hook).
pub fn init(base_dir: impl Into<PathBuf>) {
    *slot().write().expect("observability lock poisoned") = Some(EventLog::new(base_dir));
}

/// Drop the global logger; subsequent events are discarded.
pub fn reset() {
    *slot().write().expect("observability lock poisoned") = None;
}

/// Log through the global logger. A no-op until [`init`] has run.
pub fn log(event: &str, metadata: Value) {
    if let Some(logger) = slot().read().expect("observability lock poisoned").as_ref() {
        logger.log(event, metadata);
    }
}

/// Run retention cleanup on the global logger. A no-op until [`init`].
pub fn cleanup_old_files(retention_days: i64) -> usize {
    slot()
        .read()
        .expect("observability lock poisoned")
        .as_ref()
        .map(|logger| logger.cleanup_old_files(retention_days))
        .unwrap_or(0)
}
