//! Bounded in-memory store of command execution logs.
//!
//! Entries are owned by the store once inserted and never mutated; lookups
//! hand out shared read-only handles. Eviction is oldest-first (insertion
//! order) and runs on every mutation plus a periodic sweep: age beyond the
//! retention window goes first, then count pressure, then total-size
//! pressure. A single oversized output is tail-truncated at insertion so the
//! per-entry bound always holds.

pub mod file_sink;
pub mod range;
pub mod search;

use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Sender, bounded, select, tick};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::json;

use crate::config::LoggingConfig;
use crate::truncate;

use file_sink::FileSink;

/// Flat per-entry cost accounted on top of the output bytes (id, command,
/// paths, counters).
const ENTRY_OVERHEAD_BYTES: usize = 256;

/// One finished command execution. Immutable after insertion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandLogEntry {
    /// `YYYYMMDD-HHMMSS-xxxx`; lexicographic order matches start-time order
    /// at one-second resolution.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub shell_name: String,
    pub command: String,
    pub working_directory: String,
    /// `None` when the child was killed before exiting on its own.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// All stdout, then all stderr with a single separating newline when
    /// stderr is non-empty. Not chronologically interleaved.
    pub combined_output: String,
    pub total_lines: usize,
    pub stdout_lines: usize,
    pub stderr_lines: usize,
    pub was_truncated: bool,
    pub returned_lines: usize,
    pub size_bytes: usize,
}

impl CommandLogEntry {
    /// Listing metadata: everything except the output bodies.
    pub fn metadata(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "timestamp": self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "shellName": self.shell_name,
            "command": self.command,
            "workingDirectory": self.working_directory,
            "exitCode": self.exit_code,
            "totalLines": self.total_lines,
            "sizeBytes": self.size_bytes,
            "wasTruncated": self.was_truncated,
        })
    }
}

/// Inputs for [`LogStore::store`].
#[derive(Debug)]
pub struct StoreRequest<'a> {
    pub shell_name: &'a str,
    pub command: &'a str,
    pub working_directory: &'a str,
    pub exit_code: Option<i32>,
    pub stdout: &'a str,
    pub stderr: &'a str,
    /// Lines returned inline to the caller; `None` when truncation is
    /// disabled for the call.
    pub inline_max_lines: Option<usize>,
}

/// Filters for [`LogStore::list`]. Empty filter lists everything.
#[derive(Debug, Default, Clone)]
pub struct ListFilter {
    pub shell_name: Option<String>,
    pub exit_code: Option<i32>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub count: usize,
    pub total_size: usize,
}

struct Inner {
    entries: IndexMap<String, Arc<CommandLogEntry>>,
    total_size: usize,
}

struct SweepHandle {
    shutdown: Sender<()>,
    thread: JoinHandle<()>,
}

/// Thread-safe bounded log store. Reads proceed in parallel; mutations and
/// the sweep serialize through the write lock.
pub struct LogStore {
    config: LoggingConfig,
    inner: RwLock<Inner>,
    sink: Option<FileSink>,
    sweep: Mutex<Option<SweepHandle>>,
}

impl LogStore {
    pub fn new(config: LoggingConfig, sink: Option<FileSink>) -> LogStore {
        LogStore {
            config,
            inner: RwLock::new(Inner {
                entries: IndexMap::new(),
                total_size: 0,
            }),
            sink,
            sweep: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }

    /// Insert a finished execution and return its id.
    pub fn store(&self, req: StoreRequest<'_>) -> String {
        let mut combined = req.stdout.to_string();
        if !req.stderr.is_empty() {
            combined.push('\n');
            combined.push_str(req.stderr);
        }

        // Per-entry size bound: keep the newest lines
        let capped = truncate::tail_within_bytes(&combined, self.config.max_log_size);
        let size_capped = capped.len() < combined.len();

        let total_lines = truncate::count_lines(capped);
        let returned_lines = match req.inline_max_lines {
            Some(max) => total_lines.min(max.max(1)),
            None => total_lines,
        };
        let was_truncated = size_capped
            || req
                .inline_max_lines
                .is_some_and(|max| total_lines > max.max(1));

        let mut inner = self.inner.write().expect("log store lock poisoned");
        let id = generate_id(&inner.entries);
        let entry = Arc::new(CommandLogEntry {
            id: id.clone(),
            timestamp: Utc::now(),
            shell_name: req.shell_name.to_string(),
            command: req.command.to_string(),
            working_directory: req.working_directory.to_string(),
            exit_code: req.exit_code,
            stdout: req.stdout.to_string(),
            stderr: req.stderr.to_string(),
            combined_output: capped.to_string(),
            total_lines,
            stdout_lines: truncate::count_lines(req.stdout),
            stderr_lines: truncate::count_lines(req.stderr),
            was_truncated,
            returned_lines,
            size_bytes: capped.len() + ENTRY_OVERHEAD_BYTES,
        });

        inner.total_size += entry.size_bytes;
        inner.entries.insert(id.clone(), Arc::clone(&entry));
        evict(&self.config, &mut inner);
        drop(inner);

        if let Some(sink) = &self.sink {
            sink.write(&entry);
        }
        id
    }

    pub fn get(&self, id: &str) -> Option<Arc<CommandLogEntry>> {
        self.inner
            .read()
            .expect("log store lock poisoned")
            .entries
            .get(id)
            .cloned()
    }

    /// Stored entries newest-first, optionally filtered.
    pub fn list(&self, filter: &ListFilter) -> Vec<Arc<CommandLogEntry>> {
        let inner = self.inner.read().expect("log store lock poisoned");
        inner
            .entries
            .values()
            .rev()
            .filter(|entry| {
                filter
                    .shell_name
                    .as_ref()
                    .is_none_or(|shell| &entry.shell_name == shell)
                    && filter.exit_code.is_none_or(|code| entry.exit_code == Some(code))
                    && filter.since.is_none_or(|since| entry.timestamp >= since)
                    && filter.until.is_none_or(|until| entry.timestamp <= until)
            })
            .cloned()
            .collect()
    }

    pub fn delete(&self, id: &str) -> bool {
        let mut inner = self.inner.write().expect("log store lock poisoned");
        match inner.entries.shift_remove(id) {
            Some(entry) => {
                inner.total_size -= entry.size_bytes;
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("log store lock poisoned");
        inner.entries.clear();
        inner.total_size = 0;
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read().expect("log store lock poisoned");
        StoreStats {
            count: inner.entries.len(),
            total_size: inner.total_size,
        }
    }

    /// Run an eviction pass immediately.
    pub fn sweep_now(&self) {
        let mut inner = self.inner.write().expect("log store lock poisoned");
        evict(&self.config, &mut inner);
    }

    /// Start the periodic eviction sweep. Idempotent; a second call while a
    /// sweep is running is a no-op.
    pub fn start_sweep(self: &Arc<Self>) {
        let interval_minutes = self.config.cleanup_interval_minutes;
        if interval_minutes == 0 {
            log::debug!("log sweep disabled (cleanup interval is 0)");
            return;
        }

        let mut guard = self.sweep.lock().expect("sweep handle lock poisoned");
        if guard.is_some() {
            return;
        }

        let (shutdown, shutdown_rx) = bounded::<()>(1);
        let store = Arc::clone(self);
        let thread = std::thread::spawn(move || {
            let ticker = tick(Duration::from_secs(interval_minutes * 60));
            loop {
                select! {
                    recv(ticker) -> _ => store.sweep_now(),
                    recv(shutdown_rx) -> _ => break,
                }
            }
        });
        *guard = Some(SweepHandle { shutdown, thread });
    }

    /// Stop the periodic sweep, waiting for the sweep thread to exit.
    pub fn stop_sweep(&self) {
        let handle = self.sweep.lock().expect("sweep handle lock poisoned").take();
        if let Some(SweepHandle { shutdown, thread }) = handle {
            let _ = shutdown.send(());
            let _ = thread.join();
        }
    }
}

/// Oldest-first eviction: retention window, then count cap, then total-size
/// cap. Insertion order doubles as timestamp order for this single-process
/// store.
fn evict(config: &LoggingConfig, inner: &mut Inner) {
    let cutoff = Utc::now() - chrono::Duration::minutes(config.log_retention_minutes as i64);
    loop {
        let expired = inner
            .entries
            .first()
            .is_some_and(|(_, oldest)| oldest.timestamp < cutoff);
        if !expired {
            break;
        }
        remove_oldest(inner);
    }
    while inner.entries.len() > config.max_stored_logs {
        remove_oldest(inner);
    }
    while inner.total_size > config.max_total_storage_size {
        remove_oldest(inner);
    }
}

fn remove_oldest(inner: &mut Inner) {
    if let Some((_, entry)) = inner.entries.shift_remove_index(0) {
        inner.total_size -= entry.size_bytes;
    }
}

/// Generate a fresh `YYYYMMDD-HHMMSS-xxxx` id, retrying the random suffix on
/// the (rare) collision within a burst.
fn generate_id(entries: &IndexMap<String, Arc<CommandLogEntry>>) -> String {
    const SUFFIX_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    loop {
        let prefix = Utc::now().format("%Y%m%d-%H%M%S");
        let suffix: String = (0..4)
            .map(|_| SUFFIX_CHARS[fastrand::usize(..SUFFIX_CHARS.len())] as char)
            .collect();
        let id = format!("{prefix}-{suffix}");
        if !entries.contains_key(&id) {
            return id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_store(max_stored: usize, max_log: usize, max_total: usize) -> LogStore {
        LogStore::new(
            LoggingConfig {
                max_stored_logs: max_stored,
                max_log_size: max_log,
                max_total_storage_size: max_total,
                ..Default::default()
            },
            None,
        )
    }

    fn store_output(store: &LogStore, stdout: &str) -> String {
        store.store(StoreRequest {
            shell_name: "bash",
            command: "echo test",
            working_directory: "/tmp",
            exit_code: Some(0),
            stdout,
            stderr: "",
            inline_max_lines: Some(20),
        })
    }

    #[test]
    fn id_format_is_sortable_timestamp_plus_suffix() {
        let store = small_store(10, 1024, 65536);
        let id = store_output(&store, "hello");
        // YYYYMMDD-HHMMSS-xxxx
        assert_eq!(id.len(), 20);
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 4);
    }

    #[test]
    fn combined_output_is_stdout_then_stderr() {
        let store = small_store(10, 4096, 65536);
        let id = store.store(StoreRequest {
            shell_name: "bash",
            command: "x",
            working_directory: "/tmp",
            exit_code: Some(1),
            stdout: "out line",
            stderr: "err line",
            inline_max_lines: Some(20),
        });
        let entry = store.get(&id).unwrap();
        assert_eq!(entry.combined_output, "out line\nerr line");
        assert_eq!(entry.total_lines, 2);
        assert_eq!(entry.stdout_lines, 1);
        assert_eq!(entry.stderr_lines, 1);
    }

    #[test]
    fn empty_stderr_adds_no_separator() {
        let store = small_store(10, 4096, 65536);
        let id = store_output(&store, "only stdout");
        assert_eq!(store.get(&id).unwrap().combined_output, "only stdout");
    }

    #[test]
    fn count_cap_evicts_oldest_first() {
        let store = small_store(3, 4096, 65536);
        let ids: Vec<String> = (0..5).map(|i| store_output(&store, &format!("run {i}"))).collect();
        assert_eq!(store.stats().count, 3);
        assert!(store.get(&ids[0]).is_none());
        assert!(store.get(&ids[1]).is_none());
        for id in &ids[2..] {
            assert!(store.get(id).is_some(), "newer entry {id} must survive");
        }
    }

    #[test]
    fn total_size_cap_holds_after_any_sequence() {
        let max_total = 3 * (ENTRY_OVERHEAD_BYTES + 100);
        let store = small_store(100, 4096, max_total);
        for i in 0..10 {
            store_output(&store, &format!("{:0100}", i));
            let stats = store.stats();
            assert!(stats.total_size <= max_total, "total {} > cap", stats.total_size);
        }
    }

    #[test]
    fn oversized_output_is_tail_truncated_at_insert() {
        let store = small_store(10, 64, 65536);
        let long: String = (0..50).map(|i| format!("line{i}\n")).collect();
        let id = store_output(&store, &long);
        let entry = store.get(&id).unwrap();
        assert!(entry.combined_output.len() <= 64);
        assert!(entry.was_truncated);
        // The newest lines are the ones kept
        assert!(entry.combined_output.contains("line49"));
        assert!(!entry.combined_output.contains("line0\n"));
        assert!(entry.size_bytes <= 64 + ENTRY_OVERHEAD_BYTES);
    }

    #[test]
    fn list_is_newest_first_and_filterable() {
        let store = small_store(10, 4096, 65536);
        store.store(StoreRequest {
            shell_name: "bash",
            command: "a",
            working_directory: "/tmp",
            exit_code: Some(0),
            stdout: "",
            stderr: "",
            inline_max_lines: None,
        });
        store.store(StoreRequest {
            shell_name: "wsl",
            command: "b",
            working_directory: "/tmp",
            exit_code: Some(1),
            stdout: "",
            stderr: "",
            inline_max_lines: None,
        });

        let all = store.list(&ListFilter::default());
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].command, "b");

        let bash_only = store.list(&ListFilter {
            shell_name: Some("bash".to_string()),
            ..Default::default()
        });
        assert_eq!(bash_only.len(), 1);
        assert_eq!(bash_only[0].command, "a");

        let failed = store.list(&ListFilter {
            exit_code: Some(1),
            ..Default::default()
        });
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].shell_name, "wsl");
    }

    #[test]
    fn delete_and_clear_update_stats() {
        let store = small_store(10, 4096, 65536);
        let id = store_output(&store, "x");
        store_output(&store, "y");
        assert_eq!(store.stats().count, 2);

        assert!(store.delete(&id));
        assert!(!store.delete(&id));
        assert_eq!(store.stats().count, 1);

        store.clear();
        assert_eq!(store.stats(), StoreStats { count: 0, total_size: 0 });
    }

    #[test]
    fn returned_lines_reflect_the_inline_cap() {
        let store = small_store(10, 4096, 65536);
        let ten: String = (1..=10).map(|i| format!("l{i}")).collect::<Vec<_>>().join("\n");
        let id = store.store(StoreRequest {
            shell_name: "bash",
            command: "x",
            working_directory: "/tmp",
            exit_code: Some(0),
            stdout: &ten,
            stderr: "",
            inline_max_lines: Some(3),
        });
        let entry = store.get(&id).unwrap();
        assert_eq!(entry.total_lines, 10);
        assert_eq!(entry.returned_lines, 3);
        assert!(entry.was_truncated);
    }

    #[test]
    fn metadata_omits_output_bodies() {
        let store = small_store(10, 4096, 65536);
        let id = store_output(&store, "secret payload");
        let metadata = store.get(&id).unwrap().metadata();
        assert_eq!(metadata["id"], id.as_str());
        assert!(metadata.get("combinedOutput").is_none());
        assert!(metadata.get("stdout").is_none());
    }

    #[test]
    fn sweep_lifecycle_is_idempotent() {
        let store = Arc::new(small_store(10, 4096, 65536));
        store.start_sweep();
        store.start_sweep();
        store.stop_sweep();
        store.stop_sweep();
    }
}
