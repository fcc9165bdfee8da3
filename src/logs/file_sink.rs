//! Optional file mirror for stored log entries.
//!
//! When a log directory is configured, each stored entry is written as
//! `<id>.json`. The sink is a transparent, best-effort audit trail: the
//! in-memory store stays authoritative, and a failed write is logged at
//! `warn` without failing the command.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::CommandLogEntry;

pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    /// Create the sink, making the directory if needed.
    pub fn new(dir: &Path) -> std::io::Result<FileSink> {
        fs::create_dir_all(dir)?;
        Ok(FileSink {
            dir: dir.to_path_buf(),
        })
    }

    /// Mirror one entry. Ids outside `[A-Za-z0-9-]` are refused so a
    /// malformed id can never traverse out of the sink directory.
    pub fn write(&self, entry: &CommandLogEntry) {
        if !is_safe_id(&entry.id) {
            log::warn!("log sink skipped entry with unsafe id {:?}", entry.id);
            return;
        }
        let path = self.dir.join(format!("{}.json", entry.id));
        if let Err(e) = write_entry(&path, entry) {
            log::warn!("log sink write failed for {}: {e}", path.display());
        }
    }
}

fn write_entry(path: &Path, entry: &CommandLogEntry) -> std::io::Result<()> {
    let mut payload = serde_json::to_vec_pretty(entry).map_err(std::io::Error::other)?;
    payload.push(b'\n');
    // Single write_all so concurrent completions never interleave
    let mut file = File::create(path)?;
    file.write_all(&payload)
}

fn is_safe_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}
