//! JSON snapshot persistence for the rate-limit table.
//!
//! The file maps `symbol -> timeframe -> entry`:
//!
//! ```json
//! { "BTCUSDT": { "1h": { "count": 1, "last_reset": "2024-03-09",
//!   "last_alerted_open_time": 1709992800000, "last_alert_timestamp": 1709993100,
//!   "cooldown_seconds": 3600 } } }
//! ```
//!
//! The older dedup-only layout, `{ "BTCUSDT_1h": { "open_time": ..., "timestamp": ... } }`,
//! is still accepted on load, either in place or from a fallback path read
//! only while the primary file does not exist.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use super::{RateLimitEntry, RateLimitTable};
use crate::VolwatchError;
use crate::models::Timeframe;

/// Dedup-only entry written by earlier releases.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyEntry {
    pub open_time: i64,
}

/// Decoded contents of a snapshot file.
#[derive(Debug)]
pub enum Snapshot {
    Table(RateLimitTable),
    /// Legacy entries re-keyed by `(symbol, timeframe)`.
    Legacy(BTreeMap<(String, Timeframe), LegacyEntry>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotFile {
    Table(RateLimitTable),
    Legacy(BTreeMap<String, LegacyEntry>),
}

/// Reads and writes the snapshot file at a fixed path.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    fallback: Option<PathBuf>,
}

impl SnapshotStore {
    /// Creates a store backed by `path`. Nothing is touched until the first
    /// load or save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fallback: None,
        }
    }

    /// Loads from `legacy` while the primary file is missing. Saves always
    /// go to the primary path.
    pub fn with_fallback(mut self, legacy: impl Into<PathBuf>) -> Self {
        self.fallback = Some(legacy.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the snapshot, returning `None` if the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`VolwatchError::Io`] if the file exists but cannot be read,
    /// or [`VolwatchError::MalformedMessage`] if it matches neither layout.
    pub fn load(&self) -> crate::Result<Option<Snapshot>> {
        let Some((path, contents)) = self.read_first()? else {
            debug!(path = %self.path.display(), "no snapshot yet");
            return Ok(None);
        };
        if path != self.path.as_path() {
            info!(path = %path.display(), "loading fallback snapshot");
        }

        let file: SnapshotFile = serde_json::from_str(&contents).map_err(|e| {
            let path = path.display();
            VolwatchError::MalformedMessage(format!("unrecognised snapshot {path}: {e}"))
        })?;

        Ok(Some(match file {
            SnapshotFile::Table(table) => Snapshot::Table(table),
            SnapshotFile::Legacy(entries) => Snapshot::Legacy(
                entries
                    .into_iter()
                    .filter_map(|(key, entry)| {
                        let (symbol, timeframe) = key.rsplit_once('_')?;
                        let timeframe = timeframe.parse().ok()?;
                        Some(((symbol.to_string(), timeframe), entry))
                    })
                    .collect(),
            ),
        }))
    }

    /// Writes the whole table, replacing the previous snapshot atomically.
    ///
    /// # Errors
    ///
    /// Returns [`VolwatchError::Io`] if the directory, temporary file, or
    /// rename fails.
    pub fn save(&self, table: &RateLimitTable) -> crate::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                VolwatchError::Io(format!("failed to create {}: {e}", dir.display()))
            })?;
        }

        let json = serde_json::to_string_pretty(table)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| VolwatchError::Io(format!("failed to write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            VolwatchError::Io(format!("failed to replace {}: {e}", self.path.display()))
        })
    }
}

impl SnapshotStore {
    /// Contents of the primary file, or of the fallback when the primary
    /// does not exist.
    fn read_first(&self) -> crate::Result<Option<(&Path, String)>> {
        for path in std::iter::once(&self.path).chain(&self.fallback) {
            if let Some(contents) = read_if_exists(path)? {
                return Ok(Some((path.as_path(), contents)));
            }
        }
        Ok(None)
    }
}

fn read_if_exists(path: &Path) -> crate::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(VolwatchError::Io(format!("failed to read {}: {e}", path.display()))),
    }
}

/// Looks up an entry in a loaded table.
pub(super) fn lookup<'a>(
    table: &'a RateLimitTable,
    symbol: &str,
    timeframe: Timeframe,
) -> Option<&'a RateLimitEntry> {
    table.get(symbol)?.get(&timeframe)
}
