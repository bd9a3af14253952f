//! Snapshot store — current snapshot plus append-only history on disk.
//!
//! Layout under the data directory:
//!
//! ```text
//! rates.json                       current snapshot (atomic replace)
//! history/rates_YYYYMMDD_HHMMSS.json   one immutable file per run
//! ```
//!
//! Pretty-printed JSON with records pre-sorted by merge key, so the same
//! logical snapshot always produces identical bytes and history files can
//! be diffed.

use crate::model::Snapshot;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;

const CURRENT_FILE: &str = "rates.json";
const HISTORY_DIR: &str = "history";

/// Persistence errors. Surfaced in the run report; never fatal to a run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt snapshot at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("serializing snapshot for {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Directory-backed snapshot store.
pub struct SnapshotStore {
    data_dir: PathBuf,
}

impl SnapshotStore {
    /// Open (and create if needed) a store under the given directory.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        let history = data_dir.join(HISTORY_DIR);
        std::fs::create_dir_all(&history).map_err(|source| StoreError::Io {
            path: history,
            source,
        })?;
        Ok(Self { data_dir })
    }

    /// Path of the current-snapshot file.
    pub fn current_path(&self) -> PathBuf {
        self.data_dir.join(CURRENT_FILE)
    }

    /// Atomically replace the current snapshot.
    ///
    /// Serializes to a temp file in the same directory, then renames over
    /// the old file, so readers see either the previous snapshot or the new
    /// one — never a half-written file.
    pub fn write_current(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let target = self.current_path();
        let tmp = self.data_dir.join(format!(".{CURRENT_FILE}.tmp"));

        let bytes = serialize(snapshot, &tmp)?;
        std::fs::write(&tmp, bytes).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &target).map_err(|source| StoreError::Io {
            path: target,
            source,
        })?;
        Ok(())
    }

    /// Append an immutable, timestamp-named copy to the history log.
    ///
    /// Returns the written path. Never touches previous history files.
    pub fn append_history(
        &self,
        snapshot: &Snapshot,
        timestamp: DateTime<Utc>,
    ) -> Result<PathBuf, StoreError> {
        let path = self
            .data_dir
            .join(HISTORY_DIR)
            .join(format!("rates_{}.json", timestamp.format("%Y%m%d_%H%M%S")));

        let bytes = serialize(snapshot, &path)?;
        std::fs::write(&path, bytes).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Read the current snapshot; `None` when no run has persisted yet.
    pub fn read_current(&self) -> Result<Option<Snapshot>, StoreError> {
        let path = self.current_path();
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let snapshot =
            serde_json::from_str(&data).map_err(|source| StoreError::Corrupt { path, source })?;
        Ok(Some(snapshot))
    }
}

fn serialize(snapshot: &Snapshot, path: &Path) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(snapshot).map_err(|source| StoreError::Encode {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProductType, RateRecord, SourceStatus};
    use tempfile::TempDir;

    fn snapshot(rate: f64) -> Snapshot {
        Snapshot::new(
            Utc::now(),
            vec![RateRecord {
                entity_id: "nubank".to_string(),
                entity_name: "Nubank".to_string(),
                product_type: ProductType::Savings,
                term_days: 0,
                annual_rate_pct: rate,
                observed_at: Utc::now(),
                source_status: SourceStatus::Ok,
                source_url: "https://nu.com.co/".to_string(),
            }],
        )
    }

    #[test]
    fn test_read_current_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        assert!(store.read_current().unwrap().is_none());
    }

    #[test]
    fn test_write_and_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        store.write_current(&snapshot(9.25)).unwrap();
        let back = store.read_current().unwrap().unwrap();
        assert_eq!(back.records.len(), 1);
        assert_eq!(back.records[0].annual_rate_pct, 9.25);
    }

    #[test]
    fn test_write_current_replaces_previous() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        store.write_current(&snapshot(9.0)).unwrap();
        store.write_current(&snapshot(10.0)).unwrap();

        let back = store.read_current().unwrap().unwrap();
        assert_eq!(back.records[0].annual_rate_pct, 10.0);
        // No stray temp file left behind.
        assert!(!dir.path().join(".rates.json.tmp").exists());
    }

    #[test]
    fn test_append_history_accumulates() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        let t1 = "2026-03-01T08:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let t2 = "2026-03-01T09:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let p1 = store.append_history(&snapshot(9.0), t1).unwrap();
        let p2 = store.append_history(&snapshot(9.5), t2).unwrap();

        assert_ne!(p1, p2);
        assert!(p1.ends_with("rates_20260301_080000.json"));
        assert!(p1.exists() && p2.exists());
    }

    #[test]
    fn test_identical_snapshots_serialize_identically() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        let snap = snapshot(9.25);
        let t = "2026-03-01T08:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let p1 = store.append_history(&snap, t).unwrap();
        store.write_current(&snap).unwrap();

        let history_bytes = std::fs::read(p1).unwrap();
        let current_bytes = std::fs::read(store.current_path()).unwrap();
        assert_eq!(history_bytes, current_bytes);
    }

    #[test]
    fn test_corrupt_current_reports_error() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        std::fs::write(store.current_path(), "{not json").unwrap();
        assert!(matches!(
            store.read_current(),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
