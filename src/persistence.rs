//! # Snapshot Cache
//!
//! SQLite-backed cache for the expensive intermediate structures of a run:
//! the parsed link network with its geohash maps, the parsed probe traces,
//! and the evaluated trips.
//!
//! Each snapshot is keyed by kind and carries a fingerprint of the inputs it
//! was built from. A snapshot is only used when its fingerprint matches. Any
//! failure to read or decode a snapshot is a cache miss, and any failure to
//! store one is logged; the cache never fails a run.

use std::path::Path;
use std::time::UNIX_EPOCH;

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;

/// What a snapshot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    /// Link table and geohash maps
    Network,
    /// Parsed probe traces and auxiliary data
    Probes,
    /// Evaluated trips
    Results,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Network => "network",
            SnapshotKind::Probes => "probes",
            SnapshotKind::Results => "results",
        }
    }
}

/// Snapshot cache over a single SQLite database.
pub struct SnapshotStore {
    db: Connection,
}

impl SnapshotStore {
    /// Open (or create) the snapshot database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Connection::open(path)?;
        Self::init_schema(&db)?;
        Ok(Self { db })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self { db })
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                kind TEXT PRIMARY KEY,
                fingerprint TEXT NOT NULL,
                data BLOB NOT NULL,
                created_at INTEGER DEFAULT (strftime('%s', 'now'))
            );
        "#,
        )
    }

    /// Fingerprint of a source file: path, byte length and modification time.
    pub fn file_fingerprint(path: &Path) -> Result<String> {
        let metadata = std::fs::metadata(path)?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Ok(format!("{}:{}:{}", path.display(), metadata.len(), modified))
    }

    fn try_load<T: DeserializeOwned>(&self, kind: SnapshotKind, fingerprint: &str) -> Result<Option<T>> {
        let row: Option<(String, Vec<u8>)> = self
            .db
            .query_row(
                "SELECT fingerprint, data FROM snapshots WHERE kind = ?",
                params![kind.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((stored, data)) if stored == fingerprint => Ok(Some(rmp_serde::from_slice(&data)?)),
            Some(_) => {
                log::info!("[Snapshot] {} snapshot is stale", kind.as_str());
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Load a snapshot if one exists for `fingerprint`.
    ///
    /// Unreadable or undecodable snapshots are reported as a miss.
    pub fn load<T: DeserializeOwned>(&self, kind: SnapshotKind, fingerprint: &str) -> Option<T> {
        match self.try_load(kind, fingerprint) {
            Ok(Some(value)) => {
                log::info!("[Snapshot] Using cached {} snapshot", kind.as_str());
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!(
                    "[Snapshot] Discarding unreadable {} snapshot: {}",
                    kind.as_str(),
                    e
                );
                None
            }
        }
    }

    fn try_store<T: Serialize>(&self, kind: SnapshotKind, fingerprint: &str, value: &T) -> Result<()> {
        let data = rmp_serde::to_vec(value)?;
        self.db.execute(
            "INSERT OR REPLACE INTO snapshots (kind, fingerprint, data, created_at)
             VALUES (?, ?, ?, strftime('%s', 'now'))",
            params![kind.as_str(), fingerprint, data],
        )?;
        Ok(())
    }

    /// Store a snapshot, replacing any previous one of the same kind.
    ///
    /// Returns whether the snapshot was written.
    pub fn store<T: Serialize>(&self, kind: SnapshotKind, fingerprint: &str, value: &T) -> bool {
        match self.try_store(kind, fingerprint, value) {
            Ok(()) => {
                log::debug!("[Snapshot] Stored {} snapshot", kind.as_str());
                true
            }
            Err(e) => {
                log::warn!("[Snapshot] Failed to store {} snapshot: {}", kind.as_str(), e);
                false
            }
        }
    }

    /// Remove one snapshot kind.
    pub fn invalidate(&self, kind: SnapshotKind) -> Result<()> {
        self.db.execute(
            "DELETE FROM snapshots WHERE kind = ?",
            params![kind.as_str()],
        )?;
        Ok(())
    }

    /// Remove all snapshots.
    pub fn clear(&self) -> Result<()> {
        self.db.execute("DELETE FROM snapshots", [])?;
        Ok(())
    }
}
