//! Read-only SQLite access through a private copy.
//!
//! Browsers and desktop apps hold their databases open (and sometimes
//! locked), so every read goes through a copy in a temporary directory.
//! The `-wal` and `-shm` sidecars are copied when present so recent writes
//! that have not been checkpointed are still visible.

use super::error::DecodeError;
use rusqlite::Connection;
use std::path::Path;
use tempfile::TempDir;
use tracing::debug;

/// A copied database; the copy is removed when this is dropped.
pub struct DatabaseSnapshot {
    // Field order matters: the connection must close before the directory goes.
    conn: Connection,
    _dir: TempDir,
}

impl DatabaseSnapshot {
    pub fn open(source: &Path) -> Result<Self, DecodeError> {
        let dir = tempfile::Builder::new().prefix("quotabar-db").tempdir()?;
        let file_name = source
            .file_name()
            .ok_or_else(|| DecodeError::Storage(format!("{} has no file name", source.display())))?;
        let copy = dir.path().join(file_name);
        std::fs::copy(source, &copy)?;

        for suffix in ["-wal", "-shm"] {
            let mut sidecar = source.as_os_str().to_owned();
            sidecar.push(suffix);
            let mut target = copy.as_os_str().to_owned();
            target.push(suffix);
            if let Err(e) = std::fs::copy(&sidecar, &target) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!("Skipping sidecar {:?}: {}", sidecar, e);
                }
            }
        }

        // The copy is private, so open it read-write; SQLite may need to
        // replay a copied WAL.
        let conn = Connection::open(&copy)?;
        Ok(Self { conn, _dir: dir })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// True when `bytes` starts with the SQLite file header.
pub fn is_sqlite(bytes: &[u8]) -> bool {
    bytes.starts_with(b"SQLite format 3\0")
}
