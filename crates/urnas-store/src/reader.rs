//! Read-only access to a published snapshot.

use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use duckdb::{AccessMode, Config, Connection, ToSql};

use crate::StoreError;
use crate::queries::{self, RoundCount, StoreSummary};

/// A reader on a snapshot file. Never opens the writer's primary file, so
/// any number of these can run beside a live harvest.
pub struct SnapshotReader {
    conn: Connection,
    path: PathBuf,
}

impl SnapshotReader {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "snapshot not published"),
            });
        }
        let config = Config::default().access_mode(AccessMode::ReadOnly)?;
        let conn = Connection::open_with_flags(path, config)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn section_count(&self) -> Result<usize, StoreError> {
        queries::count_rows(&self.conn, "sections", None)
    }

    pub fn count_where(&self, predicate: &str) -> Result<usize, StoreError> {
        queries::count_rows(&self.conn, "sections", Some(predicate))
    }

    pub fn summary(&self) -> Result<StoreSummary, StoreError> {
        queries::summary(&self.conn)
    }

    pub fn round_counts(&self) -> Result<Vec<RoundCount>, StoreError> {
        queries::round_counts(&self.conn)
    }

    pub fn query(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<RecordBatch>, StoreError> {
        queries::query(&self.conn, sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SnapshotStore;

    #[test]
    fn missing_snapshot_is_an_io_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = SnapshotReader::open(&tmp.path().join("none.duckdb")).err().unwrap();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[test]
    fn reader_rejects_writes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = SnapshotStore::open(&tmp.path().join("primary.duckdb")).unwrap();
        let dest = tmp.path().join("live.duckdb");
        store.snapshot(&dest).unwrap();

        let reader = SnapshotReader::open(&dest).unwrap();
        assert_eq!(reader.summary().unwrap(), StoreSummary::default());
        assert!(reader.query("DELETE FROM sections", &[]).is_err());
    }
}
