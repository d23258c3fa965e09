//! SQLite cache database access.
//!
//! The database is always opened read-only. Schema expected:
//! `files(id BLOB|TEXT, content BLOB NULL)`.

use std::path::Path;
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};

use crate::{Result, ScanError};

/// Busy timeout for the pre-health check.
const PRECHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Busy timeout for the full row scan.
const SCAN_TIMEOUT: Duration = Duration::from_secs(10);

fn open_read_only(path: &Path, timeout: Duration) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(timeout)?;
    Ok(conn)
}

fn has_files_table(conn: &Connection) -> Result<bool> {
    let name: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type='table' AND name='files'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(name.is_some())
}

/// Pre-health check run before every database scan: open with a short
/// timeout, verify the `files` table exists, and prove a query succeeds.
/// Any failure means the caller should fall back to a flat directory.
pub(crate) fn precheck(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(ScanError::CachePathUnavailable(path.to_path_buf()));
    }
    let conn = open_read_only(path, PRECHECK_TIMEOUT)?;
    if !has_files_table(&conn)? {
        return Err(ScanError::MissingFilesTable);
    }
    let _count: i64 = conn.query_row("SELECT COUNT(*) FROM files LIMIT 1", [], |row| row.get(0))?;
    Ok(())
}

/// A row pulled from the `files` table.
pub(crate) struct DbRow {
    pub identity: String,
    pub content: Option<Vec<u8>>,
}

/// Iterate every `files` row, yielding the lowercase hex identity and any
/// inline content. Rows with a NULL id are skipped; a row-level decode
/// failure is logged and skipped without aborting the scan.
pub(crate) fn scan_rows(path: &Path, mut emit: impl FnMut(DbRow)) -> Result<()> {
    let conn = open_read_only(path, SCAN_TIMEOUT)?;
    if !has_files_table(&conn)? {
        return Err(ScanError::MissingFilesTable);
    }

    let mut stmt = conn.prepare("SELECT id, content FROM files")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let identity = match row.get_ref(0)? {
            ValueRef::Blob(bytes) => hex::encode(bytes),
            ValueRef::Text(text) => String::from_utf8_lossy(text).to_lowercase(),
            ValueRef::Integer(n) => n.to_string(),
            ValueRef::Null | ValueRef::Real(_) => {
                tracing::debug!("skipping files row with unusable id");
                continue;
            }
        };

        let content: Option<Vec<u8>> = match row.get(1) {
            Ok(content) => content,
            Err(err) => {
                tracing::error!(%identity, %err, "failed to read row content, skipping");
                continue;
            }
        };

        emit(DbRow { identity, content });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_db(path: &Path, rows: &[(&[u8], Option<&[u8]>)]) {
        let conn = Connection::open(path).unwrap();
        conn.execute("CREATE TABLE files (id BLOB, content BLOB)", [])
            .unwrap();
        for (id, content) in rows {
            conn.execute(
                "INSERT INTO files (id, content) VALUES (?1, ?2)",
                rusqlite::params![id, content],
            )
            .unwrap();
        }
    }

    #[test]
    fn precheck_accepts_healthy_database() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("cache.db");
        create_db(&db, &[(b"\xab\xcd", Some(b"data"))]);
        precheck(&db).expect("healthy database should pass");
    }

    #[test]
    fn precheck_rejects_missing_table() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("cache.db");
        let conn = Connection::open(&db).unwrap();
        conn.execute("CREATE TABLE not_files (id BLOB)", []).unwrap();
        drop(conn);

        let err = precheck(&db).unwrap_err();
        assert!(matches!(err, ScanError::MissingFilesTable));
    }

    #[test]
    fn precheck_rejects_garbage_file() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("cache.db");
        std::fs::write(&db, b"definitely not sqlite").unwrap();
        assert!(precheck(&db).is_err());
    }

    #[test]
    fn scan_yields_hex_identities_and_content() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("cache.db");
        create_db(&db, &[(b"\xab\xcd", Some(b"inline")), (b"\x01\x02", None)]);

        let mut seen = Vec::new();
        scan_rows(&db, |row| seen.push((row.identity, row.content))).unwrap();

        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "abcd");
        assert_eq!(seen[0].1.as_deref(), Some(b"inline".as_slice()));
        assert_eq!(seen[1].0, "0102");
        assert!(seen[1].1.is_none());
    }
}
