use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;
use rusqlite::{params, Connection, OpenFlags, Row};
use serde::{Deserialize, Serialize};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS requests (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  method TEXT NOT NULL,
  headers TEXT NOT NULL,
  query TEXT NOT NULL,
  body TEXT NOT NULL,
  timestamp DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

/// A captured webhook delivery as it was persisted.
///
/// `headers`, `query` and `body` hold the serialized text exactly as it was
/// written; the store never looks inside them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedRequest {
    pub id: i64,
    pub method: String,
    pub headers: String,
    pub query: String,
    pub body: String,
    pub timestamp: String,
}

/// The caller-supplied columns of a row about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequest {
    pub method: String,
    pub headers: String,
    pub query: String,
    pub body: String,
}

/// Append-only SQLite log of captured requests.
#[derive(Debug, Clone)]
pub struct Store {
    db_path: PathBuf,
}

impl Store {
    /// Opens (creating if needed) the database at `db_path` and ensures the
    /// schema exists.
    pub fn open(db_path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create storage dir {}", parent.display()))?;
        }

        let store = Self { db_path };
        store.initialize()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Idempotent; safe to run against a database that already holds rows.
    pub fn initialize(&self) -> anyhow::Result<()> {
        let conn = open_connection(&self.db_path)?;
        conn.execute_batch(SCHEMA)
            .context("create requests table")?;
        Ok(())
    }

    // The blocking tasks below keep running if the awaiting request is
    // dropped, so an issued write always completes.

    pub async fn insert(&self, request: NewRequest) -> anyhow::Result<i64> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || insert_blocking(&db_path, request))
            .await
            .context("join insert task")?
    }

    /// Every stored request, newest (highest id) first.
    pub async fn list_all(&self) -> anyhow::Result<Vec<CapturedRequest>> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || list_all_blocking(&db_path))
            .await
            .context("join list_all task")?
    }

    /// Deletes every row. The id sequence is left untouched.
    pub async fn clear_all(&self) -> anyhow::Result<usize> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || clear_all_blocking(&db_path))
            .await
            .context("join clear_all task")?
    }
}

fn open_connection(path: &Path) -> anyhow::Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags)
        .with_context(|| format!("open sqlite {}", path.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .context("set PRAGMA journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("set PRAGMA synchronous=NORMAL")?;
    conn.busy_timeout(Duration::from_secs(5))
        .context("set sqlite busy_timeout")?;

    Ok(conn)
}

fn insert_blocking(path: &Path, request: NewRequest) -> anyhow::Result<i64> {
    let conn = open_connection(path)?;
    conn.execute(
        "INSERT INTO requests (method, headers, query, body) VALUES (?1, ?2, ?3, ?4)",
        params![request.method, request.headers, request.query, request.body],
    )
    .context("insert captured request")?;
    Ok(conn.last_insert_rowid())
}

fn list_all_blocking(path: &Path) -> anyhow::Result<Vec<CapturedRequest>> {
    let conn = open_connection(path)?;
    let mut stmt = conn
        .prepare(
            "SELECT id, method, headers, query, body, timestamp FROM requests ORDER BY id DESC",
        )
        .context("prepare list requests")?;
    let rows = stmt
        .query_map([], row_to_request)
        .context("query requests")?;

    let mut requests = Vec::new();
    for row in rows {
        requests.push(row.context("read request row")?);
    }
    Ok(requests)
}

fn clear_all_blocking(path: &Path) -> anyhow::Result<usize> {
    let conn = open_connection(path)?;
    conn.execute("DELETE FROM requests", [])
        .context("delete requests")
}

fn row_to_request(row: &Row<'_>) -> rusqlite::Result<CapturedRequest> {
    Ok(CapturedRequest {
        id: row.get(0)?,
        method: row.get(1)?,
        headers: row.get(2)?,
        query: row.get(3)?,
        body: row.get(4)?,
        timestamp: row.get(5)?,
    })
}
