//! warden-store — SQLite persistence for users and the access log.
//!
//! One connection behind a mutex; the engine thread and the dashboard share
//! a single [`Store`] through an `Arc`.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use warden_core::ports::{AccessEventKind, EventSink, SinkError};

/// Timestamp format written to `created_at`, `last_seen` and `timestamp`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE NOT NULL,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        last_seen TIMESTAMP,
        access_count INTEGER DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS access_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        event_type TEXT NOT NULL,
        person_name TEXT,
        details TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_access_logs_person ON access_logs(person_name);
";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    #[error("store mutex poisoned")]
    Poisoned,
}

/// An enrolled user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub last_seen: Option<String>,
    pub access_count: i64,
}

impl UserRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            last_seen: row.get(3)?,
            access_count: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
        })
    }
}

/// One row of the access log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessLog {
    pub id: i64,
    pub timestamp: String,
    pub event_type: String,
    pub person_name: Option<String>,
    pub details: Option<String>,
}

impl AccessLog {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            event_type: row.get(2)?,
            person_name: row.get(3)?,
            details: row.get(4)?,
        })
    }
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path`, creating parent directories
    /// and the schema as needed.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        let store = Self::with_connection(conn)?;
        tracing::info!(path = %path.display(), "opened access store");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Insert a user. Returns `false` if the name is already taken.
    pub fn add_user(&self, name: &str) -> Result<bool, StoreError> {
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO users (name, created_at) VALUES (?1, ?2)",
            params![name, now()],
        )?;
        if inserted == 0 {
            tracing::debug!(name, "user already present");
        }
        Ok(inserted > 0)
    }

    /// Remove a user. Returns whether a row was deleted.
    pub fn delete_user(&self, name: &str) -> Result<bool, StoreError> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM users WHERE name = ?1", params![name])?;
        Ok(deleted > 0)
    }

    /// All users, ordered by name.
    pub fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, created_at, last_seen, access_count FROM users ORDER BY name",
        )?;
        let users = stmt
            .query_map([], UserRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn get_user(&self, name: &str) -> Result<Option<UserRecord>, StoreError> {
        let user = self
            .conn()?
            .query_row(
                "SELECT id, name, created_at, last_seen, access_count FROM users WHERE name = ?1",
                params![name],
                UserRecord::from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Stamp `last_seen` and increment `access_count`. Unknown names are a
    /// no-op.
    pub fn touch_user(&self, name: &str) -> Result<(), StoreError> {
        self.conn()?.execute(
            "UPDATE users SET last_seen = ?1, access_count = COALESCE(access_count, 0) + 1 \
             WHERE name = ?2",
            params![now(), name],
        )?;
        Ok(())
    }

    pub fn record_access_event(
        &self,
        kind: AccessEventKind,
        person: Option<&str>,
        details: Option<&str>,
    ) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO access_logs (timestamp, event_type, person_name, details) \
             VALUES (?1, ?2, ?3, ?4)",
            params![now(), kind.as_str(), person, details],
        )?;
        Ok(())
    }

    /// Insert a log row with an explicit timestamp and free-form event type,
    /// for importing records written before the store existed.
    pub fn import_access_event(
        &self,
        timestamp: &str,
        event_type: &str,
        person: Option<&str>,
    ) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO access_logs (timestamp, event_type, person_name) VALUES (?1, ?2, ?3)",
            params![timestamp, event_type, person],
        )?;
        Ok(())
    }

    /// Most recent `limit` log rows, newest first.
    pub fn recent_logs(&self, limit: usize) -> Result<Vec<AccessLog>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_type, person_name, details FROM access_logs \
             ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let logs = stmt
            .query_map(params![limit], AccessLog::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    /// Every log row naming `name`, newest first.
    pub fn user_logs(&self, name: &str) -> Result<Vec<AccessLog>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_type, person_name, details FROM access_logs \
             WHERE person_name = ?1 ORDER BY timestamp DESC, id DESC",
        )?;
        let logs = stmt
            .query_map(params![name], AccessLog::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }
}

impl EventSink for Store {
    fn record(
        &self,
        kind: AccessEventKind,
        person: Option<&str>,
        details: Option<&str>,
    ) -> Result<(), SinkError> {
        self.record_access_event(kind, person, details)
            .map_err(|e| SinkError(e.to_string()))
    }

    fn touch_user(&self, name: &str) -> Result<(), SinkError> {
        Store::touch_user(self, name).map_err(|e| SinkError(e.to_string()))
    }
}

fn now() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}
