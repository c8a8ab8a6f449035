// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sync cursor tracking
//!
//! Remembers, per source, the timestamp up to which data has been
//! replicated so a restart resumes where the previous run stopped.

use crate::retry::RetryPolicy;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

/// File name of the cursor database inside the data directory.
pub const CURSOR_DB_FILE: &str = "tracking.db";

/// Cursor store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open cursor database at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cursor schema could not be created after {attempts} attempts: {source}")]
    Init {
        attempts: u32,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cursor database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable mapping from source name to last synced timestamp (Unix seconds).
pub trait CursorStore {
    /// Create the backing schema if it does not exist yet.
    fn initialize(&self) -> Result<(), StoreError>;

    /// Last synced timestamp, or `0.0` for a source never recorded.
    fn get(&self, source: &str) -> Result<f64, StoreError>;

    /// Insert or overwrite the timestamp for a source.
    fn set(&self, source: &str, sync_time: f64) -> Result<(), StoreError>;
}

/// SQLite cursor store
///
/// # Schema
///
/// ```sql
/// CREATE TABLE db_state (
///     id INTEGER PRIMARY KEY,
///     db_name TEXT NOT NULL UNIQUE,
///     sync_time REAL NOT NULL
/// );
/// ```
pub struct SqliteCursorStore {
    conn: Mutex<Connection>,
    retry: RetryPolicy,
}

impl SqliteCursorStore {
    /// Open (or create) `tracking.db` inside `dir`, creating the directory.
    pub fn open_dir(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        Self::open(&dir.join(CURSOR_DB_FILE))
    }

    /// Open a file-based cursor database. The schema is not touched until
    /// [`CursorStore::initialize`] is called.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            conn: Mutex::new(conn),
            retry: RetryPolicy::default(),
        })
    }

    /// In-memory cursor database (for testing).
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            retry: RetryPolicy::immediate(1),
        })
    }

    /// Override the retry policy used by `initialize`.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn create_schema(&self) -> rusqlite::Result<()> {
        self.conn().execute(
            "CREATE TABLE IF NOT EXISTS db_state (
                id INTEGER PRIMARY KEY,
                db_name TEXT NOT NULL UNIQUE,
                sync_time REAL NOT NULL
            )",
            [],
        )?;
        Ok(())
    }
}

impl CursorStore for SqliteCursorStore {
    fn initialize(&self) -> Result<(), StoreError> {
        self.retry
            .run(|_| true, |_| self.create_schema())
            .map_err(|source| StoreError::Init {
                attempts: self.retry.max_attempts,
                source,
            })?;

        tracing::debug!("Cursor schema ready");
        Ok(())
    }

    fn get(&self, source: &str) -> Result<f64, StoreError> {
        let sync_time = self
            .conn()
            .query_row(
                "SELECT sync_time FROM db_state WHERE db_name = ?1",
                [source],
                |row| row.get::<_, f64>(0),
            )
            .optional()?;

        Ok(sync_time.unwrap_or(0.0))
    }

    fn set(&self, source: &str, sync_time: f64) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO db_state (db_name, sync_time) VALUES (?1, ?2)
             ON CONFLICT(db_name) DO UPDATE SET sync_time = excluded.sync_time",
            params![source, sync_time],
        )?;
        Ok(())
    }
}
