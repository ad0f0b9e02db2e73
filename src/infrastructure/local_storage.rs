//! Local SQLite storage for persisted store state.
//!
//! Stores opt into persistence by writing a JSON snapshot under a fixed key.
//! Only the session slice does so today (key [`SESSION_STATE_KEY`]).

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::{AppError, Result};

/// Storage key of the persisted session slice.
pub const SESSION_STATE_KEY: &str = "jarvis-auth";

/// Key/value repository for persisted state using SQLite.
pub struct LocalStorage {
    conn: Mutex<Connection>,
}

impl LocalStorage {
    /// Opens or creates the local storage database.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or schema creation fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::io("Failed to create storage directory", e))?;
        }

        let conn = Connection::open(path).map_err(AppError::storage)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(AppError::storage)?;

        Self::with_connection(conn)
    }

    /// Opens a throwaway in-memory database.
    ///
    /// # Errors
    /// Returns error if schema creation fails.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(AppError::storage)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS persisted_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )
        .map_err(AppError::storage)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the raw JSON stored under `key`.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn get_raw(&self, key: &str) -> Result<Option<String>> {
        self.conn()
            .query_row(
                "SELECT value FROM persisted_state WHERE key = ?1",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(AppError::storage)
    }

    /// Read and decode the value stored under `key`.
    ///
    /// # Errors
    /// Returns error if the query fails or the stored JSON does not decode.
    pub fn get_state<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get_raw(key)?
            .map(|raw| serde_json::from_str(&raw).map_err(AppError::json_parse))
            .transpose()
    }

    /// Encode and store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    /// Returns error if encoding or the write fails.
    pub fn put_state<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value).map_err(AppError::json_parse)?;
        self.conn()
            .execute(
                r"
            INSERT INTO persisted_state (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = datetime('now')
            ",
                params![key, raw],
            )
            .map_err(AppError::storage)?;

        tracing::debug!(key, "Persisted state written");
        Ok(())
    }

    /// Delete the value stored under `key`. Missing keys are not an error.
    ///
    /// # Errors
    /// Returns error if the write fails.
    pub fn delete_state(&self, key: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM persisted_state WHERE key = ?1", [key])
            .map_err(AppError::storage)?;
        Ok(())
    }

    /// Number of persisted keys.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn key_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM persisted_state", [], |row| row.get(0))
            .map_err(AppError::storage)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
