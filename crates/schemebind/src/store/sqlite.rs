// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 schemebind contributors

//! SQLite binding store (relational driver).
//!
//! One row per scheme with a version column rewritten on every successful
//! write; update and remove are single conditional statements, so the
//! token check and the write are one indivisible step.
//!
//! Thread-safe via internal Mutex (SQLite `Connection` is not Sync).
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE bindings (
//!     scheme TEXT PRIMARY KEY,
//!     display_name TEXT NOT NULL,
//!     handler_type TEXT NOT NULL,
//!     options TEXT NOT NULL,
//!     version TEXT NOT NULL
//! );
//! ```

use crate::binding::{BindingRecord, ConcurrencyToken};
use crate::error::{BindingError, Result};
use crate::store::{check_submit, require_text_token, BindingStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct RowParts {
    scheme: String,
    display_name: String,
    handler_type: String,
    options_text: String,
    version: String,
}

/// Relational binding store backed by SQLite.
pub struct SqliteBindingStore {
    conn: Mutex<Connection>,
}

impl SqliteBindingStore {
    /// Open (or create) a file-based store
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| {
            BindingError::StoreUnavailable(format!("failed to open sqlite db at {path}: {e}"))
        })?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS bindings (
                scheme TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                handler_type TEXT NOT NULL,
                options TEXT NOT NULL,
                version TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    // Column extraction only; the options payload is parsed afterwards so
    // a corrupt column surfaces as a Serialization error, not a silent null.
    fn row_to_parts(row: &rusqlite::Row) -> rusqlite::Result<RowParts> {
        Ok(RowParts {
            scheme: row.get(0)?,
            display_name: row.get(1)?,
            handler_type: row.get(2)?,
            options_text: row.get(3)?,
            version: row.get(4)?,
        })
    }

    fn parts_to_record(parts: RowParts) -> Result<BindingRecord> {
        let options = serde_json::from_str(&parts.options_text).map_err(|e| {
            BindingError::Serialization(format!(
                "malformed options for '{}': {e}",
                parts.scheme
            ))
        })?;
        Ok(BindingRecord {
            scheme: parts.scheme,
            display_name: parts.display_name,
            handler_type: parts.handler_type,
            options,
            token: ConcurrencyToken::Text(parts.version),
        })
    }

    fn scheme_exists(conn: &Connection, scheme: &str) -> Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM bindings WHERE scheme = ?1)",
            [scheme],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}

#[async_trait]
impl BindingStore for SqliteBindingStore {
    async fn add(
        &self,
        record: &BindingRecord,
        cancel: &CancellationToken,
    ) -> Result<ConcurrencyToken> {
        check_submit(&record.scheme, cancel)?;

        let version = Uuid::new_v4().to_string();
        let options_text = serde_json::to_string(&record.options)?;

        let conn = self.conn.lock();
        match conn.execute(
            "INSERT INTO bindings (scheme, display_name, handler_type, options, version)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.scheme,
                record.display_name,
                record.handler_type,
                options_text,
                version,
            ],
        ) {
            Ok(_) => Ok(ConcurrencyToken::Text(version)),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(BindingError::DuplicateScheme(record.scheme.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(
        &self,
        record: &BindingRecord,
        cancel: &CancellationToken,
    ) -> Result<ConcurrencyToken> {
        check_submit(&record.scheme, cancel)?;
        let caller_version = require_text_token(&record.token, &record.scheme)?;

        let new_version = Uuid::new_v4().to_string();
        let options_text = serde_json::to_string(&record.options)?;

        let conn = self.conn.lock();
        let affected = conn.execute(
            "UPDATE bindings
             SET display_name = ?1, handler_type = ?2, options = ?3, version = ?4
             WHERE scheme = ?5 AND version = ?6",
            params![
                record.display_name,
                record.handler_type,
                options_text,
                new_version,
                record.scheme,
                caller_version,
            ],
        )?;

        if affected == 0 {
            if Self::scheme_exists(&conn, &record.scheme)? {
                return Err(BindingError::ConcurrencyConflict(record.scheme.clone()));
            }
            return Err(BindingError::NotFound(record.scheme.clone()));
        }

        Ok(ConcurrencyToken::Text(new_version))
    }

    async fn remove(
        &self,
        scheme: &str,
        token: &ConcurrencyToken,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check_submit(scheme, cancel)?;
        let caller_version = require_text_token(token, scheme)?;

        let conn = self.conn.lock();
        let affected = conn.execute(
            "DELETE FROM bindings WHERE scheme = ?1 AND version = ?2",
            params![scheme, caller_version],
        )?;

        if affected == 0 {
            if Self::scheme_exists(&conn, scheme)? {
                return Err(BindingError::ConcurrencyConflict(scheme.to_string()));
            }
            return Err(BindingError::NotFound(scheme.to_string()));
        }

        Ok(())
    }

    async fn find_by_scheme(
        &self,
        scheme: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<BindingRecord>> {
        check_submit(scheme, cancel)?;

        let conn = self.conn.lock();
        let parts = conn
            .query_row(
                "SELECT scheme, display_name, handler_type, options, version
                 FROM bindings WHERE scheme = ?1",
                [scheme],
                Self::row_to_parts,
            )
            .optional()?;

        parts.map(Self::parts_to_record).transpose()
    }

    async fn list_all(&self, cancel: &CancellationToken) -> Result<Vec<BindingRecord>> {
        if cancel.is_cancelled() {
            return Err(BindingError::Cancelled);
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT scheme, display_name, handler_type, options, version FROM bindings",
        )?;
        let parts = stmt
            .query_map([], Self::row_to_parts)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        parts.into_iter().map(Self::parts_to_record).collect()
    }
}
