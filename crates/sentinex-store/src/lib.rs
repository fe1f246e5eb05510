//! sentinex-store: SQLite persistence for Sentinex.
//!
//! Three tables back the system: the personnel registry (one row per badge,
//! carrying the last recorded status), the geofence set (kept in snapshot
//! order), and the append-only attendance log. All access goes through a
//! single `tokio-rusqlite` connection thread.

mod fences;
mod log;
mod migrations;
mod personnel;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use std::path::Path;
use thiserror::Error;

pub use log::LogEntry;
pub use migrations::MigrationError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("schema migration failed: {0}")]
    Migration(#[from] MigrationError),
    #[error("failed to create data directory {path}: {source}")]
    DataDir {
        path: String,
        source: std::io::Error,
    },
    #[error("badge {0} is not registered")]
    UnknownBadge(String),
    #[error("badge {0} is already registered")]
    AlreadyRegistered(String),
}

/// Handle to the attendance database. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    conn: tokio_rusqlite::Connection,
}

impl Store {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::DataDir {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = tokio_rusqlite::Connection::open(path).await?;
        let store = Self::migrate(conn).await?;
        tracing::info!(path = %path.display(), "attendance store opened");
        Ok(store)
    }

    /// Private, throwaway database.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::migrate(conn).await
    }

    async fn migrate(conn: tokio_rusqlite::Connection) -> Result<Self, StoreError> {
        conn.call(|conn| Ok(migrations::run_migrations(conn)))
            .await??;
        Ok(Self { conn })
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}
