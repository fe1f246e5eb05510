use rusqlite::{Connection, Transaction};

const CURRENT_SCHEMA_VERSION: i32 = 2;

const SCHEMA_V1: &str = "
CREATE TABLE personnel (
    badge_id        TEXT PRIMARY KEY NOT NULL,
    name            TEXT,
    status          TEXT,
    last_timestamp  TEXT,
    last_latitude   REAL,
    last_longitude  REAL,
    created_at      TEXT NOT NULL
);

CREATE TABLE geofences (
    position        INTEGER PRIMARY KEY,
    id              TEXT NOT NULL UNIQUE,
    latitude        REAL NOT NULL,
    longitude       REAL NOT NULL,
    radius_meters   REAL,
    address         TEXT NOT NULL,
    deployment      TEXT NOT NULL
);

CREATE TABLE attendance_log (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id        TEXT NOT NULL UNIQUE,
    badge_id        TEXT NOT NULL REFERENCES personnel(badge_id),
    status          TEXT NOT NULL,
    timestamp       TEXT NOT NULL,
    latitude        REAL,
    longitude       REAL,
    address         TEXT,
    deployment      TEXT,
    subject_name    TEXT
);
";

const SCHEMA_V2: &str = "
ALTER TABLE attendance_log ADD COLUMN selfie_digest TEXT;
CREATE INDEX idx_attendance_log_badge ON attendance_log (badge_id, seq);
";

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("database schema version {found} is newer than supported version {supported}")]
    TooNew { found: i32, supported: i32 },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Bring the schema up to [`CURRENT_SCHEMA_VERSION`] inside one transaction.
pub fn run_migrations(conn: &mut Connection) -> Result<(), MigrationError> {
    conn.pragma_update(None, "foreign_keys", true)?;

    let mut version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version > CURRENT_SCHEMA_VERSION {
        return Err(MigrationError::TooNew {
            found: version,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }
    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    while version < CURRENT_SCHEMA_VERSION {
        let next = version + 1;
        apply_migration(&tx, next)?;
        tracing::info!(version = next, "applied schema migration");
        version = next;
    }
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
    tx.commit()?;

    Ok(())
}

fn apply_migration(tx: &Transaction<'_>, version: i32) -> rusqlite::Result<()> {
    match version {
        1 => tx.execute_batch(SCHEMA_V1),
        2 => tx.execute_batch(SCHEMA_V2),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database_reaches_current_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        let v: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(v, CURRENT_SCHEMA_VERSION);

        // Idempotent
        run_migrations(&mut conn).unwrap();
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION + 1)
            .unwrap();
        let err = run_migrations(&mut conn).unwrap_err();
        assert!(matches!(err, MigrationError::TooNew { .. }));
    }
}
