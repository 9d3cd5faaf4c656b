//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies pending
//! ones in order, each inside its own transaction.

use rusqlite::Connection;

use super::error::DatabaseError;

/// A single migration definition.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_translations_table",
        sql: include_str!("sql/001_create_translations.sql"),
    },
    Migration {
        version: 2,
        description: "create_translation_jobs_table",
        sql: include_str!("sql/002_create_translation_jobs.sql"),
    },
    Migration {
        version: 3,
        description: "create_translation_paragraphs_table",
        sql: include_str!("sql/003_create_translation_paragraphs.sql"),
    },
    Migration {
        version: 4,
        description: "create_translation_segments_table",
        sql: include_str!("sql/004_create_translation_segments.sql"),
    },
    Migration {
        version: 5,
        description: "add_planned_segments_to_paragraphs",
        sql: include_str!("sql/005_add_planned_segments.sql"),
    },
];

fn apply(conn: &Connection, migration: &Migration) -> Result<(), rusqlite::Error> {
    let applied: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM _migrations WHERE version = ?1)",
        [migration.version],
        |r| r.get(0),
    )?;
    if applied {
        return Ok(());
    }

    log::info!(
        "Running migration v{}: {}",
        migration.version,
        migration.description
    );
    conn.execute_batch(migration.sql)?;
    conn.execute(
        "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
        rusqlite::params![migration.version, migration.description],
    )?;
    Ok(())
}

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        // Another process may have applied it since the version was read,
        // so the check is repeated under the write lock.
        conn.execute_batch("BEGIN IMMEDIATE;")?;
        if let Err(e) = apply(conn, migration) {
            let _ = conn.execute_batch("ROLLBACK;");
            return Err(DatabaseError::Migration {
                version: migration.version,
                reason: e.to_string(),
            });
        }
        conn.execute_batch("COMMIT;")?;
    }

    Ok(())
}
