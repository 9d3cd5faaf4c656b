//! Lease repository for the `translation_jobs` table.
//!
//! Every state change is a single conditional `UPDATE`, so the row itself is
//! the compare-and-swap cell. That holds across connections and processes.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;
use crate::clock::parse_timestamp;
use crate::model::{JobLease, LeaseState};

/// A raw lease row from the database.
#[derive(Debug, Clone)]
pub struct LeaseRow {
    pub translation_id: String,
    pub state: String,
    pub attempts: i64,
    pub lease_until: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl LeaseRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            translation_id: row.get("translation_id")?,
            state: row.get("state")?,
            attempts: row.get("attempts")?,
            lease_until: row.get("lease_until")?,
            last_error: row.get("last_error")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn into_lease(self) -> Result<JobLease, DatabaseError> {
        let state = self
            .state
            .parse::<LeaseState>()
            .map_err(|_| DatabaseError::InvalidValue {
                column: "translation_jobs.state",
                value: self.state.clone(),
            })?;
        Ok(JobLease {
            translation_id: self.translation_id,
            state,
            attempts: self.attempts.max(0) as u32,
            lease_until: self.lease_until.as_deref().map(parse_timestamp),
            last_error: self.last_error,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

// Shared by claim and the recovery query so the two can never disagree.
const CLAIMABLE: &str = "(state = 'pending'
       OR (state = 'leased' AND (lease_until IS NULL OR lease_until < :now)))
  AND (:max_attempts IS NULL OR attempts < :max_attempts)";

pub fn insert_pending(conn: &Connection, translation_id: &str, now: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO translation_jobs (translation_id, state, attempts, lease_until, last_error, created_at, updated_at)
         VALUES (?1, 'pending', 0, NULL, NULL, ?2, ?2)",
        params![translation_id, now],
    )?;
    Ok(())
}

pub fn find(conn: &Connection, translation_id: &str) -> Result<Option<LeaseRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT translation_id, state, attempts, lease_until, last_error, created_at, updated_at
             FROM translation_jobs WHERE translation_id = ?1",
            params![translation_id],
            LeaseRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Takes the lease if the job is claimable at `now`. Returns whether this
/// caller won.
pub fn claim(
    conn: &Connection,
    translation_id: &str,
    now: &str,
    lease_until: &str,
    max_attempts: Option<u32>,
) -> Result<bool, DatabaseError> {
    let sql = format!(
        "UPDATE translation_jobs
         SET state = 'leased',
             attempts = attempts + 1,
             lease_until = :lease_until,
             last_error = NULL,
             updated_at = :now
         WHERE translation_id = :id
           AND {}",
        CLAIMABLE
    );
    let affected = conn.execute(
        &sql,
        rusqlite::named_params! {
            ":lease_until": lease_until,
            ":now": now,
            ":id": translation_id,
            ":max_attempts": max_attempts,
        },
    )?;
    Ok(affected > 0)
}

/// Pushes out the expiry of a lease that is still held.
pub fn renew(
    conn: &Connection,
    translation_id: &str,
    now: &str,
    lease_until: &str,
) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "UPDATE translation_jobs
         SET lease_until = ?3, updated_at = ?2
         WHERE translation_id = ?1 AND state = 'leased'",
        params![translation_id, now, lease_until],
    )?;
    Ok(affected > 0)
}

/// Ids a recovery scan should try to claim, oldest first.
pub fn restartable_ids(
    conn: &Connection,
    now: &str,
    max_attempts: Option<u32>,
) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT translation_id FROM translation_jobs
         WHERE {}
         ORDER BY created_at ASC, translation_id ASC",
        CLAIMABLE
    ))?;
    let ids = stmt
        .query_map(
            rusqlite::named_params! {
                ":now": now,
                ":max_attempts": max_attempts,
            },
            |r| r.get::<_, String>(0),
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub fn mark_done(conn: &Connection, translation_id: &str, now: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE translation_jobs
         SET state = 'done', lease_until = NULL, last_error = NULL, updated_at = ?2
         WHERE translation_id = ?1",
        params![translation_id, now],
    )?;
    Ok(())
}

pub fn mark_failed(
    conn: &Connection,
    translation_id: &str,
    message: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE translation_jobs
         SET state = 'failed', lease_until = NULL, last_error = ?2, updated_at = ?3
         WHERE translation_id = ?1",
        params![translation_id, message, now],
    )?;
    Ok(())
}

pub fn reset_pending(conn: &Connection, translation_id: &str, now: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE translation_jobs
         SET state = 'pending', lease_until = NULL, last_error = NULL, updated_at = ?2
         WHERE translation_id = ?1",
        params![translation_id, now],
    )?;
    Ok(())
}
