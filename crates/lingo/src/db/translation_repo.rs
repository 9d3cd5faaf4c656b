//! Translation repository: row access for the `translations` table.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;
use crate::clock::parse_timestamp;
use crate::model::{Translation, TranslationStatus};

/// A raw translation row from the database.
#[derive(Debug, Clone)]
pub struct TranslationRow {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    pub status: String,
    pub source_type: String,
    pub input_text: String,
    pub full_translation: Option<String>,
    pub error_message: Option<String>,
    pub progress: i64,
    pub total: i64,
}

impl TranslationRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            status: row.get("status")?,
            source_type: row.get("source_type")?,
            input_text: row.get("input_text")?,
            full_translation: row.get("full_translation")?,
            error_message: row.get("error_message")?,
            progress: row.get("progress")?,
            total: row.get("total")?,
        })
    }

    /// Converts to the domain type without paragraphs.
    pub fn into_translation(self) -> Result<Translation, DatabaseError> {
        let status = self
            .status
            .parse::<TranslationStatus>()
            .map_err(|_| DatabaseError::InvalidValue {
                column: "translations.status",
                value: self.status.clone(),
            })?;
        Ok(Translation {
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
            id: self.id,
            status,
            source_type: self.source_type,
            input_text: self.input_text,
            full_translation: self.full_translation,
            error_message: self.error_message,
            progress: self.progress.max(0) as usize,
            total: self.total.max(0) as usize,
            paragraphs: Vec::new(),
        })
    }
}

/// Query filter parameters for translation listing.
#[derive(Debug, Default, Clone)]
pub struct TranslationFilter {
    pub status: Option<TranslationStatus>,
    pub limit: u64,
    pub offset: u64,
}

const COLUMNS: &str = "id, created_at, updated_at, status, source_type, input_text,
     full_translation, error_message, progress, total";

/// Inserts a new translation row.
pub fn insert(conn: &Connection, row: &TranslationRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO translations (id, created_at, updated_at, status, source_type, input_text,
         full_translation, error_message, progress, total)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            row.id,
            row.created_at,
            row.updated_at,
            row.status,
            row.source_type,
            row.input_text,
            row.full_translation,
            row.error_message,
            row.progress,
            row.total,
        ],
    )?;
    Ok(())
}

/// Finds a translation by its ID.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<TranslationRow>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM translations WHERE id = ?1", COLUMNS),
            params![id],
            TranslationRow::from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn exists(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM translations WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Queries translations newest first, returning (rows, total_count).
pub fn query(
    conn: &Connection,
    filter: &TranslationFilter,
) -> Result<(Vec<TranslationRow>, u64), DatabaseError> {
    let status = filter.status.map(|s| s.as_str());
    let limit = filter.limit as i64;
    let offset = filter.offset as i64;

    let total: u64 = conn.query_row(
        "SELECT COUNT(*) FROM translations WHERE (?1 IS NULL OR status = ?1)",
        params![status],
        |r| r.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM translations
         WHERE (?1 IS NULL OR status = ?1)
         ORDER BY created_at DESC, id DESC
         LIMIT ?2 OFFSET ?3",
        COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![status, limit, offset], TranslationRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((rows, total))
}

/// Deletes a translation; child rows go with it through `ON DELETE CASCADE`.
pub fn delete(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let affected = conn.execute("DELETE FROM translations WHERE id = ?1", params![id])?;
    Ok(affected > 0)
}

/// Returns `(progress, total)`.
pub fn progress_state(conn: &Connection, id: &str) -> Result<Option<(i64, i64)>, DatabaseError> {
    let state = conn
        .query_row(
            "SELECT progress, total FROM translations WHERE id = ?1",
            params![id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    Ok(state)
}

pub fn update_progress(
    conn: &Connection,
    id: &str,
    progress: i64,
    total: i64,
    now: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE translations SET progress = ?2, total = ?3, updated_at = ?4 WHERE id = ?1",
        params![id, progress, total, now],
    )?;
    Ok(())
}

/// Marks a translation as processing with the given counters. Returns
/// whether the row exists.
pub fn start_processing(
    conn: &Connection,
    id: &str,
    total: i64,
    progress: i64,
    now: &str,
) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "UPDATE translations
         SET status = 'processing', total = ?2, progress = ?3, error_message = NULL, updated_at = ?4
         WHERE id = ?1",
        params![id, total, progress, now],
    )?;
    Ok(affected > 0)
}

/// Completes a translation. `full` is stored only when no full translation
/// has been set yet.
pub fn mark_completed(
    conn: &Connection,
    id: &str,
    full: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "UPDATE translations
         SET status = 'completed',
             progress = MAX(progress, total),
             total = MAX(progress, total),
             full_translation = CASE
                 WHEN full_translation IS NULL OR full_translation = '' THEN ?2
                 ELSE full_translation
             END,
             error_message = NULL,
             updated_at = ?3
         WHERE id = ?1",
        params![id, full, now],
    )?;
    Ok(affected > 0)
}

pub fn mark_failed(
    conn: &Connection,
    id: &str,
    message: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "UPDATE translations SET status = 'failed', error_message = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, message, now],
    )?;
    Ok(affected > 0)
}

pub fn set_full_translation(
    conn: &Connection,
    id: &str,
    full: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "UPDATE translations SET full_translation = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, full, now],
    )?;
    Ok(affected > 0)
}

/// Stores edited input and sends the translation back to `pending`.
pub fn reset_for_reprocessing(
    conn: &Connection,
    id: &str,
    input_text: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "UPDATE translations
         SET input_text = ?2, status = 'pending', progress = 0, total = 0,
             full_translation = NULL, error_message = NULL, updated_at = ?3
         WHERE id = ?1",
        params![id, input_text, now],
    )?;
    Ok(affected > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample(id: &str, created_at: &str) -> TranslationRow {
        TranslationRow {
            id: id.to_string(),
            created_at: created_at.to_string(),
            updated_at: created_at.to_string(),
            status: "pending".to_string(),
            source_type: "text".to_string(),
            input_text: "你好。".to_string(),
            full_translation: None,
            error_message: None,
            progress: 0,
            total: 0,
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        db.with_conn(|conn| {
            insert(conn, &sample("t1", "2026-01-01T00:00:00.000000000Z"))?;
            let found = find_by_id(conn, "t1")?.expect("row");
            assert_eq!(found.status, "pending");
            assert_eq!(found.input_text, "你好。");
            assert!(find_by_id(conn, "missing")?.is_none());
            assert!(exists(conn, "t1")?);
            assert!(!exists(conn, "missing")?);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_query_orders_newest_first_and_paginates() {
        let db = test_db();
        db.with_conn(|conn| {
            for i in 0..5 {
                insert(
                    conn,
                    &sample(&format!("t{}", i), &format!("2026-01-0{}T00:00:00.000000000Z", i + 1)),
                )?;
            }
            let (rows, total) = query(
                conn,
                &TranslationFilter {
                    status: None,
                    limit: 2,
                    offset: 1,
                },
            )?;
            assert_eq!(total, 5);
            let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
            assert_eq!(ids, vec!["t3", "t2"]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_query_with_status_filter() {
        let db = test_db();
        db.with_conn(|conn| {
            insert(conn, &sample("a", "2026-01-01T00:00:00.000000000Z"))?;
            let mut failed = sample("b", "2026-01-02T00:00:00.000000000Z");
            failed.status = "failed".to_string();
            insert(conn, &failed)?;

            let (rows, total) = query(
                conn,
                &TranslationFilter {
                    status: Some(TranslationStatus::Failed),
                    limit: 20,
                    offset: 0,
                },
            )?;
            assert_eq!(total, 1);
            assert_eq!(rows[0].id, "b");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_mark_completed_keeps_existing_full_translation() {
        let db = test_db();
        db.with_conn(|conn| {
            insert(conn, &sample("t1", "2026-01-01T00:00:00.000000000Z"))?;
            set_full_translation(conn, "t1", "manual", "2026-01-01T00:00:01.000000000Z")?;
            assert!(mark_completed(conn, "t1", "derived", "2026-01-01T00:00:02.000000000Z")?);
            let row = find_by_id(conn, "t1")?.unwrap();
            assert_eq!(row.full_translation.as_deref(), Some("manual"));
            assert_eq!(row.status, "completed");
            assert!(!mark_completed(conn, "missing", "x", "2026-01-01T00:00:02.000000000Z")?);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_into_translation_rejects_unknown_status() {
        let mut row = sample("t1", "2026-01-01T00:00:00.000000000Z");
        row.status = "ignored".to_string();
        assert!(matches!(
            row.into_translation(),
            Err(DatabaseError::InvalidValue { .. })
        ));
    }
}
