//! Translation store: the single coordination point for jobs.
//!
//! There is no in-memory job table. Workers, recovery and stream observers
//! all read and write through a [`TranslationStore`], which wraps every
//! operation in a short transaction and the lock-retry policy.

use std::sync::Arc;

use rusqlite::Transaction;

use crate::clock::{format_timestamp, Clock, SystemClock};
use crate::db::translation_repo::{self, TranslationFilter, TranslationRow};
use crate::db::{lease_repo, paragraph_repo, with_retry, Database, DatabaseError, RetryPolicy};
use crate::model::{StatusSummary, Translation, TranslationStatus};

mod error;
mod lease;
mod progress;
mod reprocess;

pub use error::StoreError;

/// Source type recorded when the caller does not give one.
pub const DEFAULT_SOURCE_TYPE: &str = "text";

/// Page size used when a list request asks for zero or fewer items.
pub const DEFAULT_LIST_LIMIT: u64 = 20;

#[derive(Clone)]
pub struct TranslationStore {
    db: Database,
    clock: Arc<dyn Clock>,
    write_retry: RetryPolicy,
    list_retry: RetryPolicy,
    max_attempts: Option<u32>,
}

impl TranslationStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            clock: Arc::new(SystemClock),
            write_retry: RetryPolicy::WRITE,
            list_retry: RetryPolicy::LIST,
            max_attempts: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry_policies(mut self, write: RetryPolicy, list: RetryPolicy) -> Self {
        self.write_retry = write;
        self.list_retry = list;
        self
    }

    /// Caps how many times a job may be claimed. `None` means unbounded.
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Runs a store call on the blocking thread pool so async callers never
    /// hold a runtime thread while SQLite waits on a lock.
    pub async fn call<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&TranslationStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store)).await?
    }

    fn now(&self) -> String {
        format_timestamp(self.clock.now())
    }

    /// Runs `f` in a `BEGIN IMMEDIATE` transaction under the write policy.
    fn write<T, F>(&self, operation: &str, f: F) -> Result<T, DatabaseError>
    where
        F: Fn(&Transaction<'_>) -> Result<T, DatabaseError>,
    {
        with_retry(self.write_retry, operation, || self.db.with_tx(&f))
    }

    /// Runs `f` in a read transaction under the write (point-read) policy.
    fn read<T, F>(&self, operation: &str, f: F) -> Result<T, DatabaseError>
    where
        F: Fn(&Transaction<'_>) -> Result<T, DatabaseError>,
    {
        with_retry(self.write_retry, operation, || self.db.with_read_tx(&f))
    }

    /// Runs `f` in a read transaction under the list policy.
    fn read_list<T, F>(&self, operation: &str, f: F) -> Result<T, DatabaseError>
    where
        F: Fn(&Transaction<'_>) -> Result<T, DatabaseError>,
    {
        with_retry(self.list_retry, operation, || self.db.with_read_tx(&f))
    }

    /// Creates a pending job and its lease record.
    pub fn create(&self, input_text: &str, source_type: &str) -> Result<Translation, StoreError> {
        if input_text.trim().is_empty() {
            return Err(StoreError::Validation("input_text is required".to_string()));
        }
        let source_type = match source_type.trim() {
            "" => DEFAULT_SOURCE_TYPE,
            s => s,
        };

        let now = self.now();
        let row = TranslationRow {
            id: new_id(),
            created_at: now.clone(),
            updated_at: now.clone(),
            status: TranslationStatus::Pending.as_str().to_string(),
            source_type: source_type.to_string(),
            input_text: input_text.to_string(),
            full_translation: None,
            error_message: None,
            progress: 0,
            total: 0,
        };

        self.write("create translation", |tx| {
            translation_repo::insert(tx, &row)?;
            lease_repo::insert_pending(tx, &row.id, &now)
        })?;
        log::info!("Created translation {} ({} bytes)", row.id, row.input_text.len());

        Ok(row.into_translation()?)
    }

    /// Loads a job with its paragraphs and segments.
    pub fn get(&self, id: &str) -> Result<Translation, StoreError> {
        let found = self.read("get translation", |tx| {
            let Some(row) = translation_repo::find_by_id(tx, id)? else {
                return Ok(None);
            };
            let paragraphs = paragraph_repo::load_paragraphs(tx, id)?;
            Ok(Some((row, paragraphs)))
        })?;

        let (row, paragraphs) = found.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let mut translation = row.into_translation()?;
        translation.paragraphs = paragraphs;
        Ok(translation)
    }

    /// Lists jobs newest first. Returns the page and the total matching count.
    pub fn list(
        &self,
        limit: i64,
        offset: i64,
        status: Option<&str>,
    ) -> Result<(Vec<Translation>, u64), StoreError> {
        let status = match status.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => Some(
                s.parse::<TranslationStatus>()
                    .map_err(|_| StoreError::Validation("Invalid status filter".to_string()))?,
            ),
            None => None,
        };
        let filter = TranslationFilter {
            status,
            limit: if limit <= 0 { DEFAULT_LIST_LIMIT } else { limit as u64 },
            offset: offset.max(0) as u64,
        };

        let (rows, total) =
            self.read_list("list translations", |tx| translation_repo::query(tx, &filter))?;
        let items = rows
            .into_iter()
            .map(TranslationRow::into_translation)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((items, total))
    }

    /// Hard-deletes a job and everything it owns.
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let deleted = self.write("delete translation", |tx| translation_repo::delete(tx, id))?;
        if !deleted {
            return Err(StoreError::NotFound(id.to_string()));
        }
        log::info!("Deleted translation {}", id);
        Ok(())
    }

    /// Status with counts hidden while a job is pending and has not counted
    /// anything yet.
    pub fn status(&self, id: &str) -> Result<StatusSummary, StoreError> {
        let row = self
            .read("translation status", |tx| translation_repo::find_by_id(tx, id))?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let translation = row.into_translation()?;

        let known = |value: usize| {
            if translation.status == TranslationStatus::Pending && value == 0 {
                None
            } else {
                Some(value)
            }
        };
        Ok(StatusSummary {
            progress: known(translation.progress),
            total: known(translation.total),
            translation_id: translation.id,
            status: translation.status,
        })
    }
}

/// Time-ordered opaque id.
fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
