//! Lease claim protocol.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{StoreError, TranslationStore};
use crate::clock::format_timestamp;
use crate::db::lease_repo;
use crate::model::JobLease;

fn deadline(now: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(lease)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(now)
}

impl TranslationStore {
    /// Tries to take the processing lease for `id`.
    ///
    /// Returns `Ok(false)` when someone else holds a live lease, the job is
    /// finished, the attempt ceiling is reached, or the job does not exist.
    pub fn claim_translation_job(&self, id: &str, lease: Duration) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let (now_ts, until_ts) = (format_timestamp(now), format_timestamp(deadline(now, lease)));
        let max_attempts = self.max_attempts;

        let claimed = self.write("claim translation job", |tx| {
            lease_repo::claim(tx, id, &now_ts, &until_ts, max_attempts)
        })?;
        if claimed {
            log::debug!("Claimed translation {} until {}", id, until_ts);
        }
        Ok(claimed)
    }

    /// Extends a held lease. Returns `false` if the lease is no longer held.
    pub fn renew_lease(&self, id: &str, lease: Duration) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let (now_ts, until_ts) = (format_timestamp(now), format_timestamp(deadline(now, lease)));
        Ok(self.write("renew lease", |tx| {
            lease_repo::renew(tx, id, &now_ts, &until_ts)
        })?)
    }

    /// Jobs that are pending or whose lease has lapsed, oldest first.
    pub fn list_restartable_translation_ids(&self) -> Result<Vec<String>, StoreError> {
        let now = self.now();
        let max_attempts = self.max_attempts;
        Ok(self.read_list("list restartable jobs", |tx| {
            lease_repo::restartable_ids(tx, &now, max_attempts)
        })?)
    }

    pub fn job_lease(&self, id: &str) -> Result<JobLease, StoreError> {
        let row = self
            .read("get job lease", |tx| lease_repo::find(tx, id))?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(row.into_lease()?)
    }
}
