//! Progress accumulator: one result at a time, counters in the same
//! transaction as the row they count.

use super::{StoreError, TranslationStore};
use crate::db::{lease_repo, paragraph_repo, translation_repo};
use crate::model::{ParagraphMeta, ProgressSnapshot, SegmentResult};

impl TranslationStore {
    /// Moves a job to `processing` with a known total and declares its
    /// paragraphs. Existing paragraph rows are kept.
    pub fn set_processing(
        &self,
        id: &str,
        total: usize,
        paragraphs: &[ParagraphMeta],
    ) -> Result<(), StoreError> {
        let now = self.now();
        let found = self.write("set processing", |tx| {
            if !translation_repo::start_processing(tx, id, total as i64, 0, &now)? {
                return Ok(false);
            }
            for (idx, meta) in paragraphs.iter().enumerate() {
                paragraph_repo::ensure_paragraph(tx, id, idx, Some(meta))?;
            }
            Ok(true)
        })?;
        if !found {
            return Err(StoreError::NotFound(id.to_string()));
        }
        log::debug!("Translation {} processing {} segments", id, total);
        Ok(())
    }

    /// Appends one result to `paragraph_idx` and returns `(progress, total)`.
    ///
    /// The result's ordinal is the progress value before the append, and
    /// the total grows to cover progress if it was never set.
    pub fn add_progress_segment(
        &self,
        id: &str,
        result: &SegmentResult,
        paragraph_idx: usize,
    ) -> Result<(usize, usize), StoreError> {
        let now = self.now();
        let counters = self.write("add progress segment", |tx| {
            let Some((progress, total)) = translation_repo::progress_state(tx, id)? else {
                return Ok(None);
            };
            paragraph_repo::ensure_paragraph(tx, id, paragraph_idx, None)?;
            paragraph_repo::insert_segment(tx, id, paragraph_idx, progress.max(0) as usize, result, &now)?;

            let progress = progress + 1;
            let total = total.max(progress);
            translation_repo::update_progress(tx, id, progress, total, &now)?;
            Ok(Some((progress as usize, total as usize)))
        })?;
        counters.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Finishes a job. The full translation is derived from the stored
    /// english parts unless one was already set.
    pub fn complete(&self, id: &str) -> Result<(), StoreError> {
        let now = self.now();
        let found = self.write("complete translation", |tx| {
            let full = paragraph_repo::english_parts(tx, id)?
                .iter()
                .map(|s| s.trim())
                .collect::<Vec<_>>()
                .join(" ");
            if !translation_repo::mark_completed(tx, id, &full, &now)? {
                return Ok(false);
            }
            lease_repo::mark_done(tx, id, &now)?;
            Ok(true)
        })?;
        if !found {
            return Err(StoreError::NotFound(id.to_string()));
        }
        log::info!("Translation {} completed", id);
        Ok(())
    }

    /// Records a failure on both the job and its lease.
    pub fn fail(&self, id: &str, message: &str) -> Result<(), StoreError> {
        let now = self.now();
        let found = self.write("fail translation", |tx| {
            if !translation_repo::mark_failed(tx, id, message, &now)? {
                return Ok(false);
            }
            lease_repo::mark_failed(tx, id, message, &now)?;
            Ok(true)
        })?;
        if !found {
            return Err(StoreError::NotFound(id.to_string()));
        }
        log::warn!("Translation {} failed: {}", id, message);
        Ok(())
    }

    /// Overrides the full translation. A later `complete` keeps it.
    pub fn set_full_translation(&self, id: &str, text: &str) -> Result<(), StoreError> {
        let now = self.now();
        let found = self.write("set full translation", |tx| {
            translation_repo::set_full_translation(tx, id, text, &now)
        })?;
        if !found {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Counters, status and every stored result, read from one snapshot.
    pub fn progress_snapshot(&self, id: &str) -> Result<ProgressSnapshot, StoreError> {
        let snapshot = self.read("progress snapshot", |tx| {
            let Some(row) = translation_repo::find_by_id(tx, id)? else {
                return Ok(None);
            };
            let results = paragraph_repo::segments_in_order(tx, id)?;
            let planned = paragraph_repo::planned_segment_counts(tx, id)?;
            Ok(Some((row, results, planned)))
        })?;
        let (row, results, planned) =
            snapshot.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let translation = row.into_translation()?;

        Ok(ProgressSnapshot {
            status: translation.status,
            current: translation.progress,
            total: translation.total,
            error: translation.error_message,
            results,
            planned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::model::{LeaseState, SegmentResult, TranslationStatus};
    use crate::text::split_paragraphs;

    fn seg(english: &str) -> SegmentResult {
        SegmentResult::new(format!("{}-zh", english), format!("{}-py", english), english)
    }

    #[test]
    fn test_append_assigns_ordinals_and_counts() {
        let store = store();
        let input = "A. B. C.";
        let id = store.create(input, "text").unwrap().id;
        let metas: Vec<_> = split_paragraphs(input).iter().map(|p| p.meta()).collect();
        assert_eq!(metas.len(), 3);

        store.set_processing(&id, 3, &metas).unwrap();
        assert_eq!(store.add_progress_segment(&id, &seg("a"), 0).unwrap(), (1, 3));
        assert_eq!(store.add_progress_segment(&id, &seg("b"), 1).unwrap(), (2, 3));
        assert_eq!(store.add_progress_segment(&id, &seg("c"), 2).unwrap(), (3, 3));
        store.complete(&id).unwrap();

        let t = store.get(&id).unwrap();
        assert_eq!(t.status, TranslationStatus::Completed);
        assert_eq!((t.progress, t.total), (3, 3));
        assert_eq!(t.full_translation.as_deref(), Some("a b c"));
        assert_eq!(t.paragraphs.len(), 3);
        assert_eq!(t.paragraphs[1].translations[0].english, "b");
        assert_eq!(store.job_lease(&id).unwrap().state, LeaseState::Done);
    }

    #[test]
    fn test_total_discovers_itself_when_unset() {
        let store = store();
        let id = store.create("你好。", "text").unwrap().id;
        assert_eq!(store.add_progress_segment(&id, &seg("a"), 0).unwrap(), (1, 1));
        assert_eq!(store.add_progress_segment(&id, &seg("b"), 0).unwrap(), (2, 2));
    }

    #[test]
    fn test_set_processing_is_idempotent() {
        let store = store();
        let id = store.create("一。二。", "text").unwrap().id;
        let metas: Vec<_> = split_paragraphs("一。二。").iter().map(|p| p.meta()).collect();
        store.set_processing(&id, 2, &metas).unwrap();
        store.set_processing(&id, 2, &metas).unwrap();

        let snapshot = store.progress_snapshot(&id).unwrap();
        assert_eq!(snapshot.status, TranslationStatus::Processing);
        assert_eq!((snapshot.current, snapshot.total), (0, 2));
        assert_eq!(store.get(&id).unwrap().paragraphs.len(), 2);
    }

    #[test]
    fn test_complete_skips_blank_english_and_keeps_override() {
        let store = store();
        let id = store.create("一。二。", "text").unwrap().id;
        store.set_processing(&id, 2, &[]).unwrap();
        store.add_progress_segment(&id, &seg("one"), 0).unwrap();
        store.add_progress_segment(&id, &SegmentResult::new("，", "", ""), 0).unwrap();

        let other = store.create("三。", "text").unwrap().id;
        store.add_progress_segment(&other, &seg("three"), 0).unwrap();
        store.set_full_translation(&other, "Three, edited.").unwrap();

        store.complete(&id).unwrap();
        store.complete(&other).unwrap();
        assert_eq!(store.get(&id).unwrap().full_translation.as_deref(), Some("one"));
        assert_eq!(
            store.get(&other).unwrap().full_translation.as_deref(),
            Some("Three, edited.")
        );
    }

    #[test]
    fn test_fail_records_message_everywhere() {
        let store = store();
        let id = store.create("你好。", "text").unwrap().id;
        store.fail(&id, "No translatable segments found").unwrap();

        let snapshot = store.progress_snapshot(&id).unwrap();
        assert_eq!(snapshot.status, TranslationStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("No translatable segments found"));
        let lease = store.job_lease(&id).unwrap();
        assert_eq!(lease.state, LeaseState::Failed);
        assert_eq!(lease.last_error.as_deref(), Some("No translatable segments found"));
    }

    #[test]
    fn test_snapshot_lists_results_in_paragraph_order() {
        let store = store();
        let id = store.create("一。二。", "text").unwrap().id;
        store.set_processing(&id, 3, &[]).unwrap();
        store.add_progress_segment(&id, &seg("a"), 1).unwrap();
        store.add_progress_segment(&id, &seg("b"), 0).unwrap();

        let snapshot = store.progress_snapshot(&id).unwrap();
        let order: Vec<_> = snapshot
            .results
            .iter()
            .map(|r| (r.english.as_str(), r.index, r.paragraph_index))
            .collect();
        assert_eq!(order, vec![("b", 0, 0), ("a", 1, 1)]);
        assert!(snapshot.planned.is_empty());
    }

    #[test]
    fn test_snapshot_carries_planned_counts() {
        let store = store();
        let input = "一。二。";
        let id = store.create(input, "text").unwrap().id;
        let metas: Vec<_> = split_paragraphs(input)
            .iter()
            .map(|p| {
                let mut meta = p.meta();
                meta.planned_segments = Some(1);
                meta
            })
            .collect();
        store.set_processing(&id, 2, &metas).unwrap();
        store.add_progress_segment(&id, &seg("a"), 0).unwrap();

        let snapshot = store.progress_snapshot(&id).unwrap();
        assert_eq!(snapshot.planned.get(&0), Some(&1));
        assert_eq!(snapshot.planned.get(&1), Some(&1));
        assert_eq!(snapshot.settled_len(), 1);
    }

    #[test]
    fn test_progress_never_exceeds_total() {
        let store = store();
        let id = store.create("一。二。三。", "text").unwrap().id;
        store.set_processing(&id, 2, &[]).unwrap();

        let mut last_total = 2;
        let mut seen = Vec::new();
        for english in ["a", "b", "c"] {
            let (progress, total) = store.add_progress_segment(&id, &seg(english), 0).unwrap();
            assert!(progress <= total, "progress {} above total {}", progress, total);
            assert!(total >= last_total, "total shrank from {} to {}", last_total, total);
            last_total = total;

            let snapshot = store.progress_snapshot(&id).unwrap();
            assert!(snapshot.current <= snapshot.total);
            seen.push((progress, total));
        }
        assert_eq!(seen, vec![(1, 2), (2, 2), (3, 3)]);
    }

    #[test]
    fn test_writes_on_missing_job_are_not_found() {
        let store = store();
        assert!(store.set_processing("x", 1, &[]).unwrap_err().is_not_found());
        assert!(store.add_progress_segment("x", &seg("a"), 0).unwrap_err().is_not_found());
        assert!(store.complete("x").unwrap_err().is_not_found());
        assert!(store.fail("x", "m").unwrap_err().is_not_found());
        assert!(store.progress_snapshot("x").unwrap_err().is_not_found());
    }
}
