//! Edit-driven partial reprocessing.
//!
//! Paragraphs are diffed by ordinal on their content hash. Only changed or
//! new paragraphs lose their results; everything else is kept so the worker
//! resumes after it.

use std::collections::BTreeMap;

use super::{StoreError, TranslationStore};
use crate::db::{lease_repo, paragraph_repo, translation_repo};
use crate::model::{ParagraphMeta, SegmentResult};
use crate::text::{content_hash, split_paragraphs};

impl TranslationStore {
    /// Stores edited input and returns the paragraphs that need translating,
    /// keyed by index. An empty map means nothing changed and nothing was
    /// written.
    pub fn update_input_text_for_reprocessing(
        &self,
        id: &str,
        new_text: &str,
    ) -> Result<BTreeMap<usize, String>, StoreError> {
        if new_text.trim().is_empty() {
            return Err(StoreError::Validation("input_text is required".to_string()));
        }
        let paragraphs = split_paragraphs(new_text);
        let metas: Vec<ParagraphMeta> = paragraphs.iter().map(|p| p.meta()).collect();
        let now = self.now();

        let changed = self.write("update input for reprocessing", |tx| {
            let Some(row) = translation_repo::find_by_id(tx, id)? else {
                return Ok(None);
            };
            // Rows created by bare appends carry no hash; the stored input
            // still says what those paragraphs were.
            let previous: Vec<String> = split_paragraphs(&row.input_text)
                .iter()
                .map(|p| content_hash(&p.text))
                .collect();
            let mut stored = paragraph_repo::paragraph_hashes(tx, id)?;
            for (idx, hash) in stored.iter_mut() {
                if hash.is_empty() {
                    if let Some(prev) = previous.get(*idx) {
                        hash.clone_from(prev);
                    }
                }
            }

            let changed: BTreeMap<usize, String> = paragraphs
                .iter()
                .zip(&metas)
                .enumerate()
                .filter(|(idx, (_, meta))| stored.get(idx) != Some(&meta.content_hash))
                .map(|(idx, (p, _))| (idx, p.text.clone()))
                .collect();
            let removed: Vec<usize> = stored
                .keys()
                .copied()
                .filter(|idx| *idx >= paragraphs.len())
                .collect();

            if changed.is_empty() && removed.is_empty() {
                return Ok(Some(changed));
            }

            for idx in changed.keys() {
                paragraph_repo::delete_segments(tx, id, *idx)?;
                paragraph_repo::upsert_paragraph(tx, id, *idx, &metas[*idx])?;
            }
            for idx in &removed {
                paragraph_repo::delete_paragraph(tx, id, *idx)?;
            }
            translation_repo::reset_for_reprocessing(tx, id, new_text, &now)?;
            lease_repo::reset_pending(tx, id, &now)?;
            Ok(Some(changed))
        })?;

        let changed = changed.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if !changed.is_empty() {
            log::info!(
                "Translation {} edited: {} paragraph(s) to reprocess",
                id,
                changed.len()
            );
        }
        Ok(changed)
    }

    /// Like [`set_processing`](Self::set_processing), but progress starts
    /// at the number of results already stored.
    pub fn set_reprocessing(
        &self,
        id: &str,
        total: usize,
        paragraphs: &[ParagraphMeta],
    ) -> Result<usize, StoreError> {
        let now = self.now();
        let kept = self.write("set reprocessing", |tx| {
            if !translation_repo::exists(tx, id)? {
                return Ok(None);
            }
            let kept = paragraph_repo::count_segments(tx, id)?;
            translation_repo::start_processing(
                tx,
                id,
                total.max(kept) as i64,
                kept as i64,
                &now,
            )?;
            for (idx, meta) in paragraphs.iter().enumerate() {
                paragraph_repo::ensure_paragraph(tx, id, idx, Some(meta))?;
            }
            Ok(Some(kept))
        })?;
        let kept = kept.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        log::debug!("Translation {} reprocessing, {} of {} kept", id, kept, total);
        Ok(kept)
    }

    /// Drops the results of one paragraph. Returns how many were removed.
    pub fn clear_paragraph_segments(&self, id: &str, paragraph_idx: usize) -> Result<usize, StoreError> {
        Ok(self.write("clear paragraph segments", |tx| {
            paragraph_repo::delete_segments(tx, id, paragraph_idx)
        })?)
    }

    pub fn paragraph_segment_counts(&self, id: &str) -> Result<BTreeMap<usize, usize>, StoreError> {
        Ok(self.read("paragraph segment counts", |tx| {
            paragraph_repo::segment_counts(tx, id)
        })?)
    }

    /// Replaces one paragraph's results wholesale. Counters are not touched.
    pub fn replace_paragraph_segments(
        &self,
        id: &str,
        paragraph_idx: usize,
        segments: &[SegmentResult],
    ) -> Result<(), StoreError> {
        let now = self.now();
        let found = self.write("replace paragraph segments", |tx| {
            if !translation_repo::exists(tx, id)? {
                return Ok(false);
            }
            paragraph_repo::ensure_paragraph(tx, id, paragraph_idx, None)?;
            paragraph_repo::delete_segments(tx, id, paragraph_idx)?;
            for (seg_idx, segment) in segments.iter().enumerate() {
                paragraph_repo::insert_segment(tx, id, paragraph_idx, seg_idx, segment, &now)?;
            }
            Ok(true)
        })?;
        if !found {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
