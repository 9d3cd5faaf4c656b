//! Domain types shared by the store, the stream protocol and the worker.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a translation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TranslationStatus {
    pub const ALL: [TranslationStatus; 4] = [
        TranslationStatus::Pending,
        TranslationStatus::Processing,
        TranslationStatus::Completed,
        TranslationStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationStatus::Pending => "pending",
            TranslationStatus::Processing => "processing",
            TranslationStatus::Completed => "completed",
            TranslationStatus::Failed => "failed",
        }
    }

    /// Completed and failed jobs are never picked up by a worker again
    /// unless their input is edited.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TranslationStatus::Completed | TranslationStatus::Failed
        )
    }
}

impl fmt::Display for TranslationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TranslationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TranslationStatus::Pending),
            "processing" => Ok(TranslationStatus::Processing),
            "completed" => Ok(TranslationStatus::Completed),
            "failed" => Ok(TranslationStatus::Failed),
            other => Err(format!("unknown translation status '{}'", other)),
        }
    }
}

/// Worker ownership state of a job's lease record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseState {
    Pending,
    Leased,
    Done,
    Failed,
}

impl LeaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseState::Pending => "pending",
            LeaseState::Leased => "leased",
            LeaseState::Done => "done",
            LeaseState::Failed => "failed",
        }
    }
}

impl fmt::Display for LeaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaseState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LeaseState::Pending),
            "leased" => Ok(LeaseState::Leased),
            "done" => Ok(LeaseState::Done),
            "failed" => Ok(LeaseState::Failed),
            other => Err(format!("unknown lease state '{}'", other)),
        }
    }
}

/// One translated-and-annotated piece of a paragraph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentResult {
    pub segment: String,
    pub pinyin: String,
    pub english: String,
}

impl SegmentResult {
    pub fn new(
        segment: impl Into<String>,
        pinyin: impl Into<String>,
        english: impl Into<String>,
    ) -> Self {
        Self {
            segment: segment.into(),
            pinyin: pinyin.into(),
            english: english.into(),
        }
    }
}

/// A paragraph with its stored results and layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParagraphResult {
    pub translations: Vec<SegmentResult>,
    pub indent: String,
    pub separator: String,
}

/// Layout and content hash declared for a paragraph before its results exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParagraphMeta {
    pub indent: String,
    pub separator: String,
    pub content_hash: String,
    /// How many results the paragraph will hold, once it has been segmented.
    pub planned_segments: Option<usize>,
}

/// A translation job as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: TranslationStatus,
    pub source_type: String,
    pub input_text: String,
    pub full_translation: Option<String>,
    pub error_message: Option<String>,
    pub progress: usize,
    pub total: usize,
    /// Empty for list results; populated by `get`.
    #[serde(default)]
    pub paragraphs: Vec<ParagraphResult>,
}

/// A job's lease record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLease {
    pub translation_id: String,
    pub state: LeaseState,
    pub attempts: u32,
    pub lease_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Status view with counts hidden while a job has not started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub translation_id: String,
    pub status: TranslationStatus,
    pub progress: Option<usize>,
    pub total: Option<usize>,
}

/// One stored result with its position in the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentProgressEntry {
    pub segment: String,
    pub pinyin: String,
    pub english: String,
    pub index: usize,
    pub paragraph_index: usize,
}

/// Accumulator state read in one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub status: TranslationStatus,
    pub current: usize,
    pub total: usize,
    pub error: Option<String>,
    /// Results in (paragraph, ordinal) order; `index` is the position here.
    pub results: Vec<SegmentProgressEntry>,
    /// Planned result count per paragraph, for paragraphs that have one.
    pub planned: BTreeMap<usize, usize>,
}

impl ProgressSnapshot {
    /// Number of leading results whose position can no longer change.
    ///
    /// Paragraphs settle in order while each holds exactly its planned
    /// count. The first one that does not contributes the results it has
    /// and ends the prefix, since later paragraphs may still gain results
    /// in front of them. A completed job is settled as a whole.
    pub fn settled_len(&self) -> usize {
        if self.status == TranslationStatus::Completed {
            return self.results.len();
        }

        let mut stored: BTreeMap<usize, usize> = BTreeMap::new();
        for result in &self.results {
            *stored.entry(result.paragraph_index).or_default() += 1;
        }
        let Some(last) = stored.keys().chain(self.planned.keys()).max().copied() else {
            return 0;
        };

        let mut settled = 0;
        for idx in 0..=last {
            let have = stored.get(&idx).copied().unwrap_or(0);
            settled += have;
            if self.planned.get(&idx) != Some(&have) {
                break;
            }
        }
        settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in TranslationStatus::ALL {
            assert_eq!(status.as_str().parse::<TranslationStatus>(), Ok(status));
        }
        assert!("superseded".parse::<TranslationStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TranslationStatus::Pending.is_terminal());
        assert!(!TranslationStatus::Processing.is_terminal());
        assert!(TranslationStatus::Completed.is_terminal());
        assert!(TranslationStatus::Failed.is_terminal());
    }

    #[test]
    fn test_lease_state_parse() {
        assert_eq!("leased".parse::<LeaseState>(), Ok(LeaseState::Leased));
        assert!("expired".parse::<LeaseState>().is_err());
    }

    #[test]
    fn test_segment_result_serializes_flat() {
        let json = serde_json::to_value(SegmentResult::new("你好", "nǐ hǎo", "hello")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"segment": "你好", "pinyin": "nǐ hǎo", "english": "hello"})
        );
    }

    fn snapshot(
        status: TranslationStatus,
        paragraphs: &[usize],
        planned: &[(usize, usize)],
    ) -> ProgressSnapshot {
        let results = paragraphs
            .iter()
            .enumerate()
            .map(|(index, &paragraph_index)| SegmentProgressEntry {
                segment: format!("s{}", index),
                pinyin: String::new(),
                english: String::new(),
                index,
                paragraph_index,
            })
            .collect();
        ProgressSnapshot {
            status,
            current: paragraphs.len(),
            total: planned.iter().map(|(_, n)| n).sum(),
            error: None,
            results,
            planned: planned.iter().copied().collect(),
        }
    }

    #[test]
    fn test_settled_prefix_stops_at_unfinished_paragraph() {
        let processing = TranslationStatus::Processing;

        // Paragraph 1 was edited and has nothing yet; paragraph 2 is kept.
        let s = snapshot(processing, &[0, 2], &[(0, 1), (1, 1), (2, 1)]);
        assert_eq!(s.settled_len(), 1);

        // Paragraph 1 is half done.
        let s = snapshot(processing, &[0, 1, 2], &[(0, 1), (1, 2), (2, 1)]);
        assert_eq!(s.settled_len(), 2);

        let s = snapshot(processing, &[0, 1, 1, 2], &[(0, 1), (1, 2), (2, 1)]);
        assert_eq!(s.settled_len(), 4);

        // Nothing planned: only the first paragraph's results are placed.
        let s = snapshot(processing, &[0, 1], &[]);
        assert_eq!(s.settled_len(), 1);

        let s = snapshot(TranslationStatus::Completed, &[0, 1], &[]);
        assert_eq!(s.settled_len(), 2);

        assert_eq!(snapshot(processing, &[], &[]).settled_len(), 0);
    }
}
