//! Stream event wire format.

use serde::{Deserialize, Serialize};

use crate::model::{ParagraphResult, SegmentProgressEntry};

/// Layout of a paragraph as announced in a `start` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParagraphInfo {
    pub segment_count: usize,
    pub indent: String,
    pub separator: String,
}

impl ParagraphInfo {
    pub fn from_paragraphs(paragraphs: &[ParagraphResult]) -> Vec<ParagraphInfo> {
        paragraphs
            .iter()
            .map(|p| ParagraphInfo {
                segment_count: p.translations.len(),
                indent: p.indent.clone(),
                separator: p.separator.clone(),
            })
            .collect()
    }
}

/// One result inside a `progress` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressResult {
    pub segment: String,
    pub pinyin: String,
    pub english: String,
    pub index: usize,
    pub paragraph_index: usize,
}

impl From<&SegmentProgressEntry> for ProgressResult {
    fn from(entry: &SegmentProgressEntry) -> Self {
        Self {
            segment: entry.segment.clone(),
            pinyin: entry.pinyin.clone(),
            english: entry.english.clone(),
            index: entry.index,
            paragraph_index: entry.paragraph_index,
        }
    }
}

/// Everything an observer can receive. A stream always ends with exactly
/// one `Complete` or `Error` unless the observer goes away first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Start {
        translation_id: String,
        total: usize,
        paragraphs: Vec<ParagraphInfo>,
        #[serde(
            rename = "fullTranslation",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        full_translation: Option<String>,
    },
    Progress {
        current: usize,
        total: usize,
        result: ProgressResult,
    },
    Complete {
        paragraphs: Vec<ParagraphResult>,
        #[serde(rename = "fullTranslation", default)]
        full_translation: Option<String>,
    },
    Error {
        message: String,
    },
}

impl StreamEvent {
    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. } | StreamEvent::Error { .. })
    }

    /// Renders the event as one server-sent-events frame.
    pub fn to_sse_frame(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => format!("data: {}\n\n", json),
            Err(e) => {
                tracing::error!("Failed to encode stream event: {}", e);
                "data: {\"type\":\"error\",\"message\":\"Failed to encode SSE payload\"}\n\n"
                    .to_string()
            }
        }
    }
}
