//! Replay of a completed job from stored state.

use super::event::{ParagraphInfo, ProgressResult, StreamEvent};
use crate::model::Translation;

/// Builds the full event sequence for a completed job: `start`, one
/// `progress` per stored result in paragraph order, then `complete`.
///
/// Reads nothing but `translation`, so two replays of the same job are
/// identical.
pub fn replay_completed(translation: &Translation) -> Vec<StreamEvent> {
    let total = translation.total;
    let result_count: usize = translation
        .paragraphs
        .iter()
        .map(|p| p.translations.len())
        .sum();
    let mut events = Vec::with_capacity(result_count + 2);

    events.push(StreamEvent::Start {
        translation_id: translation.id.clone(),
        total,
        paragraphs: ParagraphInfo::from_paragraphs(&translation.paragraphs),
        full_translation: translation.full_translation.clone(),
    });

    let mut current = 0;
    for (paragraph_index, paragraph) in translation.paragraphs.iter().enumerate() {
        for segment in &paragraph.translations {
            current += 1;
            events.push(StreamEvent::Progress {
                current,
                total,
                result: ProgressResult {
                    segment: segment.segment.clone(),
                    pinyin: segment.pinyin.clone(),
                    english: segment.english.clone(),
                    index: current - 1,
                    paragraph_index,
                },
            });
        }
    }

    events.push(StreamEvent::Complete {
        paragraphs: translation.paragraphs.clone(),
        full_translation: translation.full_translation.clone(),
    });
    events
}
