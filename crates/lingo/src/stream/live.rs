//! Live tail of a job that is still running.

use std::time::Duration;

use futures_util::Stream;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::event::{ParagraphInfo, ProgressResult, StreamEvent};
use crate::model::TranslationStatus;
use crate::store::TranslationStore;

/// Default pause between two snapshot reads.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub const NOT_FOUND_MESSAGE: &str = "Translation not found";
pub const FAILED_FALLBACK: &str = "Translation failed";

/// The stored error, or [`FAILED_FALLBACK`] when it is blank.
pub fn failure_message(error: Option<String>) -> String {
    error
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| FAILED_FALLBACK.to_string())
}

/// Polls the store and turns each new snapshot into events.
///
/// Results are emitted in (paragraph, ordinal) order and only once their
/// position can no longer change: a paragraph's results are released when
/// every paragraph before it holds its planned count. Each position is
/// emitted once. The stream ends after `complete` or `error`, or when
/// `cancel` fires. It never writes.
pub fn live_tail(
    store: TranslationStore,
    id: String,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> impl Stream<Item = StreamEvent> + Send + 'static {
    async_stream::stream! {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut start_sent = false;
        let mut emitted = 0usize;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(translation_id = %id, "Live tail cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let owned = id.clone();
            let snapshot = match store.call(move |s| s.progress_snapshot(&owned)).await {
                Ok(snapshot) => snapshot,
                Err(e) if e.is_not_found() => {
                    yield StreamEvent::error(NOT_FOUND_MESSAGE);
                    break;
                }
                Err(e) => {
                    warn!(translation_id = %id, "Snapshot read failed, retrying: {}", e);
                    continue;
                }
            };

            if snapshot.status == TranslationStatus::Failed {
                yield StreamEvent::error(failure_message(snapshot.error));
                break;
            }

            if !start_sent && snapshot.total > 0 {
                let owned = id.clone();
                let paragraphs = match store.call(move |s| s.get(&owned)).await {
                    Ok(t) => ParagraphInfo::from_paragraphs(&t.paragraphs),
                    Err(e) => {
                        warn!(translation_id = %id, "Failed to load layout: {}", e);
                        Vec::new()
                    }
                };
                yield StreamEvent::Start {
                    translation_id: id.clone(),
                    total: snapshot.total,
                    paragraphs,
                    full_translation: None,
                };
                start_sent = true;
            }

            let settled = snapshot.settled_len();
            if start_sent && settled > emitted {
                for entry in &snapshot.results[emitted..settled] {
                    yield StreamEvent::Progress {
                        current: entry.index + 1,
                        total: snapshot.total.max(entry.index + 1),
                        result: ProgressResult::from(entry),
                    };
                }
                emitted = settled;
            }

            if snapshot.status == TranslationStatus::Completed {
                let owned = id.clone();
                match store.call(move |s| s.get(&owned)).await {
                    Ok(t) => {
                        yield StreamEvent::Complete {
                            paragraphs: t.paragraphs,
                            full_translation: t.full_translation,
                        };
                    }
                    Err(e) if e.is_not_found() => {
                        yield StreamEvent::error(NOT_FOUND_MESSAGE);
                    }
                    Err(e) => {
                        warn!(translation_id = %id, "Failed to load completed job: {}", e);
                        yield StreamEvent::error(format!("Failed to load translation: {}", e));
                    }
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_failure_falls_back() {
        assert_eq!(failure_message(None), FAILED_FALLBACK);
        assert_eq!(failure_message(Some("  ".to_string())), FAILED_FALLBACK);
        assert_eq!(failure_message(Some("quota".to_string())), "quota");
    }
}
