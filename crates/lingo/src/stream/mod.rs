//! Progress streaming for observers.
//!
//! An observer attaches to a job at any point. What it receives depends on
//! the job's status at attach time:
//!
//! | status                | events                                         |
//! |-----------------------|------------------------------------------------|
//! | missing               | `error` "Translation not found"                |
//! | `failed`              | `error` with the stored message                |
//! | `completed`           | replay: `start`, every `progress`, `complete`  |
//! | `pending`/`processing`| processing is kicked, then the live tail       |

use std::time::Duration;

use futures_util::{pin_mut, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::warn;

mod event;
mod live;
mod replay;

pub use event::{ParagraphInfo, ProgressResult, StreamEvent};
pub use live::{
    failure_message, live_tail, DEFAULT_POLL_INTERVAL, FAILED_FALLBACK, NOT_FOUND_MESSAGE,
};
pub use replay::replay_completed;

use crate::model::TranslationStatus;
use crate::store::TranslationStore;
use crate::worker::JobRunner;

#[derive(Clone)]
pub struct TranslationStreamer {
    store: TranslationStore,
    poll_interval: Duration,
    runner: Option<JobRunner>,
}

impl TranslationStreamer {
    pub fn new(store: TranslationStore) -> Self {
        Self {
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
            runner: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Attached streams start processing of unfinished jobs through `runner`.
    pub fn with_runner(mut self, runner: JobRunner) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Attaches an observer to `id`. Dropping the stream or cancelling
    /// `cancel` detaches it; neither affects the job.
    pub fn attach(
        &self,
        id: &str,
        cancel: CancellationToken,
    ) -> impl Stream<Item = StreamEvent> + Send + 'static {
        let store = self.store.clone();
        let runner = self.runner.clone();
        let poll_interval = self.poll_interval;
        let id = id.to_string();

        async_stream::stream! {
            let owned = id.clone();
            let initial = store.call(move |s| s.get(&owned)).await;
            match initial {
                Err(e) if e.is_not_found() => {
                    yield StreamEvent::error(NOT_FOUND_MESSAGE);
                }
                Err(e) => {
                    warn!(translation_id = %id, "Failed to load translation: {}", e);
                    yield StreamEvent::error(format!("Failed to load translation: {}", e));
                }
                Ok(t) if t.status == TranslationStatus::Failed => {
                    yield StreamEvent::error(failure_message(t.error_message));
                }
                Ok(t) if t.status == TranslationStatus::Completed => {
                    for event in replay_completed(&t) {
                        yield event;
                    }
                }
                Ok(_) => {
                    if let Some(runner) = &runner {
                        if let Err(e) = runner.start_processing(&id).await {
                            warn!(translation_id = %id, "Failed to start processing: {}", e);
                        }
                    }
                    let tail = live_tail(store.clone(), id.clone(), poll_interval, cancel.clone());
                    pin_mut!(tail);
                    while let Some(event) = tail.next().await {
                        yield event;
                    }
                }
            }
        }
    }
}
