pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod store;
pub mod stream;
pub mod text;
pub mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_config, Config, LogConfig, LogFormat};
pub use db::{Database, DatabaseError, RetryPolicy};
pub use error::{ConfigError, LingoError, Result};
pub use model::{
    JobLease, LeaseState, ParagraphResult, ProgressSnapshot, SegmentProgressEntry, SegmentResult,
    StatusSummary, Translation, TranslationStatus,
};
pub use store::{StoreError, TranslationStore};
pub use stream::{replay_completed, StreamEvent, TranslationStreamer};
pub use worker::{JobRunner, RecoveryScanner, TranslateError, Translator};
