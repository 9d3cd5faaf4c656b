//! Background processing of translation jobs.

mod recovery;
mod runner;
mod translator;

pub use recovery::RecoveryScanner;
pub use runner::{JobRunner, DEFAULT_LEASE_DURATION};
pub use translator::{TranslateError, Translator};
