//! The external translation capability.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::SegmentResult;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    #[error("{0}")]
    Segmentation(String),

    #[error("{0}")]
    Translation(String),

    /// The backing service could not be reached at all.
    #[error("translator unavailable: {0}")]
    Unavailable(String),
}

/// Segments and translates text. Implementations wrap a model or service;
/// the worker only ever calls these two methods.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Cuts one paragraph into translatable segments.
    async fn segment(&self, text: &str) -> Result<Vec<String>, TranslateError>;

    /// Translates one segment. `context` is the paragraph it came from.
    async fn translate(&self, segment: &str, context: &str) -> Result<SegmentResult, TranslateError>;
}
