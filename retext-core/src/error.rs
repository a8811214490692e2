use thiserror::Error;

use crate::run::RunId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditorError {
    #[error("invalid document format: missing %PDF- signature")]
    InvalidFormat,
    #[error("document buffer was already consumed; request a fresh clone")]
    DetachedBuffer,
    #[error("failed to decode document: {0}")]
    DecodeFailure(String),
    #[error("failed to encode document: {0}")]
    EncodeFailure(String),
    #[error("failed to draw run {run}: {reason}")]
    DrawFailure { run: RunId, reason: String },
    #[error("document has no pages")]
    EmptyDocument,
    #[error("no document loaded")]
    NoDocument,
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: usize, page_count: usize },
    #[error("unknown text run {0}")]
    UnknownRun(RunId),
    #[error("a save is already in progress")]
    SaveInProgress,
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type EditorResult<T> = std::result::Result<T, EditorError>;
