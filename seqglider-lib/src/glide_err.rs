use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GliderError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("malformed sequence file: {0}")]
    BadFileFormat(String),

    #[error("unknown metric '{0}': not a registered metric and not of the form <k>MER")]
    UnknownMetric(String),

    #[error("cannot compare k-mer profiles with k={left} and k={right}")]
    KMismatch { left: usize, right: usize },

    #[error("no reference k-mer profile for k={0}")]
    MissingReference(usize),

    #[error("k must be between 1 and 32, got {0}")]
    InvalidK(usize),

    #[error("k-mer profile was already converted to frequencies")]
    AlreadyNormalized,

    #[error("k-mer profile holds raw counts, convert it to frequencies first")]
    NotNormalized,

    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("pipeline was cancelled")]
    Cancelled,

    #[error("pipeline stage '{0}' panicked")]
    StageFailed(String),
}

pub type Result<T> = std::result::Result<T, GliderError>;

impl<T> From<crossbeam_channel::SendError<T>> for GliderError {
    // the receiving stage hung up, which only happens when it stopped early
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        GliderError::Cancelled
    }
}

impl GliderError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GliderError::Cancelled)
    }
}
