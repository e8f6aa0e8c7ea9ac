use thiserror::Error;

/// Failures surfaced to the caller of the session lifecycle surface.
///
/// Retrieval and packing never fail, and an empty retrieval is reported as
/// [`crate::pipeline::QueryOutcome::InsufficientEvidence`] rather than an error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("no indexed content; upload first")]
    NotReady,

    #[error("payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("no files")]
    NoFiles,
}

impl PipelineError {
    /// HTTP-equivalent status for a router to map onto its own responses.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::SessionNotFound(_) => 404,
            Self::SessionExpired(_) => 410,
            Self::NotReady | Self::NoFiles => 400,
            Self::PayloadTooLarge { .. } => 413,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
