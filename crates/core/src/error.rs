//! Error taxonomy for a diagnosis submission.
//!
//! Every failure a submission can end with maps to one [`DiagnosisError`],
//! whose `Display` text is what the outcome records for the user.

/// Message shown when the pipeline rejects the request with a non-2xx status.
pub const REQUEST_FAILED_MESSAGE: &str = "Failed to process diagnosis";

/// Coarse classification of a [`DiagnosisError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    RequestFailed,
    MalformedEvent,
    PipelineError,
    Transport,
}

/// Every way a submission can fail.
///
/// The `Display` output is the user-visible message that ends up in
/// [`Outcome::error`](crate::outcome::Outcome::error).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DiagnosisError {
    /// Local input check failed; no request was sent.
    #[error("{0}")]
    Validation(String),

    /// The pipeline answered with a non-success HTTP status.
    #[error("Failed to process diagnosis")]
    RequestFailed { status: u16 },

    /// A `data: ` frame carried a payload that could not be decoded.
    #[error("Malformed progress event: {0}")]
    MalformedEvent(String),

    /// The pipeline reported a failure through an `error` envelope.
    #[error("{0}")]
    Pipeline(String),

    /// The connection failed or broke while reading the stream.
    #[error("Connection error: {0}")]
    Transport(String),
}

impl DiagnosisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::RequestFailed { .. } => ErrorKind::RequestFailed,
            Self::MalformedEvent(_) => ErrorKind::MalformedEvent,
            Self::Pipeline(_) => ErrorKind::PipelineError,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }
}
