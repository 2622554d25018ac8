//! Progress envelopes and the frame decoder.
//!
//! The pipeline streams one JSON object per `data: ` line with the shape
//! `{"type": "<kind>", ...fields}`. This module turns a single complete
//! line into a strongly-typed [`Envelope`].

use serde::Deserialize;

use crate::error::DiagnosisError;
use crate::report::FinalReport;
use crate::steps::StepId;

/// Prefix that marks a line as carrying an event payload.
pub const DATA_PREFIX: &str = "data: ";

/// `type` discriminants this client understands.
const KNOWN_TYPES: [&str; 4] = ["step_start", "step_complete", "complete", "error"];

/// One decoded progress event.
///
/// Deserialized via the internally-tagged `"type"` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// A stage has begun.
    StepStart { step: StepId, message: String },

    /// A stage has finished. `result` is carried for display only.
    StepComplete {
        step: StepId,
        message: String,
        #[serde(default)]
        result: Option<serde_json::Value>,
    },

    /// The pipeline finished successfully. Terminal.
    Complete { report: FinalReport },

    /// The pipeline failed. Terminal.
    Error { message: String },
}

impl Envelope {
    /// Whether this envelope ends the read loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::StepStart { .. } => "step_start",
            Self::StepComplete { .. } => "step_complete",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }
}

/// Decode one complete frame.
///
/// * Lines without the `data: ` prefix (blank separators, comments,
///   keep-alives) yield `Ok(None)`.
/// * Prefixed lines whose payload is not a JSON object with a string
///   `type`, or whose fields do not match that type, yield
///   [`DiagnosisError::MalformedEvent`].
/// * Well-formed payloads with a `type` this client does not know are
///   logged and skipped.
pub fn decode_frame(frame: &str) -> Result<Option<Envelope>, DiagnosisError> {
    let Some(payload) = frame.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };

    let value: serde_json::Value = serde_json::from_str(payload).map_err(malformed)?;

    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| DiagnosisError::MalformedEvent("missing string `type` field".into()))?;

    if !KNOWN_TYPES.contains(&kind) {
        tracing::warn!(event_type = %kind, "Ignoring progress event of unknown type");
        return Ok(None);
    }

    serde_json::from_value(value).map(Some).map_err(malformed)
}

fn malformed(e: serde_json::Error) -> DiagnosisError {
    DiagnosisError::MalformedEvent(e.to_string())
}
