//! Domain model for the MaiOpinion diagnostic client.
//!
//! Holds the five-stage step registry, the progress envelopes streamed
//! by the pipeline, the state machine that applies them, and the local
//! input checks. Nothing in this crate performs I/O except report
//! export.

pub mod envelope;
pub mod error;
pub mod machine;
pub mod outcome;
pub mod report;
pub mod steps;
pub mod validation;
