//! Streaming client for the MaiOpinion diagnostic pipeline.
//!
//! Provides the HTTP API wrapper, the frame assembler that rebuilds
//! event lines from chunked response bodies, and the submission
//! coordinator that drives the step state machine from those events.

pub mod api;
pub mod config;
pub mod coordinator;
pub mod frames;

pub use api::{DiagnoseApi, DiagnoseApiError, HealthStatus};
pub use config::ClientConfig;
pub use coordinator::{Completion, SubmissionCoordinator};
