//! REST client for the diagnostic pipeline's HTTP endpoints.
//!
//! Wraps `POST /api/diagnose` (multipart upload answered with a
//! streamed progress body) and `GET /api/health` using [`reqwest`].

use std::time::Duration;

use maiopinion_core::error::DiagnosisError;
use maiopinion_core::validation::ValidatedInput;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ClientConfig;

/// Header carrying the per-submission correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// HTTP client for one pipeline deployment.
#[derive(Debug, Clone)]
pub struct DiagnoseApi {
    client: reqwest::Client,
    api_url: String,
}

/// Body returned by `GET /api/health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Errors from the pipeline REST layer.
#[derive(Debug, thiserror::Error)]
pub enum DiagnoseApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The diagnose endpoint answered with a non-2xx status. The body is
    /// deliberately left unread.
    #[error("Pipeline rejected the diagnosis request ({status})")]
    Rejected { status: u16 },

    /// Any other endpoint answered with a non-2xx status.
    #[error("Pipeline API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl From<DiagnoseApiError> for DiagnosisError {
    fn from(err: DiagnoseApiError) -> Self {
        match err {
            DiagnoseApiError::Rejected { status } | DiagnoseApiError::ApiError { status, .. } => {
                DiagnosisError::RequestFailed { status }
            }
            DiagnoseApiError::Request(e) => DiagnosisError::Transport(e.to_string()),
        }
    }
}

impl DiagnoseApi {
    /// Create a new API client for a pipeline deployment.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:5000`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    /// Build a client honouring the configured connect timeout.
    pub fn from_config(config: &ClientConfig) -> Result<Self, DiagnoseApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        Ok(Self::with_client(client, config.api_url.clone()))
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Upload an image and condition and open the progress stream.
    ///
    /// Sends a multipart `POST /api/diagnose` with fields `image`,
    /// `condition` and, when present, `email`. Returns the response with
    /// its body unread so the caller can consume it incrementally. A
    /// non-2xx status yields [`DiagnoseApiError::Rejected`].
    pub async fn start_diagnosis(
        &self,
        input: ValidatedInput,
        submission_id: Uuid,
    ) -> Result<reqwest::Response, DiagnoseApiError> {
        let image = reqwest::multipart::Part::bytes(input.image.bytes)
            .file_name(input.image.file_name)
            .mime_str(input.image.mime_type)?;

        let mut form = reqwest::multipart::Form::new()
            .part("image", image)
            .text("condition", input.condition);
        if let Some(email) = input.email {
            form = form.text("email", email);
        }

        let response = self
            .client
            .post(format!("{}/api/diagnose", self.api_url))
            .header(REQUEST_ID_HEADER, submission_id.to_string())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiagnoseApiError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    /// Query the pipeline's health endpoint.
    pub async fn health(&self) -> Result<HealthStatus, DiagnoseApiError> {
        let response = self
            .client
            .get(format!("{}/api/health", self.api_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`DiagnoseApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, DiagnoseApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(DiagnoseApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DiagnoseApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}
