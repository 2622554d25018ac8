//! Local stand-in for the diagnostic pipeline.
//!
//! Serves `POST /api/diagnose` with a scripted, chunked `data: ` body
//! and records every multipart upload it receives.

#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use maiopinion_core::validation::{DiagnosisInput, ImageUpload};

/// Minimal PNG signature; enough for format sniffing.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01";

/// What the stand-in pipeline answers with.
#[derive(Debug, Clone)]
pub struct Script {
    pub status: StatusCode,
    /// Raw body chunks, written exactly as given.
    pub chunks: Vec<String>,
    /// Pause before each chunk so reads arrive separately.
    pub delay: Duration,
    /// Keep the body open after the last chunk.
    pub hold_open: bool,
    /// Pause after reading the upload, before sending headers.
    pub respond_after: Duration,
}

impl Script {
    pub fn chunks(chunks: Vec<String>) -> Self {
        Self {
            status: StatusCode::OK,
            chunks,
            delay: Duration::from_millis(5),
            hold_open: false,
            respond_after: Duration::ZERO,
        }
    }

    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            chunks: vec!["data: {\"type\":\"step_start\",\"step\":1,\"message\":\"x\"}\n".into()],
            delay: Duration::ZERO,
            hold_open: false,
            respond_after: Duration::ZERO,
        }
    }

    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn respond_after(mut self, pause: Duration) -> Self {
        self.respond_after = pause;
        self
    }
}

/// One upload as seen by the server.
#[derive(Debug, Clone, Default)]
pub struct Captured {
    pub request_id: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub image: Vec<u8>,
    pub condition: Option<String>,
    pub email: Option<String>,
}

#[derive(Clone)]
struct ServerState {
    script: Script,
    captured: Arc<Mutex<Vec<Captured>>>,
}

/// A running stand-in server.
pub struct TestPipeline {
    pub url: String,
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl TestPipeline {
    pub async fn start(script: Script) -> Self {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let state = ServerState {
            script,
            captured: Arc::clone(&captured),
        };

        let app = Router::new()
            .route("/api/diagnose", post(diagnose))
            .route("/api/health", get(health))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            captured,
        }
    }

    pub fn uploads(&self) -> Vec<Captured> {
        self.captured.lock().unwrap().clone()
    }

    /// Wait until the server has read `count` uploads.
    pub async fn wait_for_uploads(&self, count: usize) {
        while self.captured.lock().unwrap().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// A URL nothing is listening on.
pub async fn unused_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub fn input(condition: &str) -> DiagnosisInput {
    DiagnosisInput {
        image: Some(ImageUpload::new("tooth.png", PNG_BYTES.to_vec())),
        condition: condition.into(),
        wants_email: false,
        email: String::new(),
    }
}

/// Format one `data: ` frame followed by the blank separator line.
pub fn frame(json: serde_json::Value) -> String {
    format!("data: {json}\n\n")
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "message": "MaiOpinion API is running",
    }))
}

async fn diagnose(
    State(state): State<ServerState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut captured = Captured {
        request_id: headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        ..Default::default()
    };

    while let Ok(Some(field)) = multipart.next_field().await {
        match field.name().unwrap_or_default().to_string().as_str() {
            "image" => {
                captured.file_name = field.file_name().map(str::to_string);
                captured.content_type = field.content_type().map(str::to_string);
                captured.image = field.bytes().await.unwrap().to_vec();
            }
            "condition" => captured.condition = Some(field.text().await.unwrap()),
            "email" => captured.email = Some(field.text().await.unwrap()),
            _ => {}
        }
    }
    state.captured.lock().unwrap().push(captured);

    let script = state.script;
    tokio::time::sleep(script.respond_after).await;
    let delay = script.delay;
    let body = futures::stream::iter(script.chunks).then(move |chunk| async move {
        tokio::time::sleep(delay).await;
        Ok::<_, Infallible>(chunk)
    });
    let body = if script.hold_open {
        Body::from_stream(body.chain(futures::stream::pending()))
    } else {
        Body::from_stream(body)
    };

    (
        script.status,
        [(CONTENT_TYPE, "text/event-stream")],
        body,
    )
        .into_response()
}
