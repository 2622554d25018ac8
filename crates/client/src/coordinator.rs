//! Submission coordinator.
//!
//! [`SubmissionCoordinator`] validates input, opens the diagnosis
//! stream, and runs the read loop that feeds frames through the
//! decoder into the step state machine. It is the single writer of the
//! [`Outcome`]; display layers observe read-only snapshots through
//! [`SubmissionCoordinator::subscribe`].
//!
//! Every submission runs under its own [`CancellationToken`] (a child
//! of the coordinator's master token). [`SubmissionCoordinator::reset`]
//! and a newer submission both cancel it, and a cancelled loop never
//! writes to the outcome again.

use futures::{Stream, StreamExt};
use maiopinion_core::envelope::decode_frame;
use maiopinion_core::error::DiagnosisError;
use maiopinion_core::machine::Transition;
use maiopinion_core::outcome::Outcome;
use maiopinion_core::report::FinalReport;
use maiopinion_core::validation::{DiagnosisInput, DEFAULT_MAX_IMAGE_BYTES};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::{DiagnoseApi, DiagnoseApiError};
use crate::config::{ClientConfig, DEFAULT_MAX_FRAME_BYTES};
use crate::frames::frame_stream;

/// How a submission that did not fail came to an end.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The pipeline sent its final report.
    Report(FinalReport),
    /// The stream closed without a terminal envelope.
    StreamEnded,
    /// A reset, a newer submission, or shutdown cancelled this one.
    Cancelled,
}

/// Owns the outcome of the current submission and the loop that
/// drives it.
pub struct SubmissionCoordinator {
    api: DiagnoseApi,
    max_frame_bytes: usize,
    max_image_bytes: usize,
    outcome: watch::Sender<Outcome>,
    /// Token of the submission currently allowed to write the outcome.
    active: Mutex<CancellationToken>,
    /// Master cancellation token -- cancelled during shutdown.
    shutdown: CancellationToken,
}

impl SubmissionCoordinator {
    pub fn new(api: DiagnoseApi) -> Self {
        let (outcome, _) = watch::channel(Outcome::empty());
        let shutdown = CancellationToken::new();
        let active = Mutex::new(shutdown.child_token());
        Self {
            api,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            outcome,
            active,
            shutdown,
        }
    }

    /// Build a coordinator from configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, DiagnoseApiError> {
        let api = DiagnoseApi::from_config(config)?;
        Ok(Self::new(api)
            .with_max_frame_bytes(config.max_frame_bytes)
            .with_max_image_bytes(config.max_image_bytes))
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    pub fn api(&self) -> &DiagnoseApi {
        &self.api
    }

    /// Receive a snapshot after every applied change.
    pub fn subscribe(&self) -> watch::Receiver<Outcome> {
        self.outcome.subscribe()
    }

    /// Clone of the current outcome.
    pub fn snapshot(&self) -> Outcome {
        self.outcome.borrow().clone()
    }

    pub fn is_processing(&self) -> bool {
        self.outcome.borrow().processing()
    }

    /// Submit one diagnosis and drive it to completion.
    ///
    /// Validation failures are recorded on the outcome and returned
    /// without any network I/O. Otherwise the outcome is replaced by a
    /// fresh five-step registry and the response stream is consumed
    /// until a terminal envelope, end of stream, a fault, or
    /// cancellation. `processing` is cleared on every exit path.
    pub async fn submit(&self, input: DiagnosisInput) -> Result<Completion, DiagnosisError> {
        let submission_id = Uuid::new_v4();

        let validated = match input.validate(self.max_image_bytes) {
            Ok(validated) => validated,
            Err(err) => {
                tracing::info!(%submission_id, error = %err, "Submission rejected by validation");
                self.outcome.send_modify(|o| o.reject(&err));
                return Err(err);
            }
        };

        let cancel = self.begin().await;
        tracing::info!(
            %submission_id,
            image = %validated.image.file_name,
            bytes = validated.image.bytes.len(),
            with_email = validated.email.is_some(),
            "Submitting diagnosis",
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(Completion::Cancelled),
            response = self.api.start_diagnosis(validated, submission_id) => match response {
                Ok(response) => {
                    self.consume(response.bytes_stream(), submission_id, &cancel).await
                }
                Err(e) => Err(e.into()),
            },
        };

        match &result {
            Ok(Completion::Report(_)) => {
                tracing::info!(%submission_id, "Diagnosis completed");
            }
            Ok(Completion::StreamEnded) => {
                tracing::warn!(%submission_id, "Stream ended without a terminal event");
            }
            Ok(Completion::Cancelled) => {
                tracing::info!(%submission_id, "Submission cancelled");
            }
            Err(err) => {
                tracing::error!(
                    %submission_id,
                    kind = ?err.kind(),
                    error = %err,
                    "Diagnosis failed",
                );
                self.write(&cancel, |o| o.fail(err));
            }
        }

        self.write(&cancel, Outcome::finish);
        result
    }

    /// Clear the outcome back to its idle state and cancel any
    /// in-flight submission.
    pub async fn reset(&self) {
        let active = self.active.lock().await;
        active.cancel();
        self.outcome.send_replace(Outcome::empty());
        tracing::debug!("Outcome reset");
    }

    /// Cancel every submission, current and future.
    ///
    /// A cancelled loop can no longer write, so `processing` is cleared
    /// here on its behalf.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.outcome.send_modify(Outcome::finish);
        tracing::info!("Coordinator shut down");
    }

    // ---- private helpers ----

    /// Start a new submission: cancel the previous one, install a fresh
    /// token, and publish the initial five-step outcome. After shutdown
    /// the token is born cancelled and nothing is published.
    async fn begin(&self) -> CancellationToken {
        let mut active = self.active.lock().await;
        active.cancel();
        *active = self.shutdown.child_token();
        if !self.write(&active, |o| *o = Outcome::started()) {
            tracing::warn!("Coordinator is shut down; submission not started");
        }
        active.clone()
    }

    /// Apply `f` unless `cancel` has fired. Returns whether it was
    /// applied.
    ///
    /// The check runs under the outcome lock, so once a reset has
    /// cancelled the token no later write from the stale loop lands.
    fn write(&self, cancel: &CancellationToken, f: impl FnOnce(&mut Outcome)) -> bool {
        self.outcome.send_if_modified(|outcome| {
            if cancel.is_cancelled() {
                return false;
            }
            f(outcome);
            true
        })
    }

    /// The read loop: frames -> envelopes -> state machine.
    pub(crate) async fn consume<S, B, E>(
        &self,
        bytes: S,
        submission_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Completion, DiagnosisError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let frames = frame_stream(bytes, self.max_frame_bytes);
        tokio::pin!(frames);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Completion::Cancelled),
                next = frames.next() => next,
            };

            let Some(frame) = next else {
                return Ok(Completion::StreamEnded);
            };

            let Some(envelope) = decode_frame(&frame?)? else {
                continue;
            };

            tracing::debug!(
                %submission_id,
                event_type = envelope.type_name(),
                "Applying progress event",
            );

            let mut transition = Transition::Continue;
            if !self.write(cancel, |o| transition = o.apply(envelope)) {
                return Ok(Completion::Cancelled);
            }

            match transition {
                Transition::Continue => {}
                Transition::Completed => {
                    return Ok(self
                        .outcome
                        .borrow()
                        .report()
                        .cloned()
                        .map_or(Completion::Cancelled, Completion::Report));
                }
                Transition::Failed(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use assert_matches::assert_matches;
    use maiopinion_core::steps::{StepId, StepStatus};
    use maiopinion_core::validation::ImageUpload;

    use super::*;

    const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01";

    fn coordinator() -> SubmissionCoordinator {
        SubmissionCoordinator::new(DiagnoseApi::new("http://127.0.0.1:9"))
    }

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, Infallible>> {
        let owned: Vec<Result<Vec<u8>, Infallible>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        futures::stream::iter(owned)
    }

    fn statuses(outcome: &Outcome) -> Vec<StepStatus> {
        outcome.steps().iter().map(|s| s.status).collect()
    }

    #[tokio::test]
    async fn consume_applies_events_across_fragmented_reads() {
        let coordinator = coordinator();
        let cancel = coordinator.begin().await;

        let body = chunks(&[
            "data: {\"type\":\"step_start\",\"step\":1,\"mess",
            "age\":\"detecting\"}\n\ndata: {\"type\":\"step_complete\",\"step\":1,",
            "\"message\":\"done\",\"result\":{\"image_type\":\"photo\"}}\n\n",
            "data: {\"type\":\"complete\",\"report\":{\"diagnosis\":\"Caries\"}}\n\n",
        ]);

        let completion = coordinator
            .consume(body, Uuid::new_v4(), &cancel)
            .await
            .unwrap();
        assert_matches!(completion, Completion::Report(ref r) if r.diagnosis() == Some("Caries"));

        let outcome = coordinator.snapshot();
        assert_eq!(outcome.step_status(StepId::FIRST), Some(StepStatus::Completed));
        assert_eq!(outcome.current_step(), None);
        assert!(outcome.report().is_some());
    }

    #[tokio::test]
    async fn consume_stops_at_terminal_event() {
        let coordinator = coordinator();
        let cancel = coordinator.begin().await;

        let body = chunks(&[
            "data: {\"type\":\"error\",\"message\":\"model timeout\"}\n",
            "data: {\"type\":\"step_start\",\"step\":3,\"message\":\"late\"}\n",
        ]);
        let err = coordinator
            .consume(body, Uuid::new_v4(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, DiagnosisError::Pipeline("model timeout".into()));
        assert_eq!(
            coordinator.snapshot().step_status(StepId::new(3).unwrap()),
            Some(StepStatus::Pending)
        );
    }

    #[tokio::test]
    async fn consume_aborts_on_malformed_event() {
        let coordinator = coordinator();
        let cancel = coordinator.begin().await;

        let body = chunks(&[
            "data: {\"type\":\"step_start\",\"step\":1,\"message\":\"a\"}\n",
            "data: {oops\n",
            "data: {\"type\":\"step_complete\",\"step\":1,\"message\":\"b\"}\n",
        ]);
        let err = coordinator
            .consume(body, Uuid::new_v4(), &cancel)
            .await
            .unwrap_err();
        assert_matches!(err, DiagnosisError::MalformedEvent(_));
        assert_eq!(
            coordinator.snapshot().step_status(StepId::FIRST),
            Some(StepStatus::Active)
        );
    }

    #[tokio::test]
    async fn consume_reports_stream_end_without_terminal() {
        let coordinator = coordinator();
        let cancel = coordinator.begin().await;

        let body = chunks(&[
            "data: {\"type\":\"step_start\",\"step\":1,\"message\":\"a\"}\n",
            "data: {\"ty",
        ]);
        let completion = coordinator
            .consume(body, Uuid::new_v4(), &cancel)
            .await
            .unwrap();
        assert_eq!(completion, Completion::StreamEnded);
    }

    #[tokio::test]
    async fn cancelled_loop_does_not_write() {
        let coordinator = coordinator();
        let cancel = coordinator.begin().await;
        coordinator.reset().await;

        let body = chunks(&["data: {\"type\":\"step_start\",\"step\":1,\"message\":\"a\"}\n"]);
        let completion = coordinator
            .consume(body, Uuid::new_v4(), &cancel)
            .await
            .unwrap();
        assert_eq!(completion, Completion::Cancelled);
        assert!(coordinator.snapshot().is_empty());
    }

    #[tokio::test]
    async fn reset_returns_to_idle() {
        let coordinator = coordinator();
        let cancel = coordinator.begin().await;
        assert!(coordinator.is_processing());

        coordinator.write(&cancel, |o| o.fail(&DiagnosisError::Pipeline("x".into())));
        coordinator.reset().await;

        let outcome = coordinator.snapshot();
        assert!(!outcome.processing());
        assert!(outcome.steps().is_empty());
        assert!(outcome.report().is_none());
        assert!(outcome.error().is_none());
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn new_submission_cancels_previous() {
        let coordinator = coordinator();
        let first = coordinator.begin().await;
        let second = coordinator.begin().await;
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(!coordinator.write(&first, |o| o.finish()));
        assert!(coordinator.is_processing());
    }

    #[tokio::test]
    async fn validation_failure_skips_network() {
        let coordinator = coordinator();
        let mut rx = coordinator.subscribe();

        let err = coordinator
            .submit(DiagnosisInput::default())
            .await
            .unwrap_err();
        assert_matches!(err, DiagnosisError::Validation(_));

        assert!(rx.has_changed().unwrap());
        let outcome = rx.borrow_and_update().clone();
        assert!(!outcome.processing());
        assert!(outcome.steps().is_empty());
        assert_eq!(
            outcome.error(),
            Some("Please upload an image and describe the condition")
        );
    }

    #[tokio::test]
    async fn shutdown_cancels_active_submission() {
        let coordinator = coordinator();
        let cancel = coordinator.begin().await;
        coordinator.shutdown();
        assert!(cancel.is_cancelled());
        assert!(!coordinator.is_processing());

        // The read loop's own exit path must not undo the cleared flag.
        let body = chunks(&["data: {\"type\":\"step_start\",\"step\":1,\"message\":\"a\"}\n"]);
        let completion = coordinator
            .consume(body, Uuid::new_v4(), &cancel)
            .await
            .unwrap();
        assert_eq!(completion, Completion::Cancelled);
        assert!(!coordinator.write(&cancel, Outcome::finish));

        let outcome = coordinator.snapshot();
        assert!(!outcome.processing());
        assert_eq!(statuses(&outcome), vec![StepStatus::Pending; 5]);
    }

    #[tokio::test]
    async fn submit_after_shutdown_never_starts() {
        let coordinator = coordinator();
        coordinator.shutdown();

        let input = DiagnosisInput {
            image: Some(ImageUpload::new("scan.png", PNG_BYTES.to_vec())),
            condition: "rash".into(),
            ..Default::default()
        };
        let completion = coordinator.submit(input).await.unwrap();
        assert_eq!(completion, Completion::Cancelled);

        let outcome = coordinator.snapshot();
        assert!(!outcome.processing());
        assert!(outcome.steps().is_empty());
    }
}
