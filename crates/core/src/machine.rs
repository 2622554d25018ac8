//! Step state machine.
//!
//! Applies decoded [`Envelope`]s to an [`Outcome`]. This is the only
//! code that mutates steps. The server is trusted to sequence
//! `step_start` events so that at most one stage is active; a second
//! concurrent activation is logged, not prevented.

use crate::envelope::Envelope;
use crate::error::DiagnosisError;
use crate::outcome::Outcome;
use crate::steps::{StepId, StepStatus};

/// What the read loop should do after an envelope has been applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Keep reading.
    Continue,
    /// `complete` was applied; the report is available.
    Completed,
    /// `error` was applied; active stages are now marked failed.
    Failed(DiagnosisError),
}

impl Transition {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Continue)
    }
}

impl Outcome {
    /// Apply one envelope in stream order.
    ///
    /// Stage updates that would break the pending -> active ->
    /// completed/error lifecycle are ignored with a warning.
    pub fn apply(&mut self, envelope: Envelope) -> Transition {
        match envelope {
            Envelope::StepStart { step, message } => {
                self.start_step(step, message);
                Transition::Continue
            }
            Envelope::StepComplete {
                step,
                message,
                result,
            } => {
                self.complete_step(step, message, result);
                Transition::Continue
            }
            Envelope::Complete { report } => {
                self.report = Some(report);
                self.current_step = None;
                self.processing = false;
                Transition::Completed
            }
            Envelope::Error { message } => {
                let err = DiagnosisError::Pipeline(message);
                self.fail(&err);
                Transition::Failed(err)
            }
        }
    }

    /// Record a terminal failure: every active stage moves to error,
    /// all others keep their status.
    pub fn fail(&mut self, err: &DiagnosisError) {
        if let Some(registry) = self.steps.as_mut() {
            for step in registry.iter_mut() {
                if step.status == StepStatus::Active {
                    step.status = StepStatus::Error;
                }
            }
        }
        self.error = Some(err.to_string());
        self.processing = false;
    }

    /// Record a failure detected before anything was sent. Steps are
    /// left as they were.
    pub fn reject(&mut self, err: &DiagnosisError) {
        self.error = Some(err.to_string());
    }

    /// Leave the processing state. Called on every exit path of the
    /// read loop.
    pub fn finish(&mut self) {
        self.processing = false;
    }

    fn start_step(&mut self, id: StepId, message: String) {
        let Some(registry) = self.steps.as_mut() else {
            tracing::warn!(step = %id, "step_start before submission started");
            return;
        };

        let others_active: Vec<StepId> = registry
            .active_ids()
            .into_iter()
            .filter(|other| *other != id)
            .collect();
        if !others_active.is_empty() {
            tracing::warn!(
                step = %id,
                ?others_active,
                "Stage started while another stage is still active",
            );
        }

        let step = registry.get_mut(id);
        let status = step.status;
        match status {
            StepStatus::Active => {
                step.message = message;
            }
            _ if status.can_transition_to(StepStatus::Active) => {
                step.status = StepStatus::Active;
                step.message = message;
            }
            _ => {
                tracing::warn!(step = %id, %status, "Ignoring step_start for a finished stage");
                return;
            }
        }
        self.current_step = Some(id);
    }

    fn complete_step(&mut self, id: StepId, message: String, result: Option<serde_json::Value>) {
        let Some(registry) = self.steps.as_mut() else {
            tracing::warn!(step = %id, "step_complete before submission started");
            return;
        };

        let step = registry.get_mut(id);
        if !step.status.can_transition_to(StepStatus::Completed) {
            tracing::warn!(
                step = %id,
                status = %step.status,
                "Ignoring step_complete for a stage that is not active",
            );
            return;
        }
        step.status = StepStatus::Completed;
        step.message = message;
        step.result = result;
    }
}
