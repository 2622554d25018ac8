//! Client-observable state of one submission.

use serde::{Serialize, Serializer};

use crate::report::FinalReport;
use crate::steps::{Step, StepId, StepRegistry, StepStatus};

/// Aggregate state of a submission as seen by a display layer.
///
/// Created empty, replaced by [`Outcome::started`] when a submission
/// begins, and mutated only through the transitions in
/// [`crate::machine`]. Observers receive clones; they never hold a
/// mutable reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Outcome {
    pub(crate) processing: bool,
    #[serde(serialize_with = "serialize_steps")]
    pub(crate) steps: Option<StepRegistry>,
    pub(crate) current_step: Option<StepId>,
    pub(crate) report: Option<FinalReport>,
    pub(crate) error: Option<String>,
}

impl Outcome {
    /// The idle, empty outcome shown before any submission and after a
    /// reset.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A fresh outcome for a submission that passed validation: five
    /// pending steps, the pointer on the first stage, processing.
    pub fn started() -> Self {
        Self {
            processing: true,
            steps: Some(StepRegistry::new()),
            current_step: Some(StepId::FIRST),
            report: None,
            error: None,
        }
    }

    pub fn processing(&self) -> bool {
        self.processing
    }

    /// All stages in pipeline order; empty before the first submission.
    pub fn steps(&self) -> &[Step] {
        self.steps.as_ref().map_or(&[], StepRegistry::as_slice)
    }

    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.steps.as_ref().map(|r| r.get(id))
    }

    pub fn step_status(&self, id: StepId) -> Option<StepStatus> {
        self.step(id).map(|s| s.status)
    }

    pub fn current_step(&self) -> Option<StepId> {
        self.current_step
    }

    pub fn report(&self) -> Option<&FinalReport> {
        self.report.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether nothing has been submitted since creation or the last
    /// reset.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether a terminal envelope or fault has been recorded.
    pub fn is_finished(&self) -> bool {
        self.report.is_some() || self.error.is_some()
    }
}

fn serialize_steps<S: Serializer>(
    steps: &Option<StepRegistry>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    steps
        .as_ref()
        .map_or(&[][..], StepRegistry::as_slice)
        .serialize(serializer)
}
