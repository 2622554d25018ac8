//! The fixed catalog of pipeline stages.
//!
//! The remote pipeline always runs the same five stages in the same
//! order. [`StepRegistry`] owns one [`Step`] per stage; it never grows,
//! shrinks, or reorders, and only the state machine in
//! [`crate::machine`] mutates it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of stages in the diagnostic pipeline.
pub const STEP_COUNT: usize = 5;

/// Display labels for each stage, indexed by `id - 1`.
pub const STEP_NAMES: [&str; STEP_COUNT] = [
    "Image Detection",
    "Specialized Diagnosis",
    "Clinical Reasoning",
    "Treatment Planning",
    "Follow-Up Care",
];

// ---------------------------------------------------------------------------
// StepId
// ---------------------------------------------------------------------------

/// A validated stage identifier in `1..=5`.
///
/// Deserializing an out-of-range number fails, so a frame naming an
/// unknown stage is rejected at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct StepId(u8);

impl StepId {
    pub const FIRST: StepId = StepId(1);
    pub const LAST: StepId = StepId(STEP_COUNT as u8);

    pub fn new(id: u8) -> Option<Self> {
        (1..=STEP_COUNT as u8).contains(&id).then_some(Self(id))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Iterate over every stage id in pipeline order.
    pub fn all() -> impl Iterator<Item = StepId> {
        (1..=STEP_COUNT as u8).map(StepId)
    }

    fn index(self) -> usize {
        usize::from(self.0) - 1
    }
}

impl TryFrom<u8> for StepId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("step {value} is outside 1..={STEP_COUNT}"))
    }
}

impl From<StepId> for u8 {
    fn from(id: StepId) -> u8 {
        id.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// StepStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Error,
}

impl StepStatus {
    /// Whether the stage may move from `self` to `next`.
    ///
    /// Only pending -> active, active -> completed and active -> error
    /// are legal.
    pub fn can_transition_to(self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active) | (Self::Active, Self::Completed | Self::Error)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Step / StepRegistry
// ---------------------------------------------------------------------------

/// One pipeline stage as observed by the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub id: StepId,
    pub name: &'static str,
    pub status: StepStatus,
    /// Latest server-reported status text; empty until first touched.
    pub message: String,
    /// Opaque payload attached when the stage completes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl Step {
    fn pending(id: StepId) -> Self {
        Self {
            id,
            name: STEP_NAMES[id.index()],
            status: StepStatus::Pending,
            message: String::new(),
            result: None,
        }
    }
}

/// The five stages of one submission, always in pipeline order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StepRegistry {
    steps: [Step; STEP_COUNT],
}

impl StepRegistry {
    /// A registry with every stage pending.
    pub fn new() -> Self {
        Self {
            steps: [1, 2, 3, 4, 5].map(|id| Step::pending(StepId(id))),
        }
    }

    pub fn get(&self, id: StepId) -> &Step {
        &self.steps[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: StepId) -> &mut Step {
        &mut self.steps[id.index()]
    }

    pub fn as_slice(&self) -> &[Step] {
        &self.steps
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Step> {
        self.steps.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Step> {
        self.steps.iter_mut()
    }

    /// Ids of every stage currently marked active.
    pub fn active_ids(&self) -> Vec<StepId> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Active)
            .map(|s| s.id)
            .collect()
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> IntoIterator for &'a StepRegistry {
    type Item = &'a Step;
    type IntoIter = std::slice::Iter<'a, Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
