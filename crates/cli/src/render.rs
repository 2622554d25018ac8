//! Plain-text rendering of outcome snapshots.
//!
//! Snapshots arrive whole; [`StepPrinter`] remembers what it already
//! printed so each stage change produces exactly one line.

use std::fmt::Write as _;

use maiopinion_core::outcome::Outcome;
use maiopinion_core::report::FinalReport;
use maiopinion_core::steps::{Step, StepStatus, STEP_COUNT};

pub fn marker(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "[ ]",
        StepStatus::Active => "[>]",
        StepStatus::Completed => "[x]",
        StepStatus::Error => "[!]",
    }
}

/// `STEP n/5 [x] Name - message`
pub fn step_line(step: &Step) -> String {
    let mut line = format!(
        "STEP {}/{} {} {}",
        step.id,
        STEP_COUNT,
        marker(step.status),
        step.name
    );
    if !step.message.is_empty() {
        let _ = write!(line, " - {}", step.message);
    }
    if let Some(result) = step.result.as_ref().and_then(|r| r.as_str()) {
        let _ = write!(line, " ({result})");
    }
    line
}

/// Emits a line for every stage whose status or message changed since
/// the previous snapshot.
#[derive(Debug, Default)]
pub struct StepPrinter {
    seen: Vec<(StepStatus, String)>,
}

impl StepPrinter {
    pub fn update(&mut self, outcome: &Outcome) -> Vec<String> {
        let steps = outcome.steps();
        if steps.is_empty() {
            self.seen.clear();
            return Vec::new();
        }
        if self.seen.len() != steps.len() {
            self.seen = steps
                .iter()
                .map(|_| (StepStatus::Pending, String::new()))
                .collect();
        }

        let mut lines = Vec::new();
        for (step, seen) in steps.iter().zip(self.seen.iter_mut()) {
            if seen.0 != step.status || seen.1 != step.message {
                *seen = (step.status, step.message.clone());
                lines.push(step_line(step));
            }
        }
        lines
    }
}

/// Human-readable summary of the final report.
pub fn report_summary(report: &FinalReport) -> String {
    let mut out = String::from("DIAGNOSTIC REPORT\n");

    let fields = [
        ("Diagnosis", report.diagnosis()),
        ("Confidence", report.confidence()),
        ("Image type", report.image_type()),
        ("Body part", report.body_part()),
        ("Finding", report.finding()),
        ("Treatment", report.treatment()),
        ("Follow-up", report.follow_up()),
        ("Timeline", report.timeline()),
        ("Instructions", report.patient_instructions()),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            let _ = writeln!(out, "  {label}: {value}");
        }
    }

    let precautions = report.precautions();
    if !precautions.is_empty() {
        out.push_str("  Precautions:\n");
        for item in precautions {
            let _ = writeln!(out, "    - {item}");
        }
    }
    if let Some(ts) = report.timestamp() {
        let _ = writeln!(out, "  Generated: {}", ts.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    out
}
