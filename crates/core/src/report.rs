//! The final diagnostic report.
//!
//! The report is produced by the remote pipeline and passed through
//! untouched. The accessors below only read well-typed fields for
//! display; nothing here validates the shape.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Opaque structured report received with the `complete` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FinalReport(serde_json::Value);

/// Errors from [`FinalReport::export_json`].
#[derive(Debug, thiserror::Error)]
pub enum ReportExportError {
    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write report to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FinalReport {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }

    /// Read a top-level string field, if present and a string.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(serde_json::Value::as_str)
    }

    pub fn diagnosis(&self) -> Option<&str> {
        self.text("diagnosis")
    }

    pub fn confidence(&self) -> Option<&str> {
        self.text("confidence")
    }

    pub fn image_type(&self) -> Option<&str> {
        self.text("image_type")
    }

    pub fn body_part(&self) -> Option<&str> {
        self.text("body_part")
    }

    pub fn finding(&self) -> Option<&str> {
        self.text("finding")
    }

    pub fn treatment(&self) -> Option<&str> {
        self.text("treatment")
    }

    pub fn follow_up(&self) -> Option<&str> {
        self.text("follow_up")
    }

    pub fn timeline(&self) -> Option<&str> {
        self.text("timeline")
    }

    pub fn patient_instructions(&self) -> Option<&str> {
        self.text("patient_instructions")
    }

    /// String entries of the `precautions` list, in order. Non-string
    /// entries are skipped.
    pub fn precautions(&self) -> Vec<&str> {
        self.0
            .get("precautions")
            .and_then(serde_json::Value::as_array)
            .map(|items| items.iter().filter_map(serde_json::Value::as_str).collect())
            .unwrap_or_default()
    }

    /// The report's `timestamp`, if it parses as RFC 3339 or as the
    /// naive ISO form the pipeline emits.
    pub fn timestamp(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let raw = self.text("timestamp")?;
        chrono::DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .or_else(|_| {
                chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .map(|naive| naive.and_utc())
            })
            .ok()
    }

    /// Write the report as pretty-printed JSON into `dir`.
    ///
    /// The file is named `diagnostic_report_<unix-millis>.json`.
    pub fn export_json(&self, dir: &Path) -> Result<PathBuf, ReportExportError> {
        let file_name = format!(
            "diagnostic_report_{}.json",
            chrono::Utc::now().timestamp_millis()
        );
        let path = dir.join(file_name);
        let json = serde_json::to_string_pretty(&self.0)?;

        std::fs::write(&path, json).map_err(|source| ReportExportError::Write {
            path: path.clone(),
            source,
        })?;

        tracing::info!(path = %path.display(), "Diagnostic report exported");
        Ok(path)
    }
}

impl From<serde_json::Value> for FinalReport {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}
