//! Final, immutable outcome of a pipeline task.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::analysis::AnalysisResult;
use super::progress::ProgressRecord;
use super::record::AppRecord;

/// Outcome of one pipeline run, owned by the caller once returned.
///
/// Either `success` is `true` and `analysis`, `report_location` and
/// `records` are populated, or it is `false` and `error_message` says why.
/// `progress_history` holds every snapshot the task went through, ending
/// with the terminal one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_location: Option<String>,
    /// Accepted (collected and cleaned) records.
    #[serde(default)]
    pub records: Vec<AppRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Wall-clock time from submission to the terminal transition.
    pub elapsed: Duration,
    #[serde(default)]
    pub progress_history: Vec<ProgressRecord>,
}

impl TaskResult {
    /// Elapsed processing time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// The terminal snapshot, if history was retained.
    pub fn final_progress(&self) -> Option<&ProgressRecord> {
        self.progress_history.last()
    }
}
