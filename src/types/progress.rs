//! Live progress snapshot of one task.
//!
//! A [`ProgressRecord`] is mutated in place by the orchestrator at every
//! stage transition and read by any number of pollers. All mutators keep
//! two invariants:
//!
//! - `progress` never decreases while the task is active;
//! - `stage` and `progress` change together in a single call, so a reader
//!   never sees one updated without the other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::stage::{InvalidTransition, Stage};

/// Mutable status snapshot for one task.
///
/// # Examples
///
/// ```
/// use archi_pipeline::{ProgressRecord, Stage};
///
/// let mut record = ProgressRecord::new("task-1");
/// assert_eq!(record.stage, Stage::Initialized);
/// assert_eq!(record.progress, 0.0);
///
/// record.enter(Stage::Collecting, "collecting").unwrap();
/// record.advance(0.2, "chunk 1/2 collected");
/// record.advance(0.15, "stale update is ignored");
/// assert_eq!(record.progress, 0.2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Opaque unique task id.
    pub task_id: String,
    /// Current stage.
    pub stage: Stage,
    /// Fraction complete, in `[0, 1]`.
    pub progress: f64,
    /// Human-readable status line.
    pub message: String,
    /// When the task was created.
    pub start_time: DateTime<Utc>,
    /// When the task reached a terminal stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Failure or cancellation reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Free-form metadata (identifier count, failure kind, ...).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ProgressRecord {
    /// Creates a record in the `Initialized` stage at progress `0.0`.
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            stage: Stage::Initialized,
            progress: Stage::Initialized.checkpoint(),
            message: "initializing architecture analysis task".to_string(),
            start_time: Utc::now(),
            end_time: None,
            error_message: None,
            metadata: Map::new(),
        }
    }

    /// Returns `true` once the record reached `Completed` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Enters `stage`, jumping progress to its checkpoint.
    ///
    /// Terminal stages also stamp `end_time`. Entering `Failed` should go
    /// through [`fail`](Self::fail) so that the error is recorded.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if the state machine forbids the move;
    /// the record is left untouched.
    pub fn enter(
        &mut self,
        stage: Stage,
        message: impl Into<String>,
    ) -> Result<(), InvalidTransition> {
        self.stage.validate_transition(&stage)?;
        self.stage = stage;
        self.progress = self.progress.max(stage.checkpoint());
        self.message = message.into();
        if stage.is_terminal() {
            self.end_time = Some(Utc::now());
        }
        Ok(())
    }

    /// Reports intermediate progress without changing stage.
    ///
    /// Non-finite values and values below the current progress are
    /// ignored (the message is still updated); values above `1.0` are
    /// clamped. No-op on a terminal record.
    pub fn advance(&mut self, progress: f64, message: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        if progress.is_finite() {
            self.progress = self.progress.max(progress.clamp(0.0, 1.0));
        }
        self.message = message.into();
    }

    /// Moves to `Failed` with `error` recorded, stamping `end_time`.
    ///
    /// No-op if the record is already terminal.
    pub fn fail(&mut self, message: impl Into<String>, error: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.stage = Stage::Failed;
        self.progress = Stage::Failed.checkpoint();
        self.message = message.into();
        self.error_message = Some(error.into());
        self.end_time = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn enter_sets_stage_and_checkpoint_together() {
        let mut record = ProgressRecord::new("t");
        record.enter(Stage::Collecting, "collecting").unwrap();
        assert_eq!(record.stage, Stage::Collecting);
        assert_eq!(record.progress, 0.1);
        assert!(record.end_time.is_none());
    }

    #[test]
    fn enter_rejects_skips_without_mutating() {
        let mut record = ProgressRecord::new("t");
        let before = record.clone();
        assert!(record.enter(Stage::Analyzing, "nope").is_err());
        assert_eq!(record, before);
    }

    #[test]
    fn enter_keeps_higher_intermediate_progress() {
        let mut record = ProgressRecord::new("t");
        record.enter(Stage::Collecting, "c").unwrap();
        record.advance(0.3, "all chunks");
        record.enter(Stage::Processing, "p").unwrap();
        assert_eq!(record.progress, 0.4);
    }

    #[test]
    fn advance_ignores_regressions_and_nan() {
        let mut record = ProgressRecord::new("t");
        record.enter(Stage::Collecting, "c").unwrap();
        record.advance(0.25, "a");
        record.advance(0.2, "b");
        record.advance(f64::NAN, "c");
        assert_eq!(record.progress, 0.25);
        assert_eq!(record.message, "c");
        record.advance(7.0, "d");
        assert_eq!(record.progress, 1.0);
    }

    #[test]
    fn completion_stamps_end_time() {
        let mut record = ProgressRecord::new("t");
        for stage in [
            Stage::Collecting,
            Stage::Processing,
            Stage::Analyzing,
            Stage::GeneratingReport,
            Stage::Completed,
        ] {
            record.enter(stage, stage.to_string()).unwrap();
        }
        assert!(record.is_terminal());
        assert!(record.end_time.is_some());
        assert_eq!(record.progress, 1.0);
    }

    #[test]
    fn fail_is_terminal_and_sticky() {
        let mut record = ProgressRecord::new("t");
        record.fail("analysis failed", "boom");
        record.fail("second", "ignored");
        record.advance(0.5, "late");
        assert_eq!(record.stage, Stage::Failed);
        assert_eq!(record.error_message.as_deref(), Some("boom"));
        assert_eq!(record.message, "analysis failed");
        assert_eq!(record.progress, 1.0);
    }
}
