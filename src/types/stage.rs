//! Pipeline stage state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One named phase of the pipeline.
///
/// # State Machine
///
/// ```text
/// Initialized -> Collecting -> Processing -> Analyzing -> GeneratingReport -> Completed
/// any non-terminal stage -> Failed
/// Completed, Failed -> (terminal, no transitions)
/// ```
///
/// Every stage has a fixed progress [`checkpoint`](Stage::checkpoint) that the
/// progress record jumps to on entry.
///
/// # Examples
///
/// ```
/// use archi_pipeline::Stage;
///
/// assert!(Stage::Collecting.can_transition_to(&Stage::Processing));
/// assert!(Stage::Analyzing.can_transition_to(&Stage::Failed));
/// assert!(!Stage::Processing.can_transition_to(&Stage::Collecting));
/// assert_eq!(Stage::Analyzing.checkpoint(), 0.7);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Task created, nothing has run yet.
    Initialized,
    /// Fetching records from the collection gateway.
    Collecting,
    /// Validating and cleaning collected records.
    Processing,
    /// Waiting on the analyzer.
    Analyzing,
    /// Writing the report through the report sink.
    GeneratingReport,
    /// Finished successfully (terminal).
    Completed,
    /// Finished with an error or cancelled (terminal).
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::Collecting => write!(f, "collecting"),
            Self::Processing => write!(f, "processing"),
            Self::Analyzing => write!(f, "analyzing"),
            Self::GeneratingReport => write!(f, "generating_report"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl Stage {
    /// All stages in pipeline order, `Failed` last.
    pub const ALL: [Stage; 7] = [
        Self::Initialized,
        Self::Collecting,
        Self::Processing,
        Self::Analyzing,
        Self::GeneratingReport,
        Self::Completed,
        Self::Failed,
    ];

    /// Progress value the record is set to when this stage is entered.
    pub fn checkpoint(&self) -> f64 {
        match self {
            Self::Initialized => 0.0,
            Self::Collecting => 0.1,
            Self::Processing => 0.4,
            Self::Analyzing => 0.7,
            Self::GeneratingReport => 0.9,
            Self::Completed | Self::Failed => 1.0,
        }
    }

    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The stage that follows this one on the success path.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Self::Initialized => Some(Self::Collecting),
            Self::Collecting => Some(Self::Processing),
            Self::Processing => Some(Self::Analyzing),
            Self::Analyzing => Some(Self::GeneratingReport),
            Self::GeneratingReport => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }

    /// Returns `true` if moving from this stage to `next` is allowed.
    ///
    /// Self-transitions are allowed for non-terminal stages so that
    /// intermediate progress (collection chunks) can be reported without
    /// changing stage.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self == next || *next == Self::Failed || self.next() == Some(*next)
    }

    /// Validates a transition, naming both ends on rejection.
    pub fn validate_transition(&self, next: &Self) -> Result<(), InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: *self,
                to: *next,
            })
        }
    }
}

/// A rejected stage transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid stage transition from {from} to {to}")]
pub struct InvalidTransition {
    /// Stage the record was in.
    pub from: Stage,
    /// Stage that was requested.
    pub to: Stage,
}
