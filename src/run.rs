//! Run lifecycle types and the observable event stream.
//!
//! A `RunState` is the accumulated record of one task execution: ordered
//! captures, status, timing, and error. The capture graph is its only
//! mutator; once the status reaches a terminal value the record is frozen.
//! `RunEvent` is the typed event stream the graph emits for observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, not started
    Pending,
    /// Step loop in progress
    Running,
    /// All steps resolved without a fatal failure
    Completed,
    /// A fatal step failure or unhandled error ended the run
    Failed,
}

impl RunStatus {
    /// Whether the status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

/// One committed, labeled screenshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capture {
    /// Unique id within the run
    pub state_id: String,

    /// Index of the step that produced this capture
    pub step_index: usize,

    /// Path of the saved screenshot
    pub screenshot_path: PathBuf,

    /// Optional caption describing the captured state
    pub caption: Option<String>,

    /// Name of the detector whose signal won the decision
    pub detector_name: String,

    /// Final decision confidence
    pub confidence: f64,

    /// When the capture was committed
    pub timestamp: DateTime<Utc>,
}

/// The accumulated record of one task execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Batch identity: shared by every task executed in one invocation
    pub run_id: String,

    /// Application the task ran against
    pub app: String,

    /// Task identifier
    pub task_id: String,

    /// Lifecycle status
    pub status: RunStatus,

    /// Committed captures, in step-execution order
    pub captures: Vec<Capture>,

    /// When the run started
    pub start_time: DateTime<Utc>,

    /// When the run reached a terminal status
    pub end_time: Option<DateTime<Utc>>,

    /// The causing error, when `status` is `Failed`
    pub error: Option<String>,
}

impl RunState {
    /// A pending run for one task
    pub fn new(run_id: &str, app: &str, task_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            app: app.to_string(),
            task_id: task_id.to_string(),
            status: RunStatus::Pending,
            captures: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
            error: None,
        }
    }

    /// Total run duration in milliseconds, up to now for a live run
    pub fn duration_ms(&self) -> i64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_milliseconds()
    }
}

/// The typed event stream emitted by the capture graph
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// The run entered the step loop
    RunStarted { run_id: String, task_id: String },

    /// A step's action is about to execute
    StepStarted {
        step: usize,
        action: String,
        target: String,
    },

    /// A detector fired during polling
    DetectorFired {
        step: usize,
        detector: String,
        confidence: f64,
    },

    /// The VLM is being consulted
    VlmVerifying { step: usize, question: String },

    /// A capture was committed
    StateCaptured {
        state_id: String,
        step: usize,
        detector: String,
        confidence: f64,
        caption: Option<String>,
    },

    /// A verification verdict rejected the observed state
    CaptureRejected { step: usize, reason: String },

    /// Terminal: the run completed
    RunCompleted { captures: usize, duration_ms: i64 },

    /// Terminal: the run failed
    RunFailed { error: String },

    /// A non-fatal error worth surfacing to observers
    Error { message: String },
}

impl RunEvent {
    /// Whether this is one of the two terminal events
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::RunCompleted { .. } | RunEvent::RunFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = RunEvent::DetectorFired {
            step: 2,
            detector: "form_ready".to_string(),
            confidence: 0.95,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "detector_fired");
        assert_eq!(json["detector"], "form_ready");
    }

    #[test]
    fn test_run_state_new_is_pending() {
        let state = RunState::new("2026-08-29_10-00-00", "linear", "create_issue");
        assert_eq!(state.status, RunStatus::Pending);
        assert!(state.captures.is_empty());
        assert!(state.end_time.is_none());
    }
}
