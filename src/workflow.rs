//! Run state for one research query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A research run: one query moving through the agent's stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRun {
    /// Unique run ID.
    pub id: String,
    /// The user query.
    pub query: String,
    /// Current state.
    pub state: RunState,
    /// Finished stages, in order.
    pub steps: Vec<StepRecord>,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// When the run was last updated.
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    stage_started: Option<DateTime<Utc>>,
}

impl ResearchRun {
    /// Create a new run awaiting its query.
    pub fn new(query: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            query: query.into(),
            state: RunState::AwaitingQuery,
            steps: Vec::new(),
            created_at: now,
            updated_at: now,
            stage_started: None,
        }
    }

    /// Move to `next`, which must directly follow the current state.
    pub fn advance_to(&mut self, next: RunState) -> Result<()> {
        if self.state.next() != Some(next.clone()) {
            return Err(Error::InvalidState(format!(
                "cannot move from {} to {}",
                self.state, next
            )));
        }

        let now = Utc::now();
        self.close_stage(now);
        self.state = next;
        self.stage_started = (!self.state.is_terminal()).then_some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Set run to failed state.
    pub fn fail(&mut self, reason: impl Into<String>) {
        let now = Utc::now();
        self.close_stage(now);
        self.state = RunState::failed(reason);
        self.stage_started = None;
        self.updated_at = now;
    }

    /// Check if the run has finished, successfully or not.
    pub fn is_complete(&self) -> bool {
        self.state.is_terminal()
    }

    /// Total time spent in recorded stages.
    pub fn duration_ms(&self) -> u64 {
        self.steps.iter().map(|s| s.duration_ms).sum()
    }

    fn close_stage(&mut self, now: DateTime<Utc>) {
        if let Some(started) = self.stage_started.take() {
            let elapsed = (now - started).num_milliseconds().max(0) as u64;
            self.steps.push(StepRecord {
                state: self.state.clone(),
                duration_ms: elapsed,
            });
        }
    }
}

/// State of a research run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status")]
pub enum RunState {
    #[serde(rename = "awaiting_query")]
    AwaitingQuery,
    #[serde(rename = "fetching_template")]
    FetchingTemplate,
    #[serde(rename = "searching")]
    Searching,
    #[serde(rename = "summarizing")]
    Summarizing,
    #[serde(rename = "storing")]
    Storing,
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "failed")]
    Failed { reason: String },
}

impl RunState {
    /// Build a failed state.
    pub fn failed(reason: impl Into<String>) -> Self {
        RunState::Failed {
            reason: reason.into(),
        }
    }

    /// The only state reachable by a successful step.
    pub fn next(&self) -> Option<RunState> {
        match self {
            RunState::AwaitingQuery => Some(RunState::FetchingTemplate),
            RunState::FetchingTemplate => Some(RunState::Searching),
            RunState::Searching => Some(RunState::Summarizing),
            RunState::Summarizing => Some(RunState::Storing),
            RunState::Storing => Some(RunState::Done),
            RunState::Done | RunState::Failed { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed { .. })
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::AwaitingQuery => write!(f, "awaiting query"),
            RunState::FetchingTemplate => write!(f, "fetching template"),
            RunState::Searching => write!(f, "searching"),
            RunState::Summarizing => write!(f, "summarizing"),
            RunState::Storing => write!(f, "storing"),
            RunState::Done => write!(f, "done"),
            RunState::Failed { reason } => write!(f, "failed ({})", reason),
        }
    }
}

/// Time spent in one finished stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub state: RunState,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_creation() {
        let run = ResearchRun::new("weather in Paris");
        assert_eq!(run.state, RunState::AwaitingQuery);
        assert!(run.steps.is_empty());
        assert!(!run.is_complete());
    }

    #[test]
    fn test_linear_advance() {
        let mut run = ResearchRun::new("q");
        for state in [
            RunState::FetchingTemplate,
            RunState::Searching,
            RunState::Summarizing,
            RunState::Storing,
            RunState::Done,
        ] {
            run.advance_to(state).unwrap();
        }
        assert!(run.is_complete());
        let recorded: Vec<_> = run.steps.iter().map(|s| s.state.clone()).collect();
        assert_eq!(
            recorded,
            vec![
                RunState::FetchingTemplate,
                RunState::Searching,
                RunState::Summarizing,
                RunState::Storing,
            ]
        );
    }

    #[test]
    fn test_skipping_a_state_is_rejected() {
        let mut run = ResearchRun::new("q");
        let err = run.advance_to(RunState::Searching).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(run.state, RunState::AwaitingQuery);
    }

    #[test]
    fn test_failure_is_terminal() {
        let mut run = ResearchRun::new("q");
        run.advance_to(RunState::FetchingTemplate).unwrap();
        run.fail("template missing");

        assert_eq!(run.state, RunState::failed("template missing"));
        assert!(run.is_complete());
        assert_eq!(run.steps.len(), 1);
        assert!(run.advance_to(RunState::Searching).is_err());
    }

    #[test]
    fn test_state_wire_format() {
        let wire = serde_json::to_value(RunState::failed("boom")).unwrap();
        assert_eq!(wire, serde_json::json!({"status": "failed", "reason": "boom"}));
    }
}
