//! State machine for tracking a publish/export attempt
//!
//! Every attempt walks `Idle → Validating → (Rejected | Building) → Running →
//! (Succeeded | Failed) → Idle`. Transitions are timestamped so a report can
//! show how long each phase took.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task executor state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Idle,
    Validating,
    Rejected,
    Building,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    /// States reachable from this one
    pub fn successors(&self) -> &'static [TaskState] {
        match self {
            TaskState::Idle => &[TaskState::Validating],
            TaskState::Validating => &[TaskState::Rejected, TaskState::Building],
            TaskState::Building => &[TaskState::Running, TaskState::Failed],
            TaskState::Running => &[TaskState::Succeeded, TaskState::Failed],
            TaskState::Rejected | TaskState::Succeeded | TaskState::Failed => &[TaskState::Idle],
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Rejected | TaskState::Succeeded | TaskState::Failed
        )
    }
}

/// State transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateTransition {
    pub from: TaskState,
    pub to: TaskState,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// In-memory state machine of the task executor
#[derive(Debug)]
pub struct TaskStateMachine {
    current_state: TaskState,
    transitions: Vec<StateTransition>,
}

impl Default for TaskStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: TaskState::Idle,
            transitions: Vec::new(),
        }
    }

    /// Move to `to`; illegal transitions are refused and return `false`
    pub fn transition(&mut self, to: TaskState, note: Option<String>) -> bool {
        if !self.current_state.successors().contains(&to) {
            tracing::warn!(from = ?self.current_state, to = ?to, "illegal task state transition");
            return false;
        }

        self.transitions.push(StateTransition {
            from: self.current_state,
            to,
            timestamp: Utc::now(),
            note,
        });
        self.current_state = to;
        true
    }

    /// Return to `Idle` from a terminal state and forget the previous attempt
    pub fn reset(&mut self) {
        if self.current_state.is_terminal() {
            self.transition(TaskState::Idle, None);
        }
        self.transitions.clear();
        self.current_state = TaskState::Idle;
    }

    pub fn get_state(&self) -> TaskState {
        self.current_state
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    /// Milliseconds between the first and last transition
    pub fn get_elapsed_time(&self) -> i64 {
        match (self.transitions.first(), self.transitions.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_milliseconds(),
            _ => 0,
        }
    }

    /// Get transition history as human-readable string
    pub fn get_history(&self) -> String {
        self.transitions
            .iter()
            .map(|t| {
                let note = t
                    .note
                    .as_ref()
                    .map(|n| format!(" ({})", n))
                    .unwrap_or_default();
                format!("{}: {:?} → {:?}{}", t.timestamp.to_rfc3339(), t.from, t.to, note)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
