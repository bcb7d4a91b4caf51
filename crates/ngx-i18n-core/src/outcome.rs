//! Run lifecycle and the final result handed back to the host.

use serde::Serialize;

use crate::obs;

/// Lifecycle of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Parsing,
    Executing,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }

    /// Whether `self → next` is a legal forward transition.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Parsing)
                | (Parsing, Executing)
                | (Parsing, Succeeded)
                | (Parsing, Failed)
                | (Executing, Succeeded)
                | (Executing, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Parsing => "parsing",
            RunState::Executing => "executing",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal run state transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: RunState,
    pub to: RunState,
}

/// Enforces forward-only [`RunState`] transitions and logs each one.
#[derive(Debug)]
pub struct Lifecycle {
    run_id: String,
    state: RunState,
}

impl Lifecycle {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn advance(&mut self, next: RunState) -> Result<(), IllegalTransition> {
        if !self.state.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        obs::emit_state_transition(&self.run_id, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Move to `Succeeded` or `Failed`, whichever `success` names.
    pub fn finish(&mut self, success: bool) -> Result<(), IllegalTransition> {
        self.advance(if success {
            RunState::Succeeded
        } else {
            RunState::Failed
        })
    }
}

/// What the host needs to end the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitOutcome {
    pub code: i32,
    pub stderr_emitted: bool,
    pub state: RunState,
}

impl ExitOutcome {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}
