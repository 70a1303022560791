//! Reasoning loop state machine

use serde::Serialize;

use crate::error::AgentError;

/// Phase of a reasoning loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Init,
    Thinking,
    Acting,
    Observing,
    Done,
    Failed,
}

impl LoopPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopPhase::Done | LoopPhase::Failed)
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: LoopPhase) -> bool {
        use LoopPhase::*;
        match (self, next) {
            (Init, Thinking) | (Init, Failed) => true,
            // Thinking -> Thinking retries after malformed output
            (Thinking, Thinking | Acting | Done | Failed) => true,
            (Acting, Observing | Failed) => true,
            (Observing, Thinking | Failed) => true,
            _ => false,
        }
    }
}

/// Counters and phase for one loop
#[derive(Debug, Clone, Serialize)]
pub struct LoopState {
    pub phase: LoopPhase,
    /// Oracle calls made so far
    pub step: u32,
    /// Steps that produced no usable action
    pub malformed: u32,
    pub max_steps: u32,
    pub max_malformed_steps: u32,
}

impl LoopState {
    pub fn new(max_steps: u32, max_malformed_steps: u32) -> Self {
        Self {
            phase: LoopPhase::Init,
            step: 0,
            malformed: 0,
            max_steps,
            max_malformed_steps,
        }
    }

    /// Move to `next`.
    ///
    /// Returns false (and stays put) for an illegal transition, which includes
    /// any transition out of a terminal phase.
    pub fn advance(&mut self, next: LoopPhase) -> bool {
        if self.phase.can_transition_to(next) {
            self.phase = next;
            true
        } else {
            false
        }
    }

    /// Claim the next step, or fail once `max_steps` have been used
    pub fn begin_step(&mut self) -> Result<u32, AgentError> {
        if self.step >= self.max_steps {
            return Err(AgentError::StepLimitExceeded {
                max_steps: self.max_steps,
            });
        }
        self.step += 1;
        Ok(self.step)
    }

    /// Count a malformed step, failing once the budget is exceeded
    pub fn record_malformed(&mut self) -> Result<(), AgentError> {
        self.malformed += 1;
        if self.malformed > self.max_malformed_steps {
            return Err(AgentError::MalformedStepBudgetExceeded {
                malformed: self.malformed,
                budget: self.max_malformed_steps,
            });
        }
        Ok(())
    }
}
