//! Loop runner module - the ReAct reasoning loop controller.
//!
//! This module provides:
//! - LoopRunner for driving one loop to a final answer or a terminal failure
//! - LoopState and LoopPhase, the explicit state machine
//! - LoopReport with the outcome, counters and transcript

mod loop_runner;
mod state;

pub use loop_runner::{LoopOutcome, LoopReport, LoopRunner, LoopRunnerConfig, OBSERVATION_STOP};
pub use state::{LoopPhase, LoopState};
