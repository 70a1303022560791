//! Transcript - the per-request reasoning history
//!
//! The header (instructions, tool catalog, question) is fixed at creation and
//! always rendered. Steps are appended in order and never edited. When a render
//! exceeds the token budget, the oldest groups are dropped and replaced by a single
//! elision marker line. A group is everything up to and including an
//! observation, so a kept observation always comes with the action that
//! produced it.

use serde::{Deserialize, Serialize};

use crate::llm::estimate_tokens;

/// Line standing in for steps dropped from a budgeted render
pub const ELISION_MARKER: &str = "[... earlier steps omitted to fit the context window ...]";

/// Cue that ends every render, prompting the oracle's next thought
pub const THOUGHT_CUE: &str = "Thought:";

/// One entry in the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    Thought { text: String },
    Action { tool: String, input: String },
    Observation { text: String },
}

impl Step {
    pub fn thought(text: impl Into<String>) -> Self {
        Self::Thought { text: text.into() }
    }

    pub fn action(tool: impl Into<String>, input: impl Into<String>) -> Self {
        Self::Action {
            tool: tool.into(),
            input: input.into(),
        }
    }

    pub fn observation(text: impl Into<String>) -> Self {
        Self::Observation { text: text.into() }
    }

    /// Text form as it appears in the prompt
    pub fn render(&self) -> String {
        match self {
            Self::Thought { text } => format!("Thought: {}", text),
            Self::Action { tool, input } => format!("Action: {}\nAction Input: {}", tool, input),
            Self::Observation { text } => format!("Observation: {}", text),
        }
    }

    /// Estimated token cost of the rendered step
    pub fn cost(&self) -> usize {
        estimate_tokens(&self.render())
    }
}

/// Append-only history for one reasoning loop
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    header: String,
    steps: Vec<Step>,
}

impl Transcript {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            steps: Vec::new(),
        }
    }

    pub fn append(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Fixed cost of every render: header plus the closing cue
    pub fn fixed_cost(&self) -> usize {
        estimate_tokens(&self.header) + estimate_tokens(THOUGHT_CUE)
    }

    /// Indices a render may start from: the first step and each step after an observation
    fn group_starts(&self) -> Vec<usize> {
        let mut starts = vec![0];
        starts.extend(
            self.steps
                .iter()
                .enumerate()
                .filter(|(i, step)| matches!(step, Step::Observation { .. }) && i + 1 < self.steps.len())
                .map(|(i, _)| i + 1),
        );
        starts
    }

    /// Render within `budget_tokens`, keeping the longest suffix of groups that fits
    pub fn render(&self, budget_tokens: usize) -> String {
        let costs: Vec<usize> = self.steps.iter().map(Step::cost).collect();
        let fixed = self.fixed_cost();
        let total: usize = fixed + costs.iter().sum::<usize>();

        let (first_kept, elided) = if total <= budget_tokens {
            (0, false)
        } else {
            let mut available = budget_tokens.saturating_sub(fixed + estimate_tokens(ELISION_MARKER));
            let mut first = self.steps.len();
            for start in self.group_starts().into_iter().rev() {
                let cost: usize = costs[start..first].iter().sum();
                if cost > available {
                    break;
                }
                available -= cost;
                first = start;
            }
            (first, true)
        };

        let mut lines: Vec<String> = Vec::with_capacity(self.steps.len() - first_kept + 3);
        lines.push(self.header.clone());
        if elided {
            lines.push(ELISION_MARKER.to_string());
        }
        lines.extend(self.steps[first_kept..].iter().map(Step::render));
        lines.push(THOUGHT_CUE.to_string());
        lines.join("\n")
    }
}
