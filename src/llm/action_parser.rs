//! Action parser for ReAct-formatted oracle output
//!
//! The oracle is asked to answer in this shape:
//!
//! ```text
//! Thought: I should look at the tables in the database.
//! Action: sql_db_list_tables
//! Action Input:
//! ```
//!
//! or, once it knows the answer:
//!
//! ```text
//! Thought: I now know the final answer
//! Final Answer: 42 users signed up last week.
//! ```
//!
//! Anything else is rejected with a [`ParseError`]; nothing is guessed.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

// Final answer wins wherever it appears, so it is not anchored to a line start
static FINAL_ANSWER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)final\s+answer\s*:").unwrap());
static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?im)^[ \t]*action[ \t]*:").unwrap());
static ACTION_INPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*action[ \t]+input[ \t]*:").unwrap());
static OBSERVATION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?im)^[ \t]*observation[ \t]*:").unwrap());
static THOUGHT_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^\s*thought\s*:").unwrap());

/// A decoded instruction from oracle text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    ToolCall { tool: String, input: String },
    FinalAnswer { text: String },
}

impl Action {
    pub fn is_final(&self) -> bool {
        matches!(self, Action::FinalAnswer { .. })
    }
}

/// Oracle output split into the optional reasoning and the action it asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStep {
    pub thought: Option<String>,
    pub action: Action,
}

/// Reasons oracle output was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("output was empty")]
    EmptyOutput,

    #[error("output contains neither an 'Action:' nor a 'Final Answer:'")]
    MissingAction,

    #[error("'Final Answer:' is not followed by any text")]
    EmptyFinalAnswer,

    #[error("'Action:' is not followed by a tool name")]
    EmptyToolName,

    #[error("'Action: {tool}' is missing its 'Action Input:' line")]
    MissingActionInput { tool: String },

    #[error("output contains {count} 'Action:' lines, expected exactly one")]
    AmbiguousActions { count: usize },
}

/// Parse raw oracle text into a structured step
pub fn parse(text: &str) -> Result<ParsedStep, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::EmptyOutput);
    }

    if let Some(m) = FINAL_ANSWER_RE.find(text) {
        let answer = text[m.end()..].trim();
        if answer.is_empty() {
            return Err(ParseError::EmptyFinalAnswer);
        }
        return Ok(ParsedStep {
            thought: extract_thought(&text[..m.start()]),
            action: Action::FinalAnswer {
                text: answer.to_string(),
            },
        });
    }

    let actions: Vec<_> = ACTION_RE.find_iter(text).collect();
    let action_match = match actions.as_slice() {
        [] => return Err(ParseError::MissingAction),
        [single] => *single,
        many => return Err(ParseError::AmbiguousActions { count: many.len() }),
    };

    let after_action = &text[action_match.end()..];
    let tool_line = after_action.lines().next().unwrap_or_default();
    let tool = strip_wrapping(tool_line.trim()).to_string();
    if tool.is_empty() {
        return Err(ParseError::EmptyToolName);
    }

    let input_match = ACTION_INPUT_RE
        .find(after_action)
        .ok_or_else(|| ParseError::MissingActionInput { tool: tool.clone() })?;

    let mut input = &after_action[input_match.end()..];
    // The oracle sometimes invents its own observation; never trust it
    if let Some(obs) = OBSERVATION_RE.find(input) {
        input = &input[..obs.start()];
    }

    Ok(ParsedStep {
        thought: extract_thought(&text[..action_match.start()]),
        action: Action::ToolCall {
            tool,
            input: clean_argument(input),
        },
    })
}

fn extract_thought(prefix: &str) -> Option<String> {
    let stripped = THOUGHT_PREFIX_RE.replace(prefix, "");
    let thought = stripped.trim();
    if thought.is_empty() { None } else { Some(thought.to_string()) }
}

/// Remove code fences and wrapping double quotes/backticks from a tool argument.
///
/// Single quotes are left alone since they delimit SQL string literals.
fn clean_argument(raw: &str) -> String {
    let mut s = raw.trim();

    if let Some(rest) = s.strip_prefix("```") {
        let body = match rest.find('\n') {
            Some(i) if rest[..i].chars().all(|c| c.is_ascii_alphanumeric()) => &rest[i + 1..],
            _ => rest,
        };
        s = body.trim_end().strip_suffix("```").unwrap_or(body).trim();
    }

    strip_wrapping(s).trim().to_string()
}

fn strip_wrapping(s: &str) -> &str {
    for quote in ['"', '`'] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}
