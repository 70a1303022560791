//! Prompt System - header template, rendering and the budgeted transcript

mod render;
mod template;
mod transcript;

pub use render::PromptRenderer;
pub use template::{FORMAT_REMINDER, SqlAgentPrompt};
pub use transcript::{ELISION_MARKER, Step, THOUGHT_CUE, Transcript};
