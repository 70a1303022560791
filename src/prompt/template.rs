//! The SQL agent prompt header

use serde::Serialize;

use crate::error::Result;
use crate::tools::ToolRegistry;

use super::render::PromptRenderer;

const SQL_AGENT_TEMPLATE_NAME: &str = "sql_agent";

const SQL_AGENT_TEMPLATE: &str = r#"You are an agent designed to interact with a SQL database.
Given an input question, create a syntactically correct {{dialect}} query to run, then look at the results of the query and return the answer.
Unless the user specifies a specific number of examples they wish to obtain, always limit your query to at most {{top_k}} results.
You can order the results by a relevant column to return the most interesting examples in the database.
Never query for all the columns from a specific table, only ask for the relevant columns given the question.
You have access to tools for interacting with the database.
Only use the below tools. Only use the information returned by the below tools to construct your final answer.
You MUST double check your query before executing it. If you get an error while executing a query, rewrite the query and try again.

DO NOT make any DML statements (INSERT, UPDATE, DELETE, DROP etc.) to the database.

If the question does not seem related to the database, just return "I don't know" as the answer.

{{tools}}

Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{{tool_names}}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question

Begin!

Question: {{input}}"#;

/// Reminder appended after output that could not be parsed
pub const FORMAT_REMINDER: &str = "Could not parse your last output. Reply with either \
`Action: <tool name>` followed by `Action Input: <input>`, or `Final Answer: <answer>`.";

#[derive(Serialize)]
struct HeaderContext<'a> {
    dialect: &'a str,
    top_k: u32,
    tools: String,
    tool_names: String,
    input: &'a str,
}

/// Renders the transcript header: instructions, tool catalog and the question
pub struct SqlAgentPrompt {
    renderer: PromptRenderer,
    dialect: String,
    top_k: u32,
}

impl SqlAgentPrompt {
    pub fn new(dialect: impl Into<String>, top_k: u32) -> Result<Self> {
        let mut renderer = PromptRenderer::new();
        renderer.register_template(SQL_AGENT_TEMPLATE_NAME, SQL_AGENT_TEMPLATE)?;
        Ok(Self {
            renderer,
            dialect: dialect.into(),
            top_k,
        })
    }

    /// Header for one question
    pub fn header(&self, registry: &ToolRegistry, question: &str) -> Result<String> {
        let context = HeaderContext {
            dialect: &self.dialect,
            top_k: self.top_k,
            tools: registry.render_catalog(),
            tool_names: registry.names().join(", "),
            input: question.trim(),
        };
        self.renderer.render_named(SQL_AGENT_TEMPLATE_NAME, &context)
    }
}
