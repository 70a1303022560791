//! Loop runner implementation - drives one ReAct reasoning loop.
//!
//! The LoopRunner repeatedly renders the transcript, asks the oracle for the
//! next step, executes any tool it asks for and feeds the observation back,
//! until the oracle gives a final answer or a terminal condition is reached.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{AgentError, Result};
use crate::llm::{Action, CompletionRequest, LlmClient, ParsedStep, Usage, parse};
use crate::prompt::{FORMAT_REMINDER, Step, Transcript};
use crate::tools::{ToolRegistry, ToolRouter};

use super::state::{LoopPhase, LoopState};

/// Stop sequence that keeps the oracle from inventing observations
pub const OBSERVATION_STOP: &str = "\nObservation:";

/// Outcome of a loop execution.
#[derive(Debug)]
pub enum LoopOutcome {
    /// The oracle produced a final answer
    Done(String),
    /// The loop hit a terminal condition
    Failed(AgentError),
}

impl LoopOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, LoopOutcome::Done(_))
    }

    pub fn into_result(self) -> Result<String> {
        match self {
            LoopOutcome::Done(answer) => Ok(answer),
            LoopOutcome::Failed(err) => Err(err),
        }
    }
}

/// Everything a finished loop leaves behind
#[derive(Debug)]
pub struct LoopReport {
    pub outcome: LoopOutcome,
    pub state: LoopState,
    pub transcript: Transcript,
    pub usage: Usage,
}

/// Configuration for the LoopRunner.
#[derive(Debug, Clone)]
pub struct LoopRunnerConfig {
    pub max_steps: u32,
    pub max_malformed_steps: u32,
    /// Token budget for each rendered transcript
    pub context_token_budget: usize,
    pub oracle_timeout: Duration,
    /// Cap on a single rendered observation
    pub max_observation_chars: usize,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for LoopRunnerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl LoopRunnerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_steps: config.agent.max_steps,
            max_malformed_steps: config.agent.max_malformed_steps,
            context_token_budget: config.agent.context_token_budget,
            oracle_timeout: config.oracle.timeout(),
            max_observation_chars: config.database.max_observation_chars,
            max_tokens: Some(config.oracle.max_tokens),
            temperature: Some(config.oracle.temperature),
        }
    }
}

/// LoopRunner executes a single reasoning loop.
///
/// Each step:
/// 1. Renders the transcript under the token budget
/// 2. Calls the oracle, stopping before it writes its own observation
/// 3. Parses the reply into a thought and an action
/// 4. Executes a tool call and appends the observation, or finishes on a final answer
pub struct LoopRunner<L, T>
where
    L: LlmClient + ?Sized,
    T: ToolRouter + ?Sized,
{
    llm: Arc<L>,
    registry: Arc<ToolRegistry>,
    tool_router: Arc<T>,
    config: LoopRunnerConfig,
}

impl<L, T> LoopRunner<L, T>
where
    L: LlmClient + ?Sized,
    T: ToolRouter + ?Sized,
{
    pub fn new(llm: Arc<L>, registry: Arc<ToolRegistry>, tool_router: Arc<T>, config: LoopRunnerConfig) -> Self {
        Self {
            llm,
            registry,
            tool_router,
            config,
        }
    }

    pub fn config(&self) -> &LoopRunnerConfig {
        &self.config
    }

    /// Run a loop seeded with `header` until it terminates.
    ///
    /// The loop terminates exactly once, in either `Done` or `Failed`.
    pub async fn run(&self, header: String, cancel: &CancellationToken) -> LoopReport {
        let mut state = LoopState::new(self.config.max_steps, self.config.max_malformed_steps);
        let mut transcript = Transcript::new(header);
        let mut usage = Usage::default();

        let result = self.drive(&mut state, &mut transcript, &mut usage, cancel).await;

        let outcome = match result {
            Ok(answer) => {
                transition(&mut state, LoopPhase::Done);
                info!("Loop done after {} steps ({} malformed)", state.step, state.malformed);
                LoopOutcome::Done(answer)
            }
            Err(err) => {
                transition(&mut state, LoopPhase::Failed);
                warn!("Loop failed after {} steps: {}", state.step, err);
                LoopOutcome::Failed(err)
            }
        };

        LoopReport {
            outcome,
            state,
            transcript,
            usage,
        }
    }

    async fn drive(
        &self,
        state: &mut LoopState,
        transcript: &mut Transcript,
        usage: &mut Usage,
        cancel: &CancellationToken,
    ) -> Result<String> {
        transition(state, LoopPhase::Thinking);

        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            let step = state.begin_step()?;
            debug!("Step {}/{}", step, state.max_steps);

            let Some(text) = self.think(transcript, usage, cancel).await? else {
                state.record_malformed()?;
                transition(state, LoopPhase::Thinking);
                continue;
            };

            let parsed = match parse(&text) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!("Step {}: unparseable oracle output: {}", step, err);
                    let raw = text.trim();
                    if !raw.is_empty() {
                        transcript.append(Step::thought(raw));
                    }
                    transcript.append(Step::observation(format!("{} ({})", FORMAT_REMINDER, err)));
                    state.record_malformed()?;
                    transition(state, LoopPhase::Thinking);
                    continue;
                }
            };

            let ParsedStep { thought, action } = parsed;
            if let Some(thought) = thought {
                transcript.append(Step::thought(thought));
            }

            match action {
                Action::FinalAnswer { text } => return Ok(text),
                Action::ToolCall { tool, input } => {
                    transition(state, LoopPhase::Acting);
                    info!("Step {}: calling {}", step, tool);
                    transcript.append(Step::action(&tool, &input));

                    let observation = self.act(state, &tool, &input, cancel).await?;

                    transition(state, LoopPhase::Observing);
                    transcript.append(Step::observation(observation));
                    transition(state, LoopPhase::Thinking);
                }
            }
        }
    }

    /// One oracle call. `None` means the step produced nothing usable but may be retried.
    async fn think(&self, transcript: &Transcript, usage: &mut Usage, cancel: &CancellationToken) -> Result<Option<String>> {
        let prompt = transcript.render(self.config.context_token_budget);
        let mut request = CompletionRequest::new(prompt).with_stop_sequences(vec![OBSERVATION_STOP.to_string()]);
        if let Some(max_tokens) = self.config.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }

        let reply = tokio::select! {
            reply = tokio::time::timeout(self.config.oracle_timeout, self.llm.complete(request)) => reply,
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
        };

        match reply {
            Err(_) => {
                warn!("Oracle did not answer within {:?}", self.config.oracle_timeout);
                Ok(None)
            }
            Ok(Err(err)) if err.is_retryable() => {
                warn!("Oracle call failed, will retry: {}", err);
                Ok(None)
            }
            Ok(Err(err)) => Err(AgentError::OracleUnavailable(err.to_string())),
            Ok(Ok(response)) => {
                usage.add(&response.usage);
                debug!("Oracle replied with {} chars", response.text.len());
                Ok(Some(response.text))
            }
        }
    }

    /// Resolve and execute a tool call, returning the observation text
    async fn act(&self, state: &mut LoopState, tool: &str, input: &str, cancel: &CancellationToken) -> Result<String> {
        let descriptor = match self.registry.lookup(tool) {
            Ok(descriptor) => descriptor,
            Err(_) => {
                warn!("Oracle asked for unknown tool: {}", tool);
                return Ok(format!(
                    "{} is not a valid tool, try one of [{}].",
                    tool,
                    self.registry.names().join(", ")
                ));
            }
        };

        match self.tool_router.execute(descriptor, input, cancel).await {
            Ok(result) => Ok(result.to_observation(self.config.max_observation_chars)),
            Err(AgentError::ForbiddenOperation(reason)) => {
                info!("Rejected query from oracle: {}", reason);
                Ok(format!("Error: query rejected: {}", reason))
            }
            Err(err @ AgentError::QueryTimeout { .. }) => {
                state.record_malformed()?;
                Ok(format!(
                    "Error: {}. Try a simpler query, add a LIMIT, or filter on indexed columns.",
                    err
                ))
            }
            Err(err) => Err(err),
        }
    }
}

/// Apply a phase change; an illegal one means the runner itself is broken
fn transition(state: &mut LoopState, next: LoopPhase) {
    let from = state.phase;
    let moved = state.advance(next);
    if !moved {
        warn!("Illegal loop transition {:?} -> {:?}", from, next);
    }
    debug_assert!(moved, "illegal loop transition {:?} -> {:?}", from, next);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_follows_legal_path() {
        let mut state = LoopState::new(3, 1);
        for phase in [LoopPhase::Thinking, LoopPhase::Acting, LoopPhase::Observing, LoopPhase::Thinking, LoopPhase::Done] {
            transition(&mut state, phase);
            assert_eq!(state.phase, phase);
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "illegal loop transition Done -> Thinking")]
    fn test_transition_out_of_terminal_phase_is_caught() {
        let mut state = LoopState::new(3, 1);
        transition(&mut state, LoopPhase::Thinking);
        transition(&mut state, LoopPhase::Done);
        transition(&mut state, LoopPhase::Thinking);
    }
    use crate::llm::{MockLlmClient, MockReply};
    use crate::sql::QueryResult;
    use crate::tools::ToolDescriptor;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Mock tool router for testing.
    struct MockToolRouter {
        reply: fn(&ToolDescriptor, &str) -> Result<QueryResult>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl MockToolRouter {
        fn new(reply: fn(&ToolDescriptor, &str) -> Result<QueryResult>) -> Self {
            Self {
                reply,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ToolRouter for MockToolRouter {
        async fn execute(&self, tool: &ToolDescriptor, argument: &str, _cancel: &CancellationToken) -> Result<QueryResult> {
            self.calls.lock().unwrap().push((tool.name.clone(), argument.to_string()));
            (self.reply)(tool, argument)
        }
    }

    fn rows_42(_: &ToolDescriptor, _: &str) -> Result<QueryResult> {
        let mut row = crate::sql::Row::new();
        row.insert("count".to_string(), serde_json::json!(42));
        Ok(QueryResult::Rows {
            columns: vec!["count".to_string()],
            rows: vec![row],
            truncated: false,
        })
    }

    fn config(max_steps: u32, max_malformed_steps: u32) -> LoopRunnerConfig {
        LoopRunnerConfig {
            max_steps,
            max_malformed_steps,
            context_token_budget: 6000,
            oracle_timeout: Duration::from_secs(5),
            max_observation_chars: 4000,
            max_tokens: Some(256),
            temperature: Some(0.0),
        }
    }

    fn runner(
        llm: MockLlmClient,
        router: MockToolRouter,
        config: LoopRunnerConfig,
    ) -> (LoopRunner<MockLlmClient, MockToolRouter>, Arc<MockLlmClient>, Arc<MockToolRouter>) {
        let llm = Arc::new(llm);
        let router = Arc::new(router);
        let registry = Arc::new(ToolRegistry::standard().unwrap());
        (
            LoopRunner::new(Arc::clone(&llm), registry, Arc::clone(&router), config),
            llm,
            router,
        )
    }

    #[test]
    fn test_loop_outcome_into_result() {
        assert_eq!(LoopOutcome::Done("42".into()).into_result().unwrap(), "42");
        assert!(LoopOutcome::Failed(AgentError::Cancelled).into_result().is_err());
    }

    #[test]
    fn test_runner_config_from_defaults() {
        let config = LoopRunnerConfig::default();
        assert_eq!(config.max_steps, 15);
        assert_eq!(config.max_malformed_steps, 3);
        assert_eq!(config.context_token_budget, 6000);
    }

    #[tokio::test]
    async fn test_immediate_final_answer() {
        let (runner, llm, router) = runner(
            MockLlmClient::new(vec!["I know this.\nFinal Answer: 42"]),
            MockToolRouter::new(rows_42),
            config(15, 3),
        );

        let report = runner.run("HEADER".to_string(), &CancellationToken::new()).await;
        assert!(matches!(&report.outcome, LoopOutcome::Done(a) if a == "42"));
        assert_eq!(report.state.phase, LoopPhase::Done);
        assert_eq!(report.state.step, 1);
        assert_eq!(llm.call_count(), 1);
        assert!(router.calls().is_empty());
    }

    #[tokio::test]
    async fn test_tool_call_then_answer() {
        let (runner, llm, router) = runner(
            MockLlmClient::new(vec![
                "I should count the users.\nAction: sql_db_query\nAction Input: SELECT COUNT(*) AS count FROM users",
                "I now know the final answer\nFinal Answer: There are 42 users.",
            ]),
            MockToolRouter::new(rows_42),
            config(15, 3),
        );

        let report = runner.run("HEADER".to_string(), &CancellationToken::new()).await;
        assert_eq!(report.outcome.into_result().unwrap(), "There are 42 users.");
        assert_eq!(
            router.calls(),
            vec![("sql_db_query".to_string(), "SELECT COUNT(*) AS count FROM users".to_string())]
        );

        let requests = llm.requests();
        assert_eq!(requests[0].stop_sequences, vec![OBSERVATION_STOP.to_string()]);
        assert!(requests[1].prompt.contains("Observation: [{\"count\":42}]"));
        assert!(requests[1].prompt.ends_with("Thought:"));
        assert_eq!(
            report.transcript.steps(),
            &[
                Step::thought("I should count the users."),
                Step::action("sql_db_query", "SELECT COUNT(*) AS count FROM users"),
                Step::observation("[{\"count\":42}]"),
                Step::thought("I now know the final answer"),
            ]
        );
    }

    #[tokio::test]
    async fn test_never_parseable_hits_step_limit() {
        let (runner, llm, _) = runner(MockLlmClient::repeating("hmm, not sure"), MockToolRouter::new(rows_42), config(3, 10));

        let report = runner.run("HEADER".to_string(), &CancellationToken::new()).await;
        assert!(matches!(
            report.outcome,
            LoopOutcome::Failed(AgentError::StepLimitExceeded { max_steps: 3 })
        ));
        assert_eq!(report.state.phase, LoopPhase::Failed);
        assert_eq!(llm.call_count(), 3);
        assert!(report.transcript.render(100_000).contains("Could not parse your last output"));
    }

    #[tokio::test]
    async fn test_malformed_budget_exceeded() {
        let (runner, llm, _) = runner(MockLlmClient::repeating("garbage"), MockToolRouter::new(rows_42), config(15, 2));

        let report = runner.run("HEADER".to_string(), &CancellationToken::new()).await;
        assert!(matches!(
            report.outcome,
            LoopOutcome::Failed(AgentError::MalformedStepBudgetExceeded { malformed: 3, budget: 2 })
        ));
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_recovers_after_malformed_step() {
        let (runner, _, _) = runner(
            MockLlmClient::new(vec!["Action: sql_db_query", "Final Answer: done"]),
            MockToolRouter::new(rows_42),
            config(15, 3),
        );

        let report = runner.run("HEADER".to_string(), &CancellationToken::new()).await;
        assert_eq!(report.outcome.into_result().unwrap(), "done");
        assert_eq!(report.state.malformed, 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_observation() {
        let (runner, _, router) = runner(
            MockLlmClient::new(vec!["Action: shell\nAction Input: rm -rf /", "Final Answer: ok"]),
            MockToolRouter::new(rows_42),
            config(15, 3),
        );

        let report = runner.run("HEADER".to_string(), &CancellationToken::new()).await;
        assert!(report.outcome.is_done());
        assert!(router.calls().is_empty());
        assert!(report.transcript.steps().iter().any(|s| matches!(
            s,
            Step::Observation { text } if text.starts_with("shell is not a valid tool, try one of [sql_db_query")
        )));
    }

    #[tokio::test]
    async fn test_forbidden_query_is_an_observation() {
        fn forbid(_: &ToolDescriptor, _: &str) -> Result<QueryResult> {
            Err(AgentError::ForbiddenOperation("DROP is not allowed".to_string()))
        }
        let (runner, _, _) = runner(
            MockLlmClient::new(vec!["Action: sql_db_query\nAction Input: DROP TABLE users", "Final Answer: I can't"]),
            MockToolRouter::new(forbid),
            config(15, 3),
        );

        let report = runner.run("HEADER".to_string(), &CancellationToken::new()).await;
        assert!(report.outcome.is_done());
        assert_eq!(report.state.malformed, 0);
        assert!(report.transcript.steps().contains(&Step::observation("Error: query rejected: DROP is not allowed")));
    }

    #[tokio::test]
    async fn test_query_timeouts_count_toward_malformed_budget() {
        fn slow(_: &ToolDescriptor, _: &str) -> Result<QueryResult> {
            Err(AgentError::QueryTimeout { timeout_ms: 10 })
        }
        let (runner, _, router) = runner(
            MockLlmClient::repeating("Action: sql_db_query\nAction Input: SELECT * FROM big"),
            MockToolRouter::new(slow),
            config(15, 1),
        );

        let report = runner.run("HEADER".to_string(), &CancellationToken::new()).await;
        assert!(matches!(
            report.outcome,
            LoopOutcome::Failed(AgentError::MalformedStepBudgetExceeded { .. })
        ));
        assert_eq!(router.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_resource_exhaustion_is_terminal() {
        fn busy(_: &ToolDescriptor, _: &str) -> Result<QueryResult> {
            Err(AgentError::ResourceExhausted("all 1 database connections are busy".to_string()))
        }
        let (runner, llm, _) = runner(
            MockLlmClient::repeating("Action: sql_db_query\nAction Input: SELECT 1"),
            MockToolRouter::new(busy),
            config(15, 3),
        );

        let report = runner.run("HEADER".to_string(), &CancellationToken::new()).await;
        assert!(matches!(report.outcome, LoopOutcome::Failed(AgentError::ResourceExhausted(_))));
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_retryable_oracle_error_counts_as_malformed() {
        let (runner, _, _) = runner(
            MockLlmClient::scripted(vec![MockReply::Unavailable, MockReply::Text("Final Answer: back".to_string())]),
            MockToolRouter::new(rows_42),
            config(15, 3),
        );

        let report = runner.run("HEADER".to_string(), &CancellationToken::new()).await;
        assert_eq!(report.outcome.into_result().unwrap(), "back");
        assert_eq!(report.state.malformed, 1);
        assert!(report.transcript.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_oracle_is_unavailable() {
        let (runner, _, _) = runner(
            MockLlmClient::scripted(vec![MockReply::Rejected]),
            MockToolRouter::new(rows_42),
            config(15, 3),
        );

        let report = runner.run("HEADER".to_string(), &CancellationToken::new()).await;
        assert!(matches!(report.outcome, LoopOutcome::Failed(AgentError::OracleUnavailable(_))));
    }

    #[tokio::test]
    async fn test_oracle_timeout_counts_as_malformed() {
        let mut cfg = config(15, 1);
        cfg.oracle_timeout = Duration::from_millis(20);
        let (runner, llm, _) = runner(
            MockLlmClient::repeating("Final Answer: late").with_delay(Duration::from_millis(500)),
            MockToolRouter::new(rows_42),
            cfg,
        );

        let report = runner.run("HEADER".to_string(), &CancellationToken::new()).await;
        assert!(matches!(
            report.outcome,
            LoopOutcome::Failed(AgentError::MalformedStepBudgetExceeded { .. })
        ));
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_cancellation() {
        let (runner, _, _) = runner(
            MockLlmClient::repeating("Final Answer: never").with_delay(Duration::from_secs(5)),
            MockToolRouter::new(rows_42),
            config(15, 3),
        );

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let report = runner.run("HEADER".to_string(), &cancel).await;
        assert!(matches!(report.outcome, LoopOutcome::Failed(AgentError::Cancelled)));
        assert_eq!(report.state.phase, LoopPhase::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (runner, llm, _) = runner(MockLlmClient::repeating("Final Answer: x"), MockToolRouter::new(rows_42), config(15, 3));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = runner.run("HEADER".to_string(), &cancel).await;
        assert!(matches!(report.outcome, LoopOutcome::Failed(AgentError::Cancelled)));
        assert_eq!(llm.call_count(), 0);
    }
}
