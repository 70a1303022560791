//! The agent: one value owning everything a request needs
//!
//! Built once at startup and shared behind an `Arc`. Each `ask` runs its own
//! reasoning loop with its own transcript; only the registry, the connection
//! pool and the oracle client are shared between requests.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{AgentError, Result};
use crate::id::{generate_request_id, now_ms};
use crate::llm::{LlmClient, build_client};
use crate::prompt::SqlAgentPrompt;
use crate::runner::{LoopReport, LoopRunner, LoopRunnerConfig};
use crate::sql::SqlExecutor;
use crate::storage::{AuditRecord, TranscriptAudit};
use crate::tools::ToolRegistry;

/// SQL dialect named in the prompt
const DIALECT: &str = "sqlite";

pub struct Agent {
    config: Config,
    registry: Arc<ToolRegistry>,
    executor: Arc<SqlExecutor>,
    llm: Arc<dyn LlmClient>,
    prompt: SqlAgentPrompt,
    audit: Option<TranscriptAudit>,
}

impl Agent {
    /// Build the agent from configuration: open the database and the oracle client
    pub fn from_config(config: Config) -> Result<Self> {
        let llm = build_client(&config.oracle).map_err(|e| AgentError::Config(e.to_string()))?;
        let executor = SqlExecutor::from_config(&config.database)?;
        Self::new(config, executor, llm)
    }

    /// Build the agent around an existing executor and oracle client
    pub fn new(config: Config, executor: SqlExecutor, llm: Arc<dyn LlmClient>) -> Result<Self> {
        config.validate()?;
        let registry = ToolRegistry::standard()?;
        let prompt = SqlAgentPrompt::new(DIALECT, config.agent.top_k)?;
        let audit = if config.audit.enabled {
            let audit = TranscriptAudit::new(&config.audit.dir)?;
            info!("Auditing transcripts to {}", audit.path().display());
            Some(audit)
        } else {
            None
        };

        info!(
            "Agent ready: model={}, tools={}, max_steps={}",
            llm.model(),
            registry.len(),
            config.agent.max_steps
        );

        Ok(Self {
            config,
            registry: Arc::new(registry),
            executor: Arc::new(executor),
            llm,
            prompt,
            audit,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    /// Answer a natural-language question
    pub async fn ask(&self, prompt: &str, cancel: &CancellationToken) -> Result<String> {
        self.run(prompt, cancel).await?.outcome.into_result()
    }

    /// Run one reasoning loop and return the full report
    pub async fn run(&self, prompt: &str, cancel: &CancellationToken) -> Result<LoopReport> {
        let question = prompt.trim();
        if question.is_empty() {
            return Err(AgentError::InvalidRequest("prompt must not be empty".to_string()));
        }

        let request_id = generate_request_id();
        let started_ms = now_ms();
        info!("[{}] Question received ({} chars)", request_id, question.len());
        debug!("[{}] Question: {}", request_id, question);

        let header = self.prompt.header(&self.registry, question)?;
        let runner = LoopRunner::new(
            Arc::clone(&self.llm),
            Arc::clone(&self.registry),
            Arc::clone(&self.executor),
            LoopRunnerConfig::from_config(&self.config),
        );
        let report = runner.run(header, cancel).await;
        let finished_ms = now_ms();

        info!(
            "[{}] Finished in {}ms: steps={}, phase={:?}, tokens={}",
            request_id,
            finished_ms.saturating_sub(started_ms),
            report.state.step,
            report.state.phase,
            report.usage.total()
        );

        if let Some(audit) = &self.audit {
            let record = AuditRecord::from_report(&request_id, question, started_ms, finished_ms, &report);
            if let Err(e) = audit.record(&record) {
                warn!("[{}] Failed to audit transcript: {}", request_id, e);
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::runner::LoopPhase;
    use rusqlite::Connection;
    use tempfile::TempDir;

    fn agent_with(dir: &TempDir, replies: Vec<&str>, audit: bool) -> (Agent, Arc<MockLlmClient>) {
        let db = dir.path().join("app.db");
        let conn = Connection::open(&db).unwrap();
        conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY); INSERT INTO users DEFAULT VALUES;")
            .unwrap();

        let mut config = Config::default();
        config.database.connection_string = format!("sqlite:///{}", db.display());
        config.database.pool_size = 1;
        config.audit.enabled = audit;
        config.audit.dir = dir.path().join("audit");

        let llm = Arc::new(MockLlmClient::new(replies));
        let executor = SqlExecutor::from_config(&config.database).unwrap();
        let agent = Agent::new(config, executor, llm.clone()).unwrap();
        (agent, llm)
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let dir = TempDir::new().unwrap();
        let (agent, llm) = agent_with(&dir, vec!["Final Answer: x"], false);

        let err = agent.ask("   \n", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidRequest(_)));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_header_reaches_oracle() {
        let dir = TempDir::new().unwrap();
        let (agent, llm) = agent_with(&dir, vec!["Final Answer: one user"], false);

        let answer = agent.ask("How many users?", &CancellationToken::new()).await.unwrap();
        assert_eq!(answer, "one user");

        let prompt = &llm.requests()[0].prompt;
        assert!(prompt.contains("Question: How many users?"));
        assert!(prompt.contains("sql_db_list_tables: List the tables in the database."));
        assert!(prompt.ends_with("Thought:"));
    }

    #[tokio::test]
    async fn test_audit_written() {
        let dir = TempDir::new().unwrap();
        let (agent, _) = agent_with(
            &dir,
            vec!["Action: sql_db_query\nAction Input: SELECT COUNT(*) AS n FROM users", "Final Answer: 1"],
            true,
        );

        let report = agent.run("How many users?", &CancellationToken::new()).await.unwrap();
        assert_eq!(report.state.phase, LoopPhase::Done);

        let audit = TranscriptAudit::new(dir.path().join("audit")).unwrap();
        let records = audit.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, "done");
        assert_eq!(records[0].steps, 2);
        assert_eq!(records[0].prompt, "How many users?");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("app.db");
        Connection::open(&db).unwrap().execute_batch("CREATE TABLE t (x);").unwrap();

        let mut config = Config::default();
        config.database.connection_string = db.display().to_string();
        let executor = SqlExecutor::from_config(&config.database).unwrap();
        config.agent.max_steps = 0;

        let result = Agent::new(config, executor, Arc::new(MockLlmClient::repeating("Final Answer: x")));
        assert!(matches!(result, Err(AgentError::Config(_))));
    }
}
