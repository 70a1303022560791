use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{AgentError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub database: DatabaseConfig,
    pub oracle: OracleConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            request_timeout_ms: 120_000,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_steps: u32,
    pub max_malformed_steps: u32,
    pub context_token_budget: usize,
    /// Row limit suggested to the oracle in the prompt
    pub top_k: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 15,
            max_malformed_steps: 3,
            context_token_budget: 6000,
            top_k: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub connection_string: String,
    pub query_timeout_ms: u64,
    pub max_rows: usize,
    pub pool_size: u32,
    pub acquire_timeout_ms: u64,
    pub connect_retries: u32,
    pub max_observation_chars: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_string: "sqlite:///example.db".to_string(),
            query_timeout_ms: 10_000,
            max_rows: 100,
            pool_size: 4,
            acquire_timeout_ms: 5_000,
            connect_retries: 2,
            max_observation_chars: 4_000,
        }
    }
}

impl DatabaseConfig {
    /// Resolve the connection string to a SQLite file path.
    ///
    /// Accepts `sqlite:///relative.db`, `sqlite:////abs/path.db` and bare paths.
    pub fn database_path(&self) -> Result<PathBuf> {
        let raw = self.connection_string.trim();
        let path = if let Some(rest) = raw.strip_prefix("sqlite:///") {
            rest
        } else if let Some(rest) = raw.strip_prefix("sqlite://") {
            rest
        } else if raw.contains("://") {
            return Err(AgentError::Config(format!(
                "unsupported database scheme in '{}', only sqlite is available",
                raw
            )));
        } else {
            raw
        };

        if path.is_empty() {
            return Err(AgentError::Config("database connection string has no path".to_string()));
        }
        Ok(PathBuf::from(path))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleProvider {
    OpenAi,
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub provider: OracleProvider,
    pub model: String,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_ms: u64,
    pub api_key_env: String,
    #[serde(skip_serializing)]
    pub api_key: Option<Secret>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: OracleProvider::OpenAi,
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            max_tokens: 1024,
            temperature: 0.2,
            timeout_ms: 60_000,
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Explicit key first, then the configured environment variable
    pub fn resolve_api_key(&self) -> Option<Secret> {
        if let Some(key) = &self.api_key
            && !key.expose().is_empty()
        {
            return Some(key.clone());
        }
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|v| !v.is_empty())
            .map(Secret::new)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("sqlagent")
                .join("audit"),
        }
    }
}

/// Credential wrapper that never prints its contents
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Secret)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            server: ServerConfig::default(),
            agent: AgentConfig::default(),
            database: DatabaseConfig::default(),
            oracle: OracleConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config = Self::from_yaml(&content)?;
        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| AgentError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the loop unbounded or the guard useless
    pub fn validate(&self) -> Result<()> {
        if self.agent.max_steps == 0 {
            return Err(AgentError::Config("agent.max_steps must be at least 1".to_string()));
        }
        if self.database.max_rows == 0 {
            return Err(AgentError::Config("database.max_rows must be at least 1".to_string()));
        }
        if self.database.pool_size == 0 {
            return Err(AgentError::Config("database.pool_size must be at least 1".to_string()));
        }
        if self.database.query_timeout_ms == 0 {
            return Err(AgentError::Config("database.query_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}
