//! Oracle layer - text-completion clients and ReAct action parsing
//!
//! This module provides:
//! - Request/response types for a single completion call
//! - LlmClient trait for API abstraction
//! - AnthropicClient and OpenAiClient implementations
//! - MockLlmClient for scripted runs
//! - The action parser that turns oracle text into an `Action`

pub mod action_parser;
pub mod anthropic;
pub mod client;
pub mod openai;
pub mod types;

use std::sync::Arc;

pub use action_parser::{Action, ParseError, ParsedStep, parse};
pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use client::{LlmClient, LlmError, MockLlmClient, MockReply, estimate_tokens};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use types::{CompletionRequest, CompletionResponse, StopReason, Usage};

use crate::config::{OracleConfig, OracleProvider};

/// Build the configured oracle client
pub fn build_client(config: &OracleConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    let api_key = config.resolve_api_key().ok_or_else(|| LlmError::MissingApiKey {
        env_var: config.api_key_env.clone(),
    })?;

    let client: Arc<dyn LlmClient> = match config.provider {
        OracleProvider::Anthropic => {
            let mut anthropic = AnthropicConfig {
                model: config.model.clone(),
                max_tokens: config.max_tokens,
                temperature: config.temperature,
                timeout: config.timeout(),
                ..Default::default()
            };
            if let Some(url) = &config.base_url {
                anthropic.base_url = url.clone();
            }
            Arc::new(AnthropicClient::with_api_key(api_key, anthropic)?)
        }
        OracleProvider::OpenAi => {
            let mut openai = OpenAiConfig {
                model: config.model.clone(),
                max_tokens: config.max_tokens,
                temperature: config.temperature,
                timeout: config.timeout(),
                ..Default::default()
            };
            if let Some(url) = &config.base_url {
                openai.base_url = url.clone();
            }
            Arc::new(OpenAiClient::with_api_key(api_key, openai)?)
        }
    };

    log::info!("Oracle client ready: {:?} model {}", config.provider, client.model());
    Ok(client)
}
