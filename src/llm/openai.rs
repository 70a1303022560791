//! OpenAI-compatible chat completions client
//!
//! Works against api.openai.com or any server exposing `/v1/chat/completions`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::config::Secret;
use crate::llm::client::{LlmClient, LlmError};
use crate::llm::types::{CompletionRequest, CompletionResponse, StopReason, Usage};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI accepts at most four stop sequences
const MAX_STOP_SEQUENCES: usize = 4;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    pub base_url: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 1024,
            temperature: 0.2,
            timeout: Duration::from_secs(60),
            base_url: OPENAI_API_URL.to_string(),
        }
    }
}

pub struct OpenAiClient {
    client: Client,
    api_key: Secret,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn with_api_key(api_key: Secret, config: OpenAiConfig) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    fn build_request(&self, request: &CompletionRequest) -> Value {
        let model = request.model.as_ref().unwrap_or(&self.config.model).clone();

        let mut body = json!({
            "model": model,
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "temperature": request.temperature.unwrap_or(self.config.temperature),
            "messages": [
                { "role": "user", "content": request.prompt }
            ]
        });

        if !request.stop_sequences.is_empty() {
            let stops: Vec<&String> = request.stop_sequences.iter().take(MAX_STOP_SEQUENCES).collect();
            body["stop"] = json!(stops);
        }

        body
    }

    fn parse_response(&self, body: Value) -> Result<CompletionResponse, LlmError> {
        let choice = body["choices"]
            .get(0)
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

        // A null content is legal (refusals); treat it as empty text
        let text = choice["message"]["content"].as_str().unwrap_or_default().to_string();

        let stop_reason = choice["finish_reason"]
            .as_str()
            .map(StopReason::from_openai)
            .unwrap_or_default();

        let usage = body
            .get("usage")
            .map(|u| {
                Usage::new(
                    u["prompt_tokens"].as_u64().unwrap_or(0),
                    u["completion_tokens"].as_u64().unwrap_or(0),
                )
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            text,
            stop_reason,
            usage,
        })
    }

    async fn send_request(&self, body: Value) -> Result<Value, LlmError> {
        let response = self
            .client
            .post(&self.config.base_url)
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(20);
            return Err(LlmError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request(&request);
        let response = self.send_request(body).await?;
        self.parse_response(response)
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn is_ready(&self) -> bool {
        !self.api_key.expose().is_empty()
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiClient {
        OpenAiClient::with_api_key(Secret::new("sk-test"), OpenAiConfig::default()).unwrap()
    }

    #[test]
    fn test_build_request() {
        let request = CompletionRequest::new("Question: q")
            .with_stop_sequences(vec!["\nObservation:".to_string()])
            .with_temperature(0.0);

        let body = client().build_request(&request);

        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["messages"][0]["content"], "Question: q");
        assert_eq!(body["stop"][0], "\nObservation:");
        assert_eq!(body["temperature"], 0.0);
    }

    #[test]
    fn test_stop_sequences_capped() {
        let stops = (0..6).map(|i| format!("STOP{}", i)).collect();
        let body = client().build_request(&CompletionRequest::new("q").with_stop_sequences(stops));
        assert_eq!(body["stop"].as_array().unwrap().len(), MAX_STOP_SEQUENCES);
    }

    #[test]
    fn test_parse_response() {
        let response = client()
            .parse_response(json!({
                "choices": [{
                    "message": { "role": "assistant", "content": "Final Answer: 42" },
                    "finish_reason": "stop"
                }],
                "usage": { "prompt_tokens": 12, "completion_tokens": 4 }
            }))
            .unwrap();

        assert_eq!(response.text, "Final Answer: 42");
        assert_eq!(response.stop_reason, StopReason::EndTurn);
        assert_eq!(response.usage, Usage::new(12, 4));
    }

    #[test]
    fn test_parse_response_null_content() {
        let response = client()
            .parse_response(json!({
                "choices": [{ "message": { "content": null }, "finish_reason": "length" }]
            }))
            .unwrap();
        assert!(response.text.is_empty());
        assert_eq!(response.stop_reason, StopReason::MaxTokens);
    }

    #[test]
    fn test_parse_response_no_choices() {
        assert!(matches!(
            client().parse_response(json!({ "choices": [] })),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_debug_hides_key() {
        assert!(!format!("{:?}", client()).contains("sk-test"));
    }
}
