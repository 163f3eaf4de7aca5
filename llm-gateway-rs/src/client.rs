// llm-gateway-rs/src/client.rs
//
// HTTP client for OpenAI-compatible chat completion providers
//
// Configuration (.env file):
// - LLM_API_KEY: bearer token for the provider
// - LLM_MAX_RETRIES: maximum retry attempts (default: 3)
// - LLM_INITIAL_RETRY_DELAY_MS: initial delay between retries (default: 1000)
// - LLM_MAX_RETRY_DELAY_MS: maximum delay between retries (default: 30000)

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use log::{debug, error, info, warn};
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::message::ChatMessage;
use crate::TextGenerator;

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    pub api_url: String,
    pub model: String,
    pub api_key: String,
    pub max_retries: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub timeout: Duration,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for LlmClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: String::new(),
            max_retries: 3,
            initial_retry_delay_ms: 1000,
            max_retry_delay_ms: 30000,
            timeout: Duration::from_secs(60),
            temperature: Some(0.2),
            max_tokens: None,
        }
    }
}

impl LlmClientConfig {
    /// Endpoint and model come from application config; key and retry knobs from the environment
    pub fn from_env(api_url: impl Into<String>, model: impl Into<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_url: api_url.into(),
            model: model.into(),
            api_key: env::var("LLM_API_KEY").unwrap_or_default(),
            max_retries: env_or("LLM_MAX_RETRIES", defaults.max_retries),
            initial_retry_delay_ms: env_or("LLM_INITIAL_RETRY_DELAY_MS", defaults.initial_retry_delay_ms),
            max_retry_delay_ms: env_or("LLM_MAX_RETRY_DELAY_MS", defaults.max_retry_delay_ms),
            ..defaults
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmClientConfig,
}

impl LlmClient {
    pub fn new(config: LlmClientConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        if config.api_key.is_empty() {
            warn!("LLM API key is not set; generation requests will be rejected");
        }
        info!("LLM client initialized for {} (model: {})", config.api_url, config.model);

        Ok(Self { client, config })
    }

    pub fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.config.initial_retry_delay_ms))
            .with_max_interval(Duration::from_millis(self.config.max_retry_delay_ms))
            .with_multiplier(2.0)
            .with_max_elapsed_time(Some(Duration::from_secs(120)))
            .with_randomization_factor(0.5)
            .build()
    }

    async fn execute_request(&self, request: &ChatCompletionRequest<'_>) -> Result<String, LlmError> {
        if self.config.api_key.is_empty() {
            return Err(LlmError::InvalidRequest("API key is not set".to_string()));
        }

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), text));
        }

        let data: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse response: {}", e)))?;

        if let Some(usage) = &data.usage {
            info!("LLM request completed. Used {} tokens", usage.total_tokens);
        }

        data.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::ParseError("No choices returned in response".to_string()))
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String, LlmError> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: &messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let mut backoff = self.create_backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            if attempt > 1 {
                debug!("Retry attempt {} for LLM request", attempt);
            }

            match self.execute_request(&request).await {
                Ok(text) => return Ok(text),
                Err(err) => {
                    if !err.is_retryable() || attempt > self.config.max_retries {
                        error!("LLM request failed after {} attempts: {}", attempt, err);
                        return Err(err);
                    }

                    match backoff.next_backoff() {
                        Some(delay) => {
                            let jitter = rand::thread_rng().gen_range(0..=50);
                            let delay = delay + Duration::from_millis(jitter);
                            warn!("Retryable error: {}. Retrying in {:?}", err, delay);
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            error!("Exceeded maximum backoff time: {}", err);
                            return Err(err);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, max_retries: u32) -> LlmClient {
        LlmClient::new(LlmClientConfig {
            api_url: format!("{}/v1/chat/completions", server.uri()),
            api_key: "sk-test".to_string(),
            max_retries,
            initial_retry_delay_ms: 5,
            max_retry_delay_ms: 20,
            timeout: Duration::from_secs(5),
            ..LlmClientConfig::default()
        })
        .unwrap()
    }

    fn completion(text: &str) -> serde_json::Value {
        json!({
            "choices": [{"message": {"role": "assistant", "content": text}}],
            "usage": {"total_tokens": 42}
        })
    }

    #[tokio::test]
    async fn test_generate_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("hello")))
            .mount(&server)
            .await;

        let text = client(&server, 0)
            .generate(vec![ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("recovered")))
            .mount(&server)
            .await;

        let text = client(&server, 3)
            .generate(vec![ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(text, "recovered");
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, 3)
            .generate(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_generate_with_image_sends_data_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("a diagram")))
            .mount(&server)
            .await;

        let text = client(&server, 0)
            .generate_with_image("What is shown?", b"\x89PNG", "image/png")
            .await
            .unwrap();
        assert_eq!(text, "a diagram");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let url = body["messages"][0]["content"][1]["image_url"]["url"].as_str().unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let server = MockServer::start().await;
        let client = LlmClient::new(LlmClientConfig {
            api_url: server.uri(),
            ..LlmClientConfig::default()
        })
        .unwrap();

        assert!(!client.is_configured());
        let err = client.generate(vec![ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest(_)));
    }
}
