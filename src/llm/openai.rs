//! OpenAI-compatible chat-completions generator
//!
//! Talks to any endpoint that speaks `POST {base_url}/chat/completions`.
//! Non-streaming requests return the JSON body as-is; streaming requests are
//! read through `reqwest-eventsource` and forwarded as raw `data` fragments.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use super::generator::{GenerationOutput, GenerationRequest, Generator};
use crate::domain::User;
use crate::error::{Result, SymposiumError};

const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Configuration for the OpenAI-compatible generator
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub timeout: Duration,
    /// Force streaming even when the request does not ask for it
    pub stream: bool,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout: Duration::from_secs(300),
            stream: false,
        }
    }
}

pub struct OpenAiGenerator {
    client: Client,
    api_key: Option<String>,
    config: OpenAiConfig,
}

impl OpenAiGenerator {
    /// Create a generator, reading the API key from `config.api_key_env` if set.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        Self::with_api_key(api_key, config)
    }

    pub fn with_api_key(api_key: Option<String>, config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SymposiumError::Generation(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, request: &GenerationRequest, stream: bool) -> Value {
        json!({
            "model": request.model,
            "messages": request.messages,
            "stream": stream,
        })
    }

    fn post(&self, body: &Value, user: &User) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(self.endpoint())
            .header("content-type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        if !user.id.is_empty() {
            builder = builder.header("x-user-id", &user.id);
        }
        builder
    }

    async fn send_request(&self, body: Value, user: &User) -> Result<Value> {
        let response = self
            .post(&body, user)
            .send()
            .await
            .map_err(|e| SymposiumError::Generation(format!("Request failed: {}", e)))?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(SymposiumError::Generation(format!(
                "Rate limited, retry after {} seconds",
                retry_after
            )));
        }

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SymposiumError::Generation(format!("API error {}: {}", status, error_body)));
        }

        response
            .json()
            .await
            .map_err(|e| SymposiumError::Generation(format!("Failed to parse response: {}", e)))
    }

    fn open_stream(&self, body: Value, user: &User) -> Result<GenerationOutput> {
        let mut source = EventSource::new(self.post(&body, user))
            .map_err(|e| SymposiumError::Generation(format!("Cannot open event stream: {}", e)))?;

        let (tx, rx) = mpsc::channel::<Result<String>>(64);
        tokio::spawn(async move {
            while let Some(event) = source.next().await {
                let item = match event {
                    Ok(Event::Open) => continue,
                    Ok(Event::Message(message)) => Ok(message.data),
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(e) => Err(SymposiumError::Generation(format!("Stream failed: {}", e))),
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
            source.close();
        });

        let fragments = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });
        Ok(GenerationOutput::Stream(Box::pin(fragments)))
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest, user: &User) -> Result<GenerationOutput> {
        let stream = request.stream || self.config.stream;
        let body = self.build_body(request, stream);

        tracing::debug!(model = %request.model, stream, "Sending generation request");

        if stream {
            self.open_stream(body, user)
        } else {
            Ok(GenerationOutput::Complete(self.send_request(body, user).await?))
        }
    }
}

impl std::fmt::Debug for OpenAiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiGenerator")
            .field("base_url", &self.config.base_url)
            .field("stream", &self.config.stream)
            .finish()
    }
}
