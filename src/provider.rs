use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::{
    config::{Config, Sampling},
    error::{ConfigError, GatewayError},
    media::{truncate_base64_in_json, truncate_for_log},
    models::ChatRequest,
};

const ERROR_BODY_LIMIT: usize = 2000;

/// One synchronous chat-completion call against a multimodal model.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Returns the raw text content of the first choice.
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError>;

    fn model(&self) -> &str;
}

/// OpenAI-compatible `/chat/completions` client.
pub struct ProviderClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    sampling: Sampling,
    timeout_secs: u64,
}

impl ProviderClient {
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Unexpected(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            sampling: config.sampling.clone(),
            timeout_secs: config.timeout.as_secs(),
        })
    }

    pub fn build_payload(&self, request: &ChatRequest) -> Value {
        let mut content = vec![json!({"type": "text", "text": request.user_text})];
        content.extend(request.images.iter().map(|uri| json!({"type": "image_url", "image_url": {"url": uri}})));

        let mut payload = json!({
            "model": self.model,
            "temperature": self.sampling.temperature,
            "top_p": self.sampling.top_p,
            "frequency_penalty": self.sampling.frequency_penalty,
            "presence_penalty": self.sampling.presence_penalty,
            "stream": false,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": content}
            ]
        });
        if request.json_mode {
            payload["response_format"] = json!({"type": "json_object"});
        }
        payload
    }

    fn map_send_error(&self, e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::UpstreamTimeout(self.timeout_secs)
        } else {
            GatewayError::UpstreamTransport(e.to_string())
        }
    }
}

#[async_trait]
impl ChatProvider for ProviderClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GatewayError::Configuration(ConfigError::Missing("ANALYZE_API_KEY")))?;

        let url = format!("{}/chat/completions", self.base_url);
        let payload = self.build_payload(request);

        info!("🔗 Calling {} with model {} and {} image(s)", url, self.model, request.images.len());
        if tracing::enabled!(tracing::Level::DEBUG) {
            let mut loggable = payload.clone();
            truncate_base64_in_json(&mut loggable);
            debug!("📤 Request body: {}", loggable);
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ Upstream error response: {}", truncate_for_log(&body, ERROR_BODY_LIMIT));
            return Err(GatewayError::UpstreamHttp { status: status.as_u16(), body: truncate_for_log(&body, ERROR_BODY_LIMIT) });
        }

        let response_text = response.text().await.map_err(|e| self.map_send_error(e))?;
        let parsed: CompletionResponse = serde_json::from_str(&response_text).map_err(|e| GatewayError::UpstreamFormat {
            reason: format!("completion envelope did not parse: {e}"),
            content: Some(truncate_for_log(&response_text, ERROR_BODY_LIMIT)),
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        info!("📝 Upstream content ({} chars): {}", content.chars().count(), truncate_for_log(&content, 200));

        if content.trim().is_empty() {
            return Err(GatewayError::format("upstream returned empty content"));
        }
        Ok(content)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}
