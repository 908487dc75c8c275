use async_trait::async_trait;
use llmroom_config::BackendConfig;
use llmroom_core::{Backend, Completion, Role, Turn, Usage};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

use crate::retry::RetryPolicy;

/// Token counts as reported by the provider; any of them may be missing.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UsagePayload {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: Option<u32>,
}

impl UsagePayload {
    fn into_usage(self) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self
                .total_tokens
                .unwrap_or_else(|| self.prompt_tokens.saturating_add(self.completion_tokens)),
        }
    }
}

/// Client for any server speaking the OpenAI chat-completions protocol.
pub struct BasicOpenAiBackend {
    endpoint: String,
    credential: Option<String>,
    default_model: String,
    default_system_prompt: String,
    timeout: Option<Duration>,
    retry: RetryPolicy,
}

impl BasicOpenAiBackend {
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.openai.com/v1";

    #[must_use]
    pub fn new(default_model: String, default_system_prompt: String) -> Self {
        Self {
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            credential: None,
            default_model,
            default_system_prompt,
            timeout: None,
            retry: RetryPolicy::none(),
        }
    }

    #[must_use]
    pub fn from_config(config: &BackendConfig) -> Self {
        let mut backend = Self::new(
            config.default_model.clone(),
            config.default_system_prompt.clone(),
        )
        .with_retry(RetryPolicy::from_secs(&config.retry_delays_secs));

        if let Some(endpoint) = &config.endpoint {
            backend = backend.with_endpoint(endpoint);
        }
        backend.credential.clone_from(&config.credential);
        backend.timeout = config.timeout_secs.map(Duration::from_secs);
        backend
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }

    /// The system prompt goes first, followed by the history in order.
    fn request_body(context: &[Turn], system: &str, model: &str) -> Value {
        let mut messages = Vec::with_capacity(context.len() + 1);
        if !system.is_empty() {
            messages.push(json!({ "role": Role::System, "content": system }));
        }
        messages.extend(
            context
                .iter()
                .map(|turn| json!({ "role": turn.role, "content": turn.content })),
        );

        json!({
            "model": model,
            "messages": messages,
        })
    }

    fn parse_completion(response: &Value) -> anyhow::Result<Completion> {
        let message = &response["choices"][0]["message"];

        let content = message["content"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid response format: missing content"))?
            .to_string();

        let role = match message["role"].as_str() {
            Some(role) => role.parse::<Role>()?,
            None => Role::Assistant,
        };

        let usage = response
            .get("usage")
            .filter(|u| u.is_object())
            .and_then(|u| serde_json::from_value::<UsagePayload>(u.clone()).ok())
            .map(UsagePayload::into_usage);

        Ok(Completion {
            role,
            content,
            usage,
        })
    }

    async fn try_send(&self, http: &reqwest::Client, body: &Value) -> anyhow::Result<Completion> {
        let mut request = http.post(self.completions_url()).json(body);
        if let Some(credential) = &self.credential {
            request = request.bearer_auth(credential);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        Self::parse_completion(&response)
    }
}

#[async_trait]
impl Backend for BasicOpenAiBackend {
    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn default_system_prompt(&self) -> &str {
        &self.default_system_prompt
    }

    async fn create_chat_completion(
        &self,
        http: &reqwest::Client,
        context: &[Turn],
        system: &str,
        model: &str,
    ) -> anyhow::Result<Completion> {
        let body = Self::request_body(context, system, model);

        info!(
            "Sending request to {}: model={}, turns={}",
            self.endpoint,
            model,
            context.len()
        );

        let completion = self.retry.run(|| self.try_send(http, &body)).await?;

        if let Some(usage) = &completion.usage {
            debug!(
                "Tokens: {} prompt + {} completion = {} total",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }
        info!("Received completion from {}", self.endpoint);
        Ok(completion)
    }
}
