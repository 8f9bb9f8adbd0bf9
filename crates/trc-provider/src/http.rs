//! HTTP clients for OpenAI, Anthropic, and Google.
//!
//! Each client maps HTTP failures onto the closed [`ProviderError`] set:
//! 401/403 → `Auth`, 404 → `ModelNotFound`, 429 → `RateLimit`, 5xx and
//! transport faults → retryable `Api`, everything else → non-retryable `Api`.

use crate::{
    changed_files_of, ChatCompletion, ChatMessage, ChatRequest, PatchResult, Provider,
    ProviderError, TokenUsage,
};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};

const PATCH_SYSTEM_PROMPT: &str = "You are a code-change engine. Reply with a single unified \
diff (--- a/..., +++ b/...) and nothing else.";

fn retry_after_ms(response: &Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(|secs| secs * 1000)
}

async fn error_for(model: &str, response: Response) -> ProviderError {
    let status = response.status();
    let retry_after = retry_after_ms(&response);
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth(body),
        StatusCode::NOT_FOUND => ProviderError::ModelNotFound(model.to_string()),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimit {
            retry_after_ms: retry_after,
        },
        status if status.is_server_error() => ProviderError::Api {
            message: format!("{status}: {body}"),
            retryable: true,
        },
        status => ProviderError::Api {
            message: format!("{status}: {body}"),
            retryable: false,
        },
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    ProviderError::Api {
        message: format!("transport: {err}"),
        retryable: true,
    }
}

fn patch_request(model: &str, task_id: &str, instructions: Option<&str>, context: Option<&str>) -> ChatRequest {
    let mut prompt = format!("Task {task_id}.");
    if let Some(instructions) = instructions {
        prompt.push_str("\nInstructions:\n");
        prompt.push_str(instructions);
    }
    if let Some(context) = context {
        prompt.push_str("\nContext:\n");
        prompt.push_str(context);
    }
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(PATCH_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ],
        max_tokens: Some(4096),
    }
}

fn patch_from_completion(completion: ChatCompletion) -> PatchResult {
    PatchResult {
        changed_files: changed_files_of(&completion.text),
        patch_text: completion.text,
        usage: completion.usage,
    }
}

// ---------------------------------------------------------------------------
// OpenAI
// ---------------------------------------------------------------------------

/// OpenAI chat-completions client.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    /// Default API endpoint.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    /// Create a client against the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, Self::DEFAULT_BASE_URL)
    }

    /// Create a client against a custom endpoint. Tests point this at a mock
    /// server.
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatCompletion, ProviderError> {
        let body = json!({
            "model": request.model,
            "messages": request.messages,
            "max_tokens": request.max_tokens,
        });
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(error_for(&request.model, response).await);
        }

        let payload: Value = response.json().await.map_err(transport_error)?;
        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let usage = payload.get("usage").map(|u| TokenUsage {
            tokens_in: u["prompt_tokens"].as_u64().unwrap_or(0),
            tokens_out: u["completion_tokens"].as_u64().unwrap_or(0),
        });
        Ok(ChatCompletion {
            model: request.model,
            text,
            usage,
        })
    }

    async fn generate_patch(
        &self,
        model: &str,
        task_id: &str,
        instructions: Option<&str>,
        context: Option<&str>,
    ) -> Result<PatchResult, ProviderError> {
        let completion = self
            .chat(patch_request(model, task_id, instructions, context))
            .await?;
        Ok(patch_from_completion(completion))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_for("", response).await)
        }
    }
}

// ---------------------------------------------------------------------------
// Anthropic
// ---------------------------------------------------------------------------

/// Anthropic messages client.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Default API endpoint.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";
    const API_VERSION: &'static str = "2023-06-01";

    /// Create a client against the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, Self::DEFAULT_BASE_URL)
    }

    /// Create a client against a custom endpoint.
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatCompletion, ProviderError> {
        // Anthropic wants the system prompt outside the messages array.
        let system: String = request
            .messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let messages: Vec<&ChatMessage> = request
            .messages
            .iter()
            .filter(|m| m.role != "system")
            .collect();

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens.unwrap_or(4096),
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = Value::String(system);
        }

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", Self::API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(error_for(&request.model, response).await);
        }

        let payload: Value = response.json().await.map_err(transport_error)?;
        let text = payload["content"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let usage = payload.get("usage").map(|u| TokenUsage {
            tokens_in: u["input_tokens"].as_u64().unwrap_or(0),
            tokens_out: u["output_tokens"].as_u64().unwrap_or(0),
        });
        Ok(ChatCompletion {
            model: request.model,
            text,
            usage,
        })
    }

    async fn generate_patch(
        &self,
        model: &str,
        task_id: &str,
        instructions: Option<&str>,
        context: Option<&str>,
    ) -> Result<PatchResult, ProviderError> {
        let completion = self
            .chat(patch_request(model, task_id, instructions, context))
            .await?;
        Ok(patch_from_completion(completion))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let response = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", Self::API_VERSION)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_for("", response).await)
        }
    }
}

// ---------------------------------------------------------------------------
// Google
// ---------------------------------------------------------------------------

/// Google Gemini client.
pub struct GoogleProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GoogleProvider {
    /// Default API endpoint.
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com";

    /// Create a client against the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, Self::DEFAULT_BASE_URL)
    }

    /// Create a client against a custom endpoint.
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Provider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatCompletion, ProviderError> {
        let text: String = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let body = json!({
            "contents": [{ "parts": [{ "text": text }] }],
        });

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent?key={}",
                self.base_url, request.model, self.api_key
            ))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(error_for(&request.model, response).await);
        }

        let payload: Value = response.json().await.map_err(transport_error)?;
        let text = payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let usage = payload.get("usageMetadata").map(|u| TokenUsage {
            tokens_in: u["promptTokenCount"].as_u64().unwrap_or(0),
            tokens_out: u["candidatesTokenCount"].as_u64().unwrap_or(0),
        });
        Ok(ChatCompletion {
            model: request.model,
            text,
            usage,
        })
    }

    async fn generate_patch(
        &self,
        model: &str,
        task_id: &str,
        instructions: Option<&str>,
        context: Option<&str>,
    ) -> Result<PatchResult, ProviderError> {
        let completion = self
            .chat(patch_request(model, task_id, instructions, context))
            .await?;
        Ok(patch_from_completion(completion))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let response = self
            .client
            .get(format!(
                "{}/v1beta/models?key={}",
                self.base_url, self.api_key
            ))
            .send()
            .await
            .map_err(transport_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_for("", response).await)
        }
    }
}
