//! AI text-generation providers
//!
//! One trait, three wire formats. The active provider is chosen at call time
//! from the settings snapshot, so an admin can switch providers without a
//! restart. Provider failures surface as [`Error::Provider`] and feed the
//! retry scheduler; the providers themselves never retry.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AiSettings;
use crate::error::{Error, Result};

/// Output of a single generation call
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub provider: String,
    pub model: String,
    /// Token accounting when the provider reports it
    pub usage: Option<TokenUsage>,
}

/// Token counts reported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A text-generation backend
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Registry key, e.g. `openai`
    fn name(&self) -> &'static str;

    /// Generate one completion for the given system and user prompts
    async fn generate(&self, system: &str, user: &str, ai: &AiSettings) -> Result<Generation>;
}

/// Provider lookup keyed by the settings `ai.provider` value
pub struct ProviderRegistry {
    providers: HashMap<&'static str, Arc<dyn AiProvider>>,
}

impl ProviderRegistry {
    /// Registry with all built-in providers
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut registry = Self {
            providers: HashMap::new(),
        };
        registry.register(Arc::new(OpenAiProvider::new(timeout)?));
        registry.register(Arc::new(AnthropicProvider::new(timeout)?));
        registry.register(Arc::new(GoogleProvider::new(timeout)?));
        Ok(registry)
    }

    pub fn register(&mut self, provider: Arc<dyn AiProvider>) {
        self.providers.insert(provider.name(), provider);
    }

    /// Resolve the provider named in the settings snapshot
    pub fn get(&self, name: &str) -> Result<Arc<dyn AiProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::config(format!("unknown AI provider: {name}")))
    }
}

async fn read_error_body(response: reqwest::Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Error::provider(format!("{status}: {body}"))
}

// ============================================================================
// OpenAI
// ============================================================================

pub struct OpenAiProvider {
    http: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: String,
}

impl OpenAiProvider {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            base_url: "https://api.openai.com".to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, system: &str, user: &str, ai: &AiSettings) -> Result<Generation> {
        let body = serde_json::json!({
            "model": ai.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "temperature": ai.temperature,
            "max_tokens": ai.max_tokens,
        });

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&ai.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(read_error_body(response).await);
        }

        let parsed: OpenAiResponse = response.json().await?;
        let usage = parsed.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::provider("openai returned no choices"))?;

        Ok(Generation {
            text,
            provider: self.name().to_string(),
            model: ai.model.clone(),
            usage,
        })
    }
}

// ============================================================================
// Anthropic
// ============================================================================

pub struct AnthropicProvider {
    http: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: String,
}

impl AnthropicProvider {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            base_url: "https://api.anthropic.com".to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl AiProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn generate(&self, system: &str, user: &str, ai: &AiSettings) -> Result<Generation> {
        let body = serde_json::json!({
            "model": ai.model,
            "max_tokens": ai.max_tokens,
            "temperature": ai.temperature,
            "system": system,
            "messages": [{"role": "user", "content": user}],
        });

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &ai.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(read_error_body(response).await);
        }

        let parsed: AnthropicResponse = response.json().await?;
        let usage = parsed.usage.map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        });
        let text = parsed
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| Error::provider("anthropic returned no content"))?;

        Ok(Generation {
            text,
            provider: self.name().to_string(),
            model: ai.model.clone(),
            usage,
        })
    }
}

// ============================================================================
// Google
// ============================================================================

pub struct GoogleProvider {
    http: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct GoogleResponse {
    candidates: Vec<GoogleCandidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<GoogleUsage>,
}

#[derive(Deserialize)]
struct GoogleUsage {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
struct GoogleCandidate {
    content: GoogleContent,
}

#[derive(Deserialize)]
struct GoogleContent {
    parts: Vec<GooglePart>,
}

#[derive(Deserialize)]
struct GooglePart {
    #[serde(default)]
    text: String,
}

impl GoogleProvider {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl AiProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn generate(&self, system: &str, user: &str, ai: &AiSettings) -> Result<Generation> {
        let body = serde_json::json!({
            "systemInstruction": {"parts": [{"text": system}]},
            "contents": [{"role": "user", "parts": [{"text": user}]}],
            "generationConfig": {
                "temperature": ai.temperature,
                "maxOutputTokens": ai.max_tokens,
            },
        });

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, ai.model, ai.api_key
        );
        let response = self.http.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(read_error_body(response).await);
        }

        let parsed: GoogleResponse = response.json().await?;
        let usage = parsed.usage_metadata.map(|u| TokenUsage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
        });
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| Error::provider("google returned no candidates"))?;

        Ok(Generation {
            text,
            provider: self.name().to_string(),
            model: ai.model.clone(),
            usage,
        })
    }
}
