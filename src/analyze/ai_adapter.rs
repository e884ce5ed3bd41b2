//! AI adapter: provider abstraction + ordered fallback cascade.
//!
//! Each provider does one remote call. `AiCascade` walks them in order and returns the
//! first non-empty completion; if all fail it returns a static placeholder so the run can
//! still send something.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::ai::ProviderConfig;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional financial and market analyst. \
Produce concise markdown-formatted briefings with sections, tables, and actionable insight.";

pub const BASIC_ANALYSIS: &str = "## Market Analysis Unavailable\n\n\
All configured AI providers failed to respond. Please check API keys and network connectivity.";

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub prompt: &'a str,
    pub system_prompt: Option<&'a str>,
    pub verbosity: Option<&'a str>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// What a cascade run produced and who produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeOutput {
    pub text: String,
    /// e.g. "OpenAI gpt-5-mini", "Gemini gemini-2.5-flash (fallback)", "basic"
    pub provider: String,
    pub usage: Option<TokenUsage>,
}

/// Low-level provider: does a *real* remote call.
pub trait TextGenerator: Send + Sync + 'static {
    fn generate<'a>(
        &'a self,
        req: GenerateRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<Generation>> + Send + 'a>>;
    /// Label for logs and the digest footer.
    fn name(&self) -> String;
}

/// Collapse provider-specific counters into one shape; derive the total when missing.
pub fn normalize_usage(
    prompt: Option<u64>,
    completion: Option<u64>,
    total: Option<u64>,
) -> Option<TokenUsage> {
    let total = match (total, prompt, completion) {
        (Some(t), _, _) => Some(t),
        (None, Some(p), Some(c)) => Some(p + c),
        _ => None,
    };
    if prompt.is_none() && completion.is_none() && total.is_none() {
        return None;
    }
    Some(TokenUsage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: total,
    })
}

fn u64_at(v: &Value, key: &str) -> Option<u64> {
    v.get(key).and_then(Value::as_u64)
}

fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => bail!("environment variable {name} is required for AI provider"),
    }
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent("market-digest/0.1")
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .build()
        .context("building ai http client")
}

async fn post_json(req: reqwest::RequestBuilder, label: &str) -> Result<Value> {
    let resp = req.send().await.with_context(|| format!("{label}: network error"))?;
    let status = resp.status();
    if !status.is_success() {
        let detail = resp
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read error body>".to_string());
        let detail: String = detail.chars().take(500).collect();
        bail!("{label}: HTTP {}: {detail}", status.as_u16());
    }
    resp.json::<Value>()
        .await
        .with_context(|| format!("{label}: invalid json"))
}

fn non_empty(text: &str, label: &str) -> Result<String> {
    if text.trim().is_empty() {
        bail!("{label}: empty response");
    }
    Ok(text.to_string())
}

// ------------------------------------------------------------
// Concrete providers
// ------------------------------------------------------------

/// OpenAI Chat Completions. Requires `OPENAI_API_KEY`.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    config: ProviderConfig,
}

impl OpenAiProvider {
    const ENDPOINT: &'static str = "https://api.openai.com/v1/chat/completions";

    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_key: require_env("OPENAI_API_KEY")?,
            config: config.clone(),
        })
    }

    /// Request body; gpt-5 models take reasoning/verbosity instead of sampling knobs.
    pub fn request_body(config: &ProviderConfig, req: &GenerateRequest<'_>) -> Value {
        let mut body = json!({
            "model": config.model,
            "messages": [
                { "role": "system", "content": req.system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT) },
                { "role": "user", "content": req.prompt },
            ],
        });
        if config.model.starts_with("gpt-5") {
            body["max_completion_tokens"] = json!(8000);
            if let Some(effort) = &config.reasoning_effort {
                body["reasoning_effort"] = json!(effort);
            }
            let verbosity = req
                .verbosity
                .or(config.verbosity.as_deref())
                .unwrap_or("medium");
            body["verbosity"] = json!(verbosity);
        } else {
            body["max_tokens"] = json!(8000);
            body["temperature"] = json!(0.7);
            body["top_p"] = json!(0.9);
        }
        body
    }
}

impl TextGenerator for OpenAiProvider {
    fn generate<'a>(
        &'a self,
        req: GenerateRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<Generation>> + Send + 'a>> {
        Box::pin(async move {
            let label = self.name();
            let body = Self::request_body(&self.config, &req);
            let payload = post_json(
                self.http
                    .post(Self::ENDPOINT)
                    .bearer_auth(&self.api_key)
                    .json(&body),
                &label,
            )
            .await?;
            let content = payload
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .unwrap_or("");
            let usage = payload.get("usage").and_then(|u| {
                normalize_usage(
                    u64_at(u, "prompt_tokens"),
                    u64_at(u, "completion_tokens"),
                    u64_at(u, "total_tokens"),
                )
            });
            Ok(Generation {
                text: non_empty(content, &label)?,
                usage,
            })
        })
    }

    fn name(&self) -> String {
        format!("OpenAI {}", self.config.model)
    }
}

/// Google Gemini `generateContent`. Requires `GEMINI_API_KEY`.
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    config: ProviderConfig,
}

impl GeminiProvider {
    const ENDPOINT: &'static str = "https://generativelanguage.googleapis.com/v1beta";

    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_key: require_env("GEMINI_API_KEY")?,
            config: config.clone(),
        })
    }
}

impl TextGenerator for GeminiProvider {
    fn generate<'a>(
        &'a self,
        req: GenerateRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<Generation>> + Send + 'a>> {
        Box::pin(async move {
            let label = self.name();
            let text = format!(
                "{}\n\n{}",
                req.system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT),
                req.prompt
            );
            let body = json!({
                "contents": [ { "parts": [ { "text": text } ] } ],
                "generationConfig": {
                    "temperature": 0.7,
                    "topK": 40,
                    "topP": 0.95,
                    "maxOutputTokens": 12000,
                },
            });
            let url = format!("{}/models/{}:generateContent", Self::ENDPOINT, self.config.model);
            let payload = post_json(
                self.http
                    .post(url)
                    .query(&[("key", self.api_key.as_str())])
                    .json(&body),
                &label,
            )
            .await?;
            let content = payload
                .pointer("/candidates/0/content/parts/0/text")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("{label}: no candidates returned"))?;
            let usage = payload.get("usageMetadata").and_then(|u| {
                normalize_usage(
                    u64_at(u, "promptTokenCount"),
                    u64_at(u, "candidatesTokenCount"),
                    u64_at(u, "totalTokenCount"),
                )
            });
            Ok(Generation {
                text: non_empty(content, &label)?,
                usage,
            })
        })
    }

    fn name(&self) -> String {
        format!("Gemini {}", self.config.model)
    }
}

/// Anthropic Messages API. Requires `ANTHROPIC_API_KEY`.
pub struct AnthropicProvider {
    http: reqwest::Client,
    api_key: String,
    config: ProviderConfig,
}

impl AnthropicProvider {
    const ENDPOINT: &'static str = "https://api.anthropic.com/v1/messages";

    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_key: require_env("ANTHROPIC_API_KEY")?,
            config: config.clone(),
        })
    }
}

impl TextGenerator for AnthropicProvider {
    fn generate<'a>(
        &'a self,
        req: GenerateRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<Generation>> + Send + 'a>> {
        Box::pin(async move {
            let label = self.name();
            let body = json!({
                "model": self.config.model,
                "system": req.system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT),
                "messages": [ { "role": "user", "content": req.prompt } ],
                "max_tokens": 4000,
                "temperature": 0.7,
            });
            let payload = post_json(
                self.http
                    .post(Self::ENDPOINT)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", "2023-06-01")
                    .json(&body),
                &label,
            )
            .await?;
            let content = payload
                .pointer("/content/0/text")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("{label}: no content returned"))?;
            let usage = payload.get("usage").and_then(|u| {
                normalize_usage(
                    u64_at(u, "input_tokens"),
                    u64_at(u, "output_tokens"),
                    u64_at(u, "total_tokens"),
                )
            });
            Ok(Generation {
                text: non_empty(content, &label)?,
                usage,
            })
        })
    }

    fn name(&self) -> String {
        format!("Anthropic {}", self.config.model)
    }
}

/// Deterministic provider for tests/local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub label: String,
    pub fixed: Option<String>,
}

impl MockProvider {
    pub fn replying(text: &str) -> Self {
        Self {
            label: "mock".to_string(),
            fixed: Some(text.to_string()),
        }
    }

    /// Always fails; handy for exercising the fallback path.
    pub fn failing(label: &str) -> Self {
        Self {
            label: label.to_string(),
            fixed: None,
        }
    }
}

impl TextGenerator for MockProvider {
    fn generate<'a>(
        &'a self,
        _req: GenerateRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<Generation>> + Send + 'a>> {
        let out = self.fixed.clone();
        let label = self.label.clone();
        Box::pin(async move {
            match out {
                Some(text) => Ok(Generation {
                    text,
                    usage: normalize_usage(Some(10), Some(20), None),
                }),
                None => bail!("{label}: simulated failure"),
            }
        })
    }

    fn name(&self) -> String {
        self.label.clone()
    }
}

// ------------------------------------------------------------
// Cascade
// ------------------------------------------------------------

pub struct AiCascade {
    providers: Vec<Box<dyn TextGenerator>>,
}

impl AiCascade {
    pub fn from_providers(providers: Vec<Box<dyn TextGenerator>>) -> Self {
        if providers.is_empty() {
            tracing::error!("no AI providers initialised; falling back to static analysis");
        }
        Self { providers }
    }

    /// Build providers from config rows, skipping ones that can't start (missing key,
    /// unknown provider).
    ///
    /// * If `AI_TEST_MODE=mock`, returns a deterministic mock cascade.
    pub fn from_configs(configs: &[ProviderConfig]) -> Self {
        if std::env::var("AI_TEST_MODE")
            .map(|v| v == "mock")
            .unwrap_or(false)
        {
            return Self::from_providers(vec![Box::new(MockProvider::replying(
                "## Mock briefing\n\nAI_TEST_MODE=mock is set.",
            ))]);
        }

        let mut providers: Vec<Box<dyn TextGenerator>> = Vec::new();
        for cfg in configs {
            let built: Result<Box<dyn TextGenerator>> = match cfg.provider.as_str() {
                "openai" => OpenAiProvider::new(cfg).map(|p| Box::new(p) as Box<dyn TextGenerator>),
                "gemini" => GeminiProvider::new(cfg).map(|p| Box::new(p) as Box<dyn TextGenerator>),
                "anthropic" => {
                    AnthropicProvider::new(cfg).map(|p| Box::new(p) as Box<dyn TextGenerator>)
                }
                other => Err(anyhow!("unknown provider '{other}' in pipeline")),
            };
            match built {
                Ok(p) => providers.push(p),
                Err(e) => {
                    tracing::warn!(provider = %cfg.provider, error = %e, "failed to initialise provider")
                }
            }
        }
        Self::from_providers(providers)
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub async fn generate(&self, req: GenerateRequest<'_>) -> CascadeOutput {
        for (idx, provider) in self.providers.iter().enumerate() {
            match provider.generate(req).await {
                Ok(g) => {
                    let mut label = provider.name();
                    if idx > 0 {
                        label.push_str(" (fallback)");
                        counter!("digest_ai_fallbacks_total").increment(1);
                    }
                    return CascadeOutput {
                        text: g.text,
                        provider: label,
                        usage: g.usage,
                    };
                }
                Err(e) => tracing::warn!(provider = %provider.name(), error = %e, "provider failure"),
            }
        }
        tracing::error!("all providers failed; returning static analysis");
        CascadeOutput {
            text: BASIC_ANALYSIS.to_string(),
            provider: "basic".to_string(),
            usage: None,
        }
    }
}
