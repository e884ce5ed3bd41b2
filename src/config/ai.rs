// src/config/ai.rs
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

pub const DEFAULT_AI_PIPELINE_PATH: &str = "config/ai_pipeline.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// "openai" | "gemini" | "anthropic" (case-insensitive)
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    #[serde(default)]
    pub verbosity: Option<String>,
}

impl ProviderConfig {
    pub fn new(provider: &str, model: &str) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            reasoning_effort: None,
            verbosity: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiPipelineConfig {
    pub pipeline: Vec<ProviderConfig>,
}

impl Default for AiPipelineConfig {
    fn default() -> Self {
        let mut openai = ProviderConfig::new("openai", "gpt-5-mini");
        openai.reasoning_effort = Some("medium".into());
        openai.verbosity = Some("medium".into());
        Self {
            pipeline: vec![
                openai,
                ProviderConfig::new("gemini", "gemini-2.5-flash"),
                ProviderConfig::new("anthropic", "claude-3-haiku-20240307"),
            ],
        }
    }
}

impl AiPipelineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading ai pipeline from {}", path.display()))?;
        let mut cfg: AiPipelineConfig =
            serde_json::from_str(&data).context("parsing ai pipeline json")?;

        // Normalize provider names, drop blank rows
        cfg.pipeline.retain(|p| !p.provider.trim().is_empty() && !p.model.trim().is_empty());
        for p in cfg.pipeline.iter_mut() {
            p.provider = p.provider.trim().to_lowercase();
        }
        if cfg.pipeline.is_empty() {
            bail!("no provider configurations in {}", path.display());
        }
        Ok(cfg)
    }

    /// Missing file means built-in default; a broken file is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelOption {
    pub value: &'static str,
    pub label: &'static str,
    pub provider: &'static str,
    pub supports_reasoning: bool,
}

const MODEL_CATALOG: &[ModelOption] = &[
    ModelOption { value: "gpt-5-mini", label: "GPT-5 Mini (OpenAI)", provider: "openai", supports_reasoning: true },
    ModelOption { value: "gpt-5-nano", label: "GPT-5 Nano (OpenAI)", provider: "openai", supports_reasoning: true },
    ModelOption { value: "gpt-4.1-mini", label: "GPT-4.1 Mini (OpenAI)", provider: "openai", supports_reasoning: true },
    ModelOption { value: "gemini-2.5-flash", label: "Gemini 2.5 Flash (Google)", provider: "gemini", supports_reasoning: false },
    ModelOption { value: "gemini-2.0-pro", label: "Gemini 2.0 Pro (Google)", provider: "gemini", supports_reasoning: false },
    ModelOption { value: "claude-3-haiku-20240307", label: "Claude 3 Haiku (Anthropic)", provider: "anthropic", supports_reasoning: false },
    ModelOption { value: "claude-3-sonnet-20240229", label: "Claude 3 Sonnet (Anthropic)", provider: "anthropic", supports_reasoning: false },
];

pub fn model_catalog() -> &'static [ModelOption] {
    MODEL_CATALOG
}

pub fn model_option(value: &str) -> Option<&'static ModelOption> {
    MODEL_CATALOG.iter().find(|m| m.value == value)
}

/// Provider order for one run: primary model, secondary (if its provider differs), then
/// pipeline entries for providers not yet present.
pub fn resolve_cascade(
    primary_model: &str,
    secondary_model: Option<&str>,
    reasoning_level: &str,
    pipeline: &AiPipelineConfig,
) -> Vec<ProviderConfig> {
    let build = |model: &str| -> Option<ProviderConfig> {
        let Some(option) = model_option(model) else {
            tracing::warn!(model, "unknown model requested");
            return None;
        };
        let mut cfg = ProviderConfig::new(option.provider, option.value);
        if option.provider == "openai" {
            cfg.reasoning_effort = Some(reasoning_level.to_string());
            cfg.verbosity = Some("medium".to_string());
        }
        Some(cfg)
    };

    let mut out: Vec<ProviderConfig> = Vec::new();
    if let Some(p) = build(primary_model) {
        out.push(p);
    }
    if let Some(sec) = secondary_model.filter(|s| *s != primary_model) {
        if let Some(s) = build(sec) {
            if out.iter().all(|e| e.provider != s.provider) {
                out.push(s);
            }
        }
    }
    for entry in &pipeline.pipeline {
        if out.iter().any(|e| e.provider == entry.provider) {
            continue;
        }
        out.push(entry.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cascade_puts_primary_first_and_dedups_providers() {
        let out = resolve_cascade(
            "claude-3-sonnet-20240229",
            Some("gpt-5-nano"),
            "high",
            &AiPipelineConfig::default(),
        );
        let names: Vec<(&str, &str)> = out
            .iter()
            .map(|p| (p.provider.as_str(), p.model.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("anthropic", "claude-3-sonnet-20240229"),
                ("openai", "gpt-5-nano"),
                ("gemini", "gemini-2.5-flash"),
            ]
        );
        assert_eq!(out[1].reasoning_effort.as_deref(), Some("high"));
    }

    #[test]
    fn secondary_with_same_provider_is_skipped() {
        let out = resolve_cascade("gpt-5-mini", Some("gpt-5-nano"), "medium", &AiPipelineConfig::default());
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].model, "gpt-5-mini");
        assert_eq!(out[1].provider, "gemini");
    }

    #[test]
    fn unknown_models_fall_through_to_pipeline() {
        let out = resolve_cascade("nope", None, "low", &AiPipelineConfig::default());
        assert_eq!(out, AiPipelineConfig::default().pipeline);
    }
}
