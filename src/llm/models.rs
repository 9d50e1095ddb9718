//! Centralized model definitions for all LLM providers

use super::anthropic::AnthropicModel;
use super::openai::OpenAIModel;
use super::{AnthropicService, LlmService, OpenAIService};
use std::sync::Arc;

/// LLM provider enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Anthropic,
    OpenAI,
}

impl Provider {
    /// Get the display name for this provider
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Anthropic => "Anthropic",
            Provider::OpenAI => "OpenAI",
        }
    }
}

/// Model definition with metadata
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// User-facing model ID (e.g., "claude-sonnet")
    pub id: &'static str,
    /// Provider for this model
    pub provider: Provider,
    /// Human-readable description
    pub description: &'static str,
    /// Context window size in tokens
    pub context_window: usize,
    /// Factory: (api key, optional base-url override) -> service
    pub factory: fn(&str, Option<&str>) -> Result<Arc<dyn LlmService>, String>,
}

/// Get all available model definitions
pub fn all_models() -> &'static [ModelDef] {
    &[
        ModelDef {
            id: "claude-sonnet",
            provider: Provider::Anthropic,
            description: "Claude Sonnet (balanced performance)",
            context_window: 200_000,
            factory: |api_key, _| {
                if api_key.is_empty() {
                    return Err("claude-sonnet requires ANTHROPIC_API_KEY".to_string());
                }
                Ok(Arc::new(AnthropicService::new(
                    api_key.to_string(),
                    AnthropicModel::ClaudeSonnet,
                )))
            },
        },
        ModelDef {
            id: "claude-haiku",
            provider: Provider::Anthropic,
            description: "Claude Haiku (fast, efficient)",
            context_window: 200_000,
            factory: |api_key, _| {
                if api_key.is_empty() {
                    return Err("claude-haiku requires ANTHROPIC_API_KEY".to_string());
                }
                Ok(Arc::new(AnthropicService::new(
                    api_key.to_string(),
                    AnthropicModel::ClaudeHaiku,
                )))
            },
        },
        ModelDef {
            id: "gpt-4o",
            provider: Provider::OpenAI,
            description: "GPT-4o (flagship)",
            context_window: 128_000,
            factory: |api_key, base_url| {
                if api_key.is_empty() {
                    return Err("gpt-4o requires OPENAI_API_KEY".to_string());
                }
                Ok(Arc::new(OpenAIService::new(
                    api_key.to_string(),
                    OpenAIModel::Gpt4o,
                    base_url,
                )))
            },
        },
        ModelDef {
            id: "gpt-4o-mini",
            provider: Provider::OpenAI,
            description: "GPT-4o mini (fast, inexpensive)",
            context_window: 128_000,
            factory: |api_key, base_url| {
                if api_key.is_empty() {
                    return Err("gpt-4o-mini requires OPENAI_API_KEY".to_string());
                }
                Ok(Arc::new(OpenAIService::new(
                    api_key.to_string(),
                    OpenAIModel::Gpt4oMini,
                    base_url,
                )))
            },
        },
        ModelDef {
            id: "o4-mini",
            provider: Provider::OpenAI,
            description: "o4-mini (reasoning)",
            context_window: 200_000,
            factory: |api_key, base_url| {
                if api_key.is_empty() {
                    return Err("o4-mini requires OPENAI_API_KEY".to_string());
                }
                Ok(Arc::new(OpenAIService::new(
                    api_key.to_string(),
                    OpenAIModel::O4Mini,
                    base_url,
                )))
            },
        },
    ]
}
