//! Model registry for managing available LLM providers

#![allow(dead_code)] // new_empty() used in tests

use super::{all_models, LlmService, LoggingService, Provider};
use std::collections::HashMap;
use std::sync::Arc;

/// Configuration for LLM providers
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    /// Base-url override for OpenAI-compatible backends
    pub openai_base_url: Option<String>,
    /// Default model ID
    pub default_model: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            openai_base_url: std::env::var("OPENAI_BASE_URL").ok(),
            default_model: std::env::var("DEFAULT_MODEL").ok(),
        }
    }
}

/// Registry of available LLM models
pub struct ModelRegistry {
    services: HashMap<String, Arc<dyn LlmService>>,
    default_model: String,
}

/// Preferred default when available
const PREFERRED_DEFAULT: &str = "gpt-4o-mini";

/// Priority order for cheap models used for auxiliary work (titles)
const CHEAP_MODELS: &[&str] = &["gpt-4o-mini", "claude-haiku"];

impl ModelRegistry {
    /// Create an empty registry for testing purposes
    pub fn new_empty() -> Self {
        Self {
            services: HashMap::new(),
            default_model: "test-model".to_string(),
        }
    }

    pub fn new(config: &LlmConfig) -> Self {
        let mut services: HashMap<String, Arc<dyn LlmService>> = HashMap::new();

        for model_def in all_models() {
            if let Some(service) = Self::try_create_model(model_def, config) {
                services.insert(model_def.id.to_string(), service);
            }
        }

        let default_model = config
            .default_model
            .clone()
            .or_else(|| {
                if services.contains_key(PREFERRED_DEFAULT) {
                    Some(PREFERRED_DEFAULT.to_string())
                } else {
                    let mut ids: Vec<_> = services.keys().cloned().collect();
                    ids.sort();
                    ids.into_iter().next()
                }
            })
            .unwrap_or_else(|| PREFERRED_DEFAULT.to_string());

        Self {
            services,
            default_model,
        }
    }

    /// Try to create a model service, validating prerequisites
    fn try_create_model(
        model_def: &super::ModelDef,
        config: &LlmConfig,
    ) -> Option<Arc<dyn LlmService>> {
        let api_key = match model_def.provider {
            Provider::Anthropic => config.anthropic_api_key.as_ref()?,
            Provider::OpenAI => config.openai_api_key.as_ref()?,
        }
        .clone();

        if api_key.is_empty() {
            return None;
        }

        let base_url = match model_def.provider {
            Provider::OpenAI => config.openai_base_url.as_deref(),
            Provider::Anthropic => None,
        };

        match (model_def.factory)(&api_key, base_url) {
            Ok(service) => Some(Arc::new(LoggingService::new(service))),
            Err(_) => None,
        }
    }

    /// Get a model by ID
    pub fn get(&self, model_id: &str) -> Option<Arc<dyn LlmService>> {
        self.services.get(model_id).cloned()
    }

    /// Get the default model
    pub fn default(&self) -> Option<Arc<dyn LlmService>> {
        self.get(&self.default_model)
    }

    /// Get the default model ID
    pub fn default_model_id(&self) -> &str {
        &self.default_model
    }

    /// List all available model IDs
    pub fn available_models(&self) -> Vec<String> {
        let mut models: Vec<_> = self.services.keys().cloned().collect();
        models.sort();
        models
    }

    /// Get detailed information about available models
    pub fn available_model_info(&self) -> Vec<crate::api::ModelInfo> {
        let mut model_infos = Vec::new();

        for model_def in all_models() {
            if self.services.contains_key(model_def.id) {
                model_infos.push(crate::api::ModelInfo {
                    id: model_def.id.to_string(),
                    provider: model_def.provider.display_name().to_string(),
                    description: model_def.description.to_string(),
                    context_window: model_def.context_window,
                });
            }
        }

        model_infos
    }

    /// Check if any models are available
    pub fn has_models(&self) -> bool {
        !self.services.is_empty()
    }

    /// Get a cheap/fast model for auxiliary tasks like title generation.
    pub fn get_cheap_model(&self) -> Option<Arc<dyn LlmService>> {
        for model_id in CHEAP_MODELS {
            if let Some(service) = self.get(model_id) {
                return Some(service);
            }
        }
        self.default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_api_keys_no_models() {
        let config = LlmConfig::default();
        let registry = ModelRegistry::new(&config);
        assert!(registry.available_models().is_empty());
    }

    #[test]
    fn anthropic_key_only_anthropic_models() {
        let config = LlmConfig {
            anthropic_api_key: Some("test-key".to_string()),
            ..Default::default()
        };
        let registry = ModelRegistry::new(&config);

        let models = registry.available_models();
        assert!(!models.is_empty());
        for model_id in &models {
            assert!(
                model_id.contains("claude"),
                "Expected claude model, got {model_id}"
            );
        }
    }

    #[test]
    fn default_model_selection() {
        let config = LlmConfig {
            openai_api_key: Some("test-key".to_string()),
            ..Default::default()
        };
        let registry = ModelRegistry::new(&config);
        assert_eq!(registry.default_model_id(), "gpt-4o-mini");
    }

    #[test]
    fn custom_default_model() {
        let config = LlmConfig {
            openai_api_key: Some("test-key".to_string()),
            default_model: Some("gpt-4o".to_string()),
            ..Default::default()
        };
        let registry = ModelRegistry::new(&config);
        assert_eq!(registry.default_model_id(), "gpt-4o");
    }

    #[test]
    fn cheap_model_prefers_mini_then_haiku() {
        let config = LlmConfig {
            anthropic_api_key: Some("test-key".to_string()),
            ..Default::default()
        };
        let registry = ModelRegistry::new(&config);
        let cheap = registry.get_cheap_model().expect("cheap model");
        assert_eq!(cheap.model_id(), "claude-haiku");

        let both = LlmConfig {
            anthropic_api_key: Some("test-key".to_string()),
            openai_api_key: Some("test-key".to_string()),
            ..Default::default()
        };
        let registry = ModelRegistry::new(&both);
        let cheap = registry.get_cheap_model().expect("cheap model");
        assert_eq!(cheap.model_id(), "gpt-4o-mini");
    }

    #[test]
    fn model_info_metadata() {
        let config = LlmConfig {
            openai_api_key: Some("test-key".to_string()),
            ..Default::default()
        };
        let registry = ModelRegistry::new(&config);

        let model_infos = registry.available_model_info();
        assert!(!model_infos.is_empty());
        for info in &model_infos {
            assert!(!info.id.is_empty());
            assert_eq!(info.provider, "OpenAI");
            assert!(info.context_window > 0);
        }
    }
}
