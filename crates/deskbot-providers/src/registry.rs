//! Provider registry: startup-time provider selection.

use std::collections::HashMap;
use std::sync::Arc;

use deskbot_core::{Config, ConfigError};

use crate::anthropic::AnthropicProvider;
use crate::openai::OpenAiProvider;
use crate::traits::Provider;

/// Registry of available completion providers.
///
/// Built once at startup and immutable thereafter; there is no hot-swapping
/// of providers within a running process. `register` exists for construction
/// and for injecting stubs in tests.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Initialize registry with all available providers based on configuration.
    ///
    /// API keys come from the config first, then from the environment
    /// (ANTHROPIC_API_KEY, OPENAI_API_KEY). Providers without a key are not
    /// registered.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();

        let anthropic_key = config
            .providers
            .anthropic
            .as_ref()
            .and_then(|c| c.resolve_api_key())
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok());

        if let Some(api_key) = anthropic_key {
            let mut provider = AnthropicProvider::new(&api_key);
            if let Some(ref anthropic_config) = config.providers.anthropic {
                if let Some(ref model) = anthropic_config.model {
                    provider = provider.with_model(model);
                }
                if let Some(ref base_url) = anthropic_config.base_url {
                    provider = provider.with_base_url(base_url);
                }
            }
            registry.register(Arc::new(provider));
        }

        let openai_key = config
            .providers
            .openai
            .as_ref()
            .and_then(|c| c.resolve_api_key())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());

        if let Some(api_key) = openai_key {
            let mut provider = OpenAiProvider::new(&api_key);
            if let Some(ref openai_config) = config.providers.openai {
                if let Some(ref model) = openai_config.model {
                    provider = provider.with_model(model);
                }
                if let Some(ref base_url) = openai_config.base_url {
                    provider = provider.with_base_url(base_url);
                }
            }
            registry.register(Arc::new(provider));
        }

        registry
    }

    /// Register a provider under its own id.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    /// Resolve a provider by name. Pure lookup, no state mutation.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Provider>, ConfigError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownProvider {
                name: name.to_string(),
            })
    }

    /// List registered provider names.
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_registered_provider() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(AnthropicProvider::new("test-key")));

        let provider = registry.resolve("anthropic").unwrap();
        assert_eq!(provider.id(), "anthropic");
        assert_eq!(registry.names(), vec!["anthropic"]);
    }

    #[test]
    fn test_resolve_unknown_provider_fails() {
        let registry = ProviderRegistry::new();
        let err = registry.resolve("anthropic").err().unwrap();
        assert!(matches!(err, ConfigError::UnknownProvider { ref name } if name == "anthropic"));
    }

    #[test]
    fn test_resolution_is_case_sensitive() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(OpenAiProvider::new("test-key")));

        assert!(registry.resolve("openai").is_ok());
        assert!(registry.resolve("OpenAI").is_err());
    }
}
