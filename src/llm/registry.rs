use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{LlmConfig, ProviderEntry};
use crate::errors::{VoxPlayError, VoxPlayResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

/// Registry of all available LLM providers, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    active: String,
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get_active(&self) -> VoxPlayResult<Arc<dyn LlmProvider>> {
        self.providers.get(&self.active).cloned().ok_or_else(|| {
            VoxPlayError::Config(format!(
                "Active provider '{}' not found in registry",
                self.active
            ))
        })
    }

    /// Provider plus model settings for the action call.
    pub fn active_call(&self) -> VoxPlayResult<(Arc<dyn LlmProvider>, CallConfig)> {
        let provider = self.get_active()?;
        let (model, temperature) = self
            .llm_config
            .providers
            .get(&self.active)
            .map(|p| (p.model.clone(), p.temperature))
            .unwrap_or_else(|| (String::new(), 0.1));
        Ok((provider, CallConfig { model, temperature }))
    }

    /// Build a registry from the loaded config, reading API keys from the
    /// environment.
    ///
    /// Fails when the active provider is missing or has no key: without a
    /// credential no cycle can ever succeed.
    pub fn from_config(config: &LlmConfig) -> VoxPlayResult<Self> {
        Self::from_config_with_env(config, |name| std::env::var(name).ok())
    }

    pub fn from_config_with_env(
        config: &LlmConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> VoxPlayResult<Self> {
        let mut registry = Self {
            providers: HashMap::new(),
            active: config.active_provider.clone(),
            llm_config: config.clone(),
        };

        let active_entry = config.providers.get(&config.active_provider).ok_or_else(|| {
            VoxPlayError::Config(format!(
                "active provider '{}' has no [llm.providers.{}] entry",
                config.active_provider, config.active_provider
            ))
        })?;
        if resolve_api_key(&config.active_provider, active_entry, &env).is_none() {
            return Err(VoxPlayError::Config(format!(
                "no API key for provider '{}'; set VOXPLAY_{}_API_KEY or GEMINI_API_KEY",
                config.active_provider,
                config.active_provider.to_uppercase()
            )));
        }

        for (id, entry) in &config.providers {
            let Some(api_key) = resolve_api_key(id, entry, &env) else {
                tracing::debug!(provider = %id, "skipping provider without API key");
                continue;
            };
            let provider = OpenAiCompatibleProvider::new(
                id.clone(),
                entry.api_base.clone(),
                api_key,
                Duration::from_secs(entry.timeout_secs),
            )?;
            registry.register(Arc::new(provider));
        }
        tracing::info!(
            active = %registry.active,
            registered = registry.providers.len(),
            "LLM providers ready"
        );
        Ok(registry)
    }
}

/// `VOXPLAY_<ID>_API_KEY`, then `GEMINI_API_KEY`, then the config entry.
fn resolve_api_key(
    id: &str,
    entry: &ProviderEntry,
    env: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env(&format!("VOXPLAY_{}_API_KEY", id.to_uppercase()))
        .or_else(|| env("GEMINI_API_KEY"))
        .or_else(|| entry.api_key.clone())
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn missing_key_is_fatal() {
        let err = match ProviderRegistry::from_config_with_env(&LlmConfig::default(), no_env) {
            Ok(_) => panic!("registry built without a key"),
            Err(e) => e,
        };
        assert!(matches!(err, VoxPlayError::Config(_)));
        assert!(err.to_string().contains("VOXPLAY_GEMINI_API_KEY"));
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let env = |name: &str| (name == "GEMINI_API_KEY").then(|| "   ".to_string());
        assert!(ProviderRegistry::from_config_with_env(&LlmConfig::default(), env).is_err());
    }

    #[test]
    fn key_from_env_builds_active_provider() {
        let env = |name: &str| (name == "GEMINI_API_KEY").then(|| "k-123".to_string());
        let registry = ProviderRegistry::from_config_with_env(&LlmConfig::default(), env).unwrap();
        let (provider, call) = registry.active_call().unwrap();
        assert_eq!(provider.name(), "gemini");
        assert_eq!(call.model, "gemini-2.5-flash");
        assert_eq!(call.temperature, 0.1);
    }

    #[test]
    fn unknown_active_provider_is_fatal() {
        let config = LlmConfig {
            active_provider: "local".into(),
            ..LlmConfig::default()
        };
        let env = |_: &str| Some("k".to_string());
        assert!(ProviderRegistry::from_config_with_env(&config, env).is_err());
    }

    #[test]
    fn config_key_is_the_last_resort() {
        let mut config = LlmConfig::default();
        if let Some(entry) = config.providers.get_mut("gemini") {
            entry.api_key = Some("from-file".into());
        }
        let entry = &config.providers["gemini"];
        assert_eq!(resolve_api_key("gemini", entry, &no_env).as_deref(), Some("from-file"));
        let env = |name: &str| (name == "VOXPLAY_GEMINI_API_KEY").then(|| "from-env".to_string());
        assert_eq!(resolve_api_key("gemini", entry, &env).as_deref(), Some("from-env"));
    }
}
