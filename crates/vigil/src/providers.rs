//! Model provider registry.
//!
//! A provider is a named endpoint configuration for the chat model and,
//! optionally, the embedding model. Built-in providers are always present;
//! `[[llm.custom_providers]]` entries are registered after them, and an
//! entry with a built-in id replaces the built-in.
//!
//! | Id | API | Embeddings | Key variable |
//! |----|-----|------------|--------------|
//! | `openai` | OpenAI-compatible | `text-embedding-3-small` | `OPENAI_API_KEY` |
//! | `deepseek` | OpenAI-compatible | none | `DEEPSEEK_API_KEY` |
//! | `ollama` | Ollama | `nomic-embed-text` | none |

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{save_config, Config, LlmConfig};
use vigil_core::error::AssistError;

/// Wire protocol spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// `POST {base_url}/chat/completions`, `POST {base_url}/embeddings`.
    #[default]
    OpenaiCompatible,
    /// `POST {base_url}/v1/chat/completions`, `POST {base_url}/api/embed`.
    Ollama,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProviderConfig {
    pub id: String,
    pub display_name: String,
    pub base_url: String,
    pub model_name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model_name: Option<String>,
    #[serde(default)]
    pub embeddings_enabled: bool,
    /// Environment variable holding the API key. `None` for keyless
    /// endpoints such as a local Ollama.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub kind: ProviderKind,
}

fn default_temperature() -> f32 {
    0.2
}

impl ModelProviderConfig {
    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn chat_url(&self) -> String {
        match self.kind {
            ProviderKind::OpenaiCompatible => format!("{}/chat/completions", self.base()),
            ProviderKind::Ollama => format!("{}/v1/chat/completions", self.base()),
        }
    }

    pub fn embeddings_url(&self) -> String {
        match self.kind {
            ProviderKind::OpenaiCompatible => format!("{}/embeddings", self.base()),
            ProviderKind::Ollama => format!("{}/api/embed", self.base()),
        }
    }

    /// Resolve the API key from the environment.
    ///
    /// Returns `Ok(None)` for keyless providers and
    /// [`AssistError::MissingApiKey`] when the variable is unset or empty.
    pub fn api_key(&self) -> Result<Option<String>, AssistError> {
        match &self.api_key_env {
            None => Ok(None),
            Some(var) => match std::env::var(var) {
                Ok(key) if !key.trim().is_empty() => Ok(Some(key)),
                _ => Err(AssistError::MissingApiKey(var.clone())),
            },
        }
    }

    /// Embedding model, if embeddings are enabled for this provider.
    pub fn embedding_model(&self) -> Option<&str> {
        if self.embeddings_enabled {
            self.embedding_model_name.as_deref()
        } else {
            None
        }
    }
}

pub fn builtin_providers() -> Vec<ModelProviderConfig> {
    vec![
        ModelProviderConfig {
            id: "openai".to_string(),
            display_name: "OpenAI".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model_name: "gpt-4o-mini".to_string(),
            temperature: default_temperature(),
            embedding_model_name: Some("text-embedding-3-small".to_string()),
            embeddings_enabled: true,
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            kind: ProviderKind::OpenaiCompatible,
        },
        ModelProviderConfig {
            id: "deepseek".to_string(),
            display_name: "DeepSeek".to_string(),
            base_url: "https://api.deepseek.com/v1".to_string(),
            model_name: "deepseek-chat".to_string(),
            temperature: default_temperature(),
            embedding_model_name: None,
            embeddings_enabled: false,
            api_key_env: Some("DEEPSEEK_API_KEY".to_string()),
            kind: ProviderKind::OpenaiCompatible,
        },
        ModelProviderConfig {
            id: "ollama".to_string(),
            display_name: "Ollama (local)".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model_name: "llama3.1".to_string(),
            temperature: default_temperature(),
            embedding_model_name: Some("nomic-embed-text".to_string()),
            embeddings_enabled: true,
            api_key_env: None,
            kind: ProviderKind::Ollama,
        },
    ]
}

/// Ordered registry of provider configs keyed by id.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Vec<ModelProviderConfig>,
}

impl ProviderRegistry {
    pub fn with_builtins() -> Self {
        Self {
            providers: builtin_providers(),
        }
    }

    /// Built-ins followed by the custom providers from `[llm]`.
    pub fn from_config(llm: &LlmConfig) -> Self {
        let mut registry = Self::with_builtins();
        for p in &llm.custom_providers {
            registry.register(p.clone());
        }
        registry
    }

    /// Register a provider. Last write wins for duplicate ids.
    pub fn register(&mut self, provider: ModelProviderConfig) {
        match self.providers.iter_mut().find(|p| p.id == provider.id) {
            Some(slot) => *slot = provider,
            None => self.providers.push(provider),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ModelProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn resolve(&self, id: &str) -> Result<&ModelProviderConfig, AssistError> {
        self.get(id)
            .ok_or_else(|| AssistError::UnknownProvider(id.to_string()))
    }

    pub fn list(&self) -> &[ModelProviderConfig] {
        &self.providers
    }
}

// ============ CLI commands ============

pub fn run_providers_list(config: &Config) -> Result<()> {
    let registry = ProviderRegistry::from_config(&config.llm);
    for p in registry.list() {
        let marker = if p.id == config.llm.provider { "*" } else { " " };
        let embeddings = p.embedding_model().unwrap_or("-");
        let key = match (&p.api_key_env, p.api_key()) {
            (None, _) => "no key needed".to_string(),
            (Some(var), Ok(_)) => format!("{} set", var),
            (Some(var), Err(_)) => format!("{} missing", var),
        };
        println!(
            "{} {:<12} {:<16} chat={} embeddings={} ({})",
            marker, p.id, p.display_name, p.model_name, embeddings, key
        );
    }
    Ok(())
}

/// Make `id` the current provider and persist it.
pub fn run_providers_use(config: &Config, config_path: &Path, id: &str) -> Result<()> {
    let registry = ProviderRegistry::from_config(&config.llm);
    let provider = registry.resolve(id)?;

    let mut updated = config.clone();
    updated.llm.provider = provider.id.clone();
    save_config(config_path, &updated)?;
    println!("Current provider: {} ({})", provider.id, provider.display_name);
    Ok(())
}

/// Add or replace a custom provider and persist it.
pub fn run_providers_add(
    config: &Config,
    config_path: &Path,
    provider: ModelProviderConfig,
) -> Result<()> {
    let mut updated = config.clone();
    let id = provider.id.clone();
    match updated
        .llm
        .custom_providers
        .iter_mut()
        .find(|p| p.id == provider.id)
    {
        Some(slot) => *slot = provider,
        None => updated.llm.custom_providers.push(provider),
    }
    save_config(config_path, &updated)?;
    println!("Saved provider '{}' to {}", id, config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use tempfile::TempDir;

    fn custom(id: &str) -> ModelProviderConfig {
        ModelProviderConfig {
            id: id.to_string(),
            display_name: "Custom".to_string(),
            base_url: "http://llm.internal/v1/".to_string(),
            model_name: "m-1".to_string(),
            temperature: 0.0,
            embedding_model_name: None,
            embeddings_enabled: false,
            api_key_env: None,
            kind: ProviderKind::OpenaiCompatible,
        }
    }

    #[test]
    fn test_builtins_present() {
        let registry = ProviderRegistry::with_builtins();
        let ids: Vec<&str> = registry.list().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["openai", "deepseek", "ollama"]);
        assert!(matches!(
            registry.resolve("nope"),
            Err(AssistError::UnknownProvider(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_custom_overrides_builtin_in_place() {
        let mut llm = LlmConfig::default();
        llm.custom_providers.push(custom("deepseek"));
        llm.custom_providers.push(custom("corp"));
        let registry = ProviderRegistry::from_config(&llm);
        let ids: Vec<&str> = registry.list().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["openai", "deepseek", "ollama", "corp"]);
        assert_eq!(registry.get("deepseek").unwrap().model_name, "m-1");
    }

    #[test]
    fn test_endpoint_urls() {
        let p = custom("corp");
        assert_eq!(p.chat_url(), "http://llm.internal/v1/chat/completions");
        assert_eq!(p.embeddings_url(), "http://llm.internal/v1/embeddings");

        let registry = ProviderRegistry::with_builtins();
        let ollama = registry.get("ollama").unwrap();
        assert_eq!(ollama.chat_url(), "http://localhost:11434/v1/chat/completions");
        assert_eq!(ollama.embeddings_url(), "http://localhost:11434/api/embed");
    }

    #[test]
    fn test_missing_api_key() {
        let mut p = custom("corp");
        p.api_key_env = Some("VIGIL_TEST_KEY_THAT_IS_NEVER_SET".to_string());
        assert!(matches!(p.api_key(), Err(AssistError::MissingApiKey(_))));
        p.api_key_env = None;
        assert_eq!(p.api_key().unwrap(), None);
    }

    #[test]
    fn test_embedding_model_requires_flag() {
        let mut p = custom("corp");
        p.embedding_model_name = Some("e".to_string());
        assert_eq!(p.embedding_model(), None);
        p.embeddings_enabled = true;
        assert_eq!(p.embedding_model(), Some("e"));
    }

    #[test]
    fn test_use_and_add_persist() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vigil.toml");
        let cfg = Config::default();

        run_providers_add(&cfg, &path, custom("corp")).unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.llm.custom_providers.len(), 1);

        run_providers_use(&cfg, &path, "corp").unwrap();
        assert_eq!(load_config(&path).unwrap().llm.provider, "corp");

        assert!(run_providers_use(&cfg, &path, "missing").is_err());
    }
}
