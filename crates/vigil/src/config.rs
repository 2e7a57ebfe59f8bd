//! TOML configuration.
//!
//! Every section is optional; a missing file yields [`Config::default`].
//! `vigil providers use` and `vigil providers add` write the file back,
//! so the types round-trip through `toml`.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::providers::ModelProviderConfig;
use vigil_core::assist::AssistSettings;

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_providers: Vec<ModelProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            custom_providers: Vec::new(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct KnowledgeConfig {
    /// JSON corpus file. The built-in corpus is used when unset or unreadable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_path: Option<PathBuf>,
    #[serde(default = "default_advice_k")]
    pub advice_k: usize,
    #[serde(default = "default_analysis_k")]
    pub analysis_k: usize,
    #[serde(default = "default_completion_k")]
    pub completion_k: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            corpus_path: None,
            advice_k: default_advice_k(),
            analysis_k: default_analysis_k(),
            completion_k: default_completion_k(),
        }
    }
}

fn default_advice_k() -> usize {
    2
}
fn default_analysis_k() -> usize {
    3
}
fn default_completion_k() -> usize {
    2
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CompletionConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_context_lines")]
    pub context_lines: u32,
    #[serde(default = "default_min_prefix_chars")]
    pub min_prefix_chars: usize,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            context_lines: default_context_lines(),
            min_prefix_chars: default_min_prefix_chars(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    300
}
fn default_context_lines() -> u32 {
    10
}
fn default_min_prefix_chars() -> usize {
    3
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScanConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Files larger than this are skipped.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    [
        "**/*.js", "**/*.jsx", "**/*.mjs", "**/*.ts", "**/*.tsx", "**/*.py", "**/*.java",
        "**/*.php", "**/*.rb",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

impl Config {
    /// Prompt assembly settings derived from `[knowledge]` and `[completion]`.
    pub fn assist_settings(&self) -> AssistSettings {
        AssistSettings {
            advice_k: self.knowledge.advice_k,
            analysis_k: self.knowledge.analysis_k,
            completion_k: self.knowledge.completion_k,
            context_lines: self.completion.context_lines,
            min_prefix_chars: self.completion.min_prefix_chars,
        }
    }
}

/// Load and validate the configuration at `path`.
///
/// A missing file is not an error: defaults are returned so rule-based
/// scanning works without any setup.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Write `config` to `path`, creating parent directories.
pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    validate(config)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))
}

fn validate(config: &Config) -> Result<()> {
    if config.llm.timeout_secs == 0 {
        bail!("llm.timeout_secs must be > 0");
    }
    if config.llm.provider.trim().is_empty() {
        bail!("llm.provider must not be empty");
    }

    let mut ids = HashSet::new();
    for p in &config.llm.custom_providers {
        if p.id.trim().is_empty() {
            bail!("llm.custom_providers entries need a non-empty id");
        }
        if !ids.insert(p.id.as_str()) {
            bail!("duplicate custom provider id: '{}'", p.id);
        }
        if p.base_url.trim().is_empty() {
            bail!("custom provider '{}' needs a base_url", p.id);
        }
        if !(0.0..=2.0).contains(&p.temperature) {
            bail!("custom provider '{}': temperature must be in [0.0, 2.0]", p.id);
        }
        if p.embeddings_enabled && p.embedding_model_name.is_none() {
            bail!(
                "custom provider '{}' enables embeddings but sets no embedding_model_name",
                p.id
            );
        }
    }

    for (name, k) in [
        ("knowledge.advice_k", config.knowledge.advice_k),
        ("knowledge.analysis_k", config.knowledge.analysis_k),
        ("knowledge.completion_k", config.knowledge.completion_k),
    ] {
        if k == 0 {
            bail!("{} must be >= 1", name);
        }
    }

    if config.scan.include_globs.is_empty() {
        bail!("scan.include_globs must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg = load_config(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.assist_settings(), AssistSettings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vigil.toml");
        std::fs::write(
            &path,
            "[llm]\nprovider = \"deepseek\"\n\n[completion]\ndebounce_ms = 50\n",
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.llm.provider, "deepseek");
        assert_eq!(cfg.llm.max_retries, 3);
        assert_eq!(cfg.completion.debounce_ms, 50);
        assert_eq!(cfg.completion.context_lines, 10);
        assert_eq!(cfg.knowledge.advice_k, 2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vigil.toml");
        std::fs::write(&path, "[knowledge]\nadvice_k = 0\n").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("knowledge.advice_k"));
    }

    #[test]
    fn test_duplicate_custom_provider_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vigil.toml");
        let entry = "[[llm.custom_providers]]\nid = \"corp\"\ndisplay_name = \"Corp\"\nbase_url = \"http://llm.local/v1\"\nmodel_name = \"m\"\n";
        std::fs::write(&path, format!("{}\n{}", entry, entry)).unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("duplicate custom provider id"));
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/vigil.toml");
        let mut cfg = Config::default();
        cfg.llm.provider = "ollama".to_string();
        cfg.knowledge.corpus_path = Some(PathBuf::from("kb.json"));
        save_config(&path, &cfg).unwrap();
        assert_eq!(load_config(&path).unwrap(), cfg);
    }
}
