use crate::error::{ProxyError, Result};
use crate::providers::Provider;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub anthropic: AnthropicConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default = "anthropic_base_url")]
    pub base_url: String,
    #[serde(default = "anthropic_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "anthropic_model")]
    pub model: String,
    /// Model name written into every normalized chunk.
    #[serde(default = "default_reported_model")]
    pub reported_model: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_anthropic_max_tokens")]
    pub default_max_tokens: u64,
    #[serde(default = "default_temperature")]
    pub default_temperature: f64,
    #[serde(default)]
    pub chunk_ids: ChunkIdMode,
    #[serde(default)]
    pub accept_system_role: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "openai_base_url")]
    pub base_url: String,
    #[serde(default = "openai_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "openai_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub default_temperature: f64,
    #[serde(default = "default_openai_max_tokens")]
    pub max_tokens: u64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default)]
    pub frequency_penalty: f64,
    #[serde(default)]
    pub presence_penalty: f64,
}

/// How normalized chunks are identified within one streamed response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkIdMode {
    /// A fresh random id for every chunk.
    #[default]
    PerChunk,
    /// One random id per response, shared by all of its chunks.
    PerResponse,
}

fn default_port() -> u16 {
    3000
}

fn anthropic_base_url() -> String {
    Provider::Anthropic.preset().base_url.to_string()
}

fn anthropic_api_key_env() -> String {
    Provider::Anthropic.preset().default_api_key_env.to_string()
}

fn anthropic_model() -> String {
    Provider::Anthropic.preset().default_model.to_string()
}

fn openai_base_url() -> String {
    Provider::OpenAi.preset().base_url.to_string()
}

fn openai_api_key_env() -> String {
    Provider::OpenAi.preset().default_api_key_env.to_string()
}

fn openai_model() -> String {
    Provider::OpenAi.preset().default_model.to_string()
}

fn default_reported_model() -> String {
    "claude-3-opus".to_string()
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

fn default_anthropic_max_tokens() -> u64 {
    1024
}

fn default_openai_max_tokens() -> u64 {
    1000
}

fn default_temperature() -> f64 {
    0.7
}

fn default_top_p() -> f64 {
    1.0
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            anthropic: AnthropicConfig::default(),
            openai: OpenAiConfig::default(),
        }
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: anthropic_base_url(),
            api_key_env: anthropic_api_key_env(),
            model: anthropic_model(),
            reported_model: default_reported_model(),
            api_version: default_api_version(),
            default_max_tokens: default_anthropic_max_tokens(),
            default_temperature: default_temperature(),
            chunk_ids: ChunkIdMode::default(),
            accept_system_role: false,
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: openai_base_url(),
            api_key_env: openai_api_key_env(),
            model: openai_model(),
            default_temperature: default_temperature(),
            max_tokens: default_openai_max_tokens(),
            top_p: default_top_p(),
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

impl ProxyConfig {
    /// Load config from a TOML file. Keys left out take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir > built-in defaults
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(&candidate);
            }
        }

        tracing::info!("No config file found, using built-in defaults");
        Ok(Self::default())
    }

    /// The Anthropic route cannot serve anything without its key, so a missing
    /// or empty value is an error.
    pub fn resolve_anthropic_key(&self) -> Result<String> {
        resolve_key(&self.anthropic.api_key_env).ok_or_else(|| {
            ProxyError::config(format!(
                "Environment variable '{}' not set. Set it with your Anthropic API key.",
                self.anthropic.api_key_env
            ))
        })
    }

    /// The OpenAI key is optional at startup; requests fail individually without it.
    #[must_use]
    pub fn resolve_openai_key(&self) -> Option<String> {
        resolve_key(&self.openai.api_key_env)
    }
}

fn resolve_key(env_var: &str) -> Option<String> {
    std::env::var(env_var).ok().filter(|k| !k.is_empty())
}

#[must_use]
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // CWD
    paths.push(PathBuf::from("chat-proxy.toml"));

    // XDG / platform config dir
    if cfg!(target_os = "macos") {
        if let Some(home) = dirs_path() {
            paths.push(
                home.join("Library")
                    .join("Application Support")
                    .join("chat-proxy")
                    .join("config.toml"),
            );
        }
    } else {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join("chat-proxy").join("config.toml"));
        }
        if let Some(home) = dirs_path() {
            paths.push(home.join(".config").join("chat-proxy").join("config.toml"));
        }
    }

    // Home directory fallback
    if let Some(home) = dirs_path() {
        paths.push(home.join(".chat-proxy.toml"));
    }

    paths
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
port = 5000

[anthropic]
model = "claude-3-5-sonnet-20241022"
chunk_ids = "per_response"
default_max_tokens = 2048

[openai]
api_key_env = "MY_OPENAI_KEY"
max_tokens = 500
"#
        )
        .unwrap();

        let config = ProxyConfig::load(f.path()).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.anthropic.model, "claude-3-5-sonnet-20241022");
        assert_eq!(config.anthropic.chunk_ids, ChunkIdMode::PerResponse);
        assert_eq!(config.anthropic.default_max_tokens, 2048);
        assert_eq!(config.anthropic.reported_model, "claude-3-opus");
        assert_eq!(config.openai.api_key_env, "MY_OPENAI_KEY");
        assert_eq!(config.openai.max_tokens, 500);
        assert_eq!(config.openai.model, "gpt-3.5-turbo");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let f = NamedTempFile::new().unwrap();
        let config = ProxyConfig::load(f.path()).unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.anthropic.base_url, "https://api.anthropic.com");
        assert_eq!(config.anthropic.api_key_env, "ANTHROPIC_API_KEY");
        assert_eq!(config.anthropic.default_max_tokens, 1024);
        assert!((config.anthropic.default_temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.anthropic.chunk_ids, ChunkIdMode::PerChunk);
        assert!(!config.anthropic.accept_system_role);
        assert_eq!(config.openai.base_url, "https://api.openai.com/v1");
        assert_eq!(config.openai.max_tokens, 1000);
        assert!((config.openai.top_p - 1.0).abs() < f64::EPSILON);
        assert!(config.openai.frequency_penalty.abs() < f64::EPSILON);
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "port = \"not a number\"").unwrap();
        assert!(matches!(
            ProxyConfig::load(f.path()),
            Err(ProxyError::Toml(_))
        ));
    }

    #[test]
    fn test_missing_anthropic_key_is_config_error() {
        let mut config = ProxyConfig::default();
        config.anthropic.api_key_env = "CHAT_PROXY_TEST_UNSET_ANTHROPIC_KEY".to_string();
        config.openai.api_key_env = "CHAT_PROXY_TEST_UNSET_OPENAI_KEY".to_string();

        assert!(matches!(
            config.resolve_anthropic_key(),
            Err(ProxyError::Config { .. })
        ));
        assert!(config.resolve_openai_key().is_none());
    }
}
