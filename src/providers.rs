//! Built-in presets for the two upstream providers.
//!
//! Each preset supplies the base URL, default model and the environment variable
//! holding the API key, so a config file only has to name what it changes.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    OpenAi,
}

#[derive(Debug, Clone)]
pub struct ProviderPreset {
    pub provider: Provider,
    pub name: &'static str,
    pub base_url: &'static str,
    pub default_api_key_env: &'static str,
    pub default_model: &'static str,
}

const PRESETS: &[ProviderPreset] = &[
    ProviderPreset {
        provider: Provider::Anthropic,
        name: "anthropic",
        base_url: "https://api.anthropic.com",
        default_api_key_env: "ANTHROPIC_API_KEY",
        default_model: "claude-3-opus-20240229",
    },
    ProviderPreset {
        provider: Provider::OpenAi,
        name: "openai",
        base_url: "https://api.openai.com/v1",
        default_api_key_env: "OPENAI_API_KEY",
        default_model: "gpt-3.5-turbo",
    },
];

impl Provider {
    /// The built-in defaults for this provider.
    #[must_use]
    pub fn preset(self) -> &'static ProviderPreset {
        // PRESETS holds one entry per variant.
        PRESETS
            .iter()
            .find(|p| p.provider == self)
            .unwrap_or(&PRESETS[0])
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        self.preset().name
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
