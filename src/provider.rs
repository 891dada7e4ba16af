//! Provider catalog and backend selection.
//!
//! Provider, model, and backend choices arrive as strings (CLI flags, TOML)
//! and are resolved here, once, into closed enums. Nothing downstream
//! branches on provider names.
//!
//! | Provider | Chat models | Embeddings | Key |
//! |----------|-------------|------------|-----|
//! | Groq | llama-3.3-70b-versatile, llama-3.1-8b-instant, mixtral-8x7b-32768 | local all-MiniLM-L6-v2 | `GROQ_API_KEY` |
//! | Gemini | gemini-2.0-flash, gemini-1.5-flash, gemini-1.5-pro | Google embedding-001 | `GOOGLE_API_KEY` |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RagError;

/// Hosted LLM provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Provider {
    Groq,
    Gemini,
}

/// Static catalog entry for a provider.
#[derive(Debug, Clone, Copy)]
pub struct ProviderInfo {
    pub display_name: &'static str,
    pub playground: &'static str,
    pub models: &'static [&'static str],
    pub api_key_env: &'static str,
}

const GROQ: ProviderInfo = ProviderInfo {
    display_name: "Groq",
    playground: "https://console.groq.com/",
    models: &[
        "llama-3.3-70b-versatile",
        "llama-3.1-8b-instant",
        "mixtral-8x7b-32768",
    ],
    api_key_env: "GROQ_API_KEY",
};

const GEMINI: ProviderInfo = ProviderInfo {
    display_name: "Gemini",
    playground: "https://ai.google.dev",
    models: &["gemini-2.0-flash", "gemini-1.5-flash", "gemini-1.5-pro"],
    api_key_env: "GOOGLE_API_KEY",
};

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Groq, Provider::Gemini];

    pub fn info(self) -> &'static ProviderInfo {
        match self {
            Provider::Groq => &GROQ,
            Provider::Gemini => &GEMINI,
        }
    }

    /// Lowercase key used for on-disk namespacing and config values.
    pub fn key(self) -> &'static str {
        match self {
            Provider::Groq => "groq",
            Provider::Gemini => "gemini",
        }
    }

    pub fn default_model(self) -> &'static str {
        self.info().models[0]
    }

    /// Fails with a configuration error if `model` is not in the catalog.
    pub fn validate_model(self, model: &str) -> Result<(), RagError> {
        if self.info().models.contains(&model) {
            Ok(())
        } else {
            Err(RagError::Configuration(format!(
                "model '{}' is not offered by {}. Available: {}",
                model,
                self.info().display_name,
                self.info().models.join(", ")
            )))
        }
    }

    /// Resolve the API key: an explicit key wins over the environment.
    ///
    /// Blank keys are treated as missing.
    pub fn resolve_api_key(self, explicit: Option<&str>) -> Result<String, RagError> {
        explicit
            .filter(|k| !k.trim().is_empty())
            .map(str::to_string)
            .or_else(|| {
                std::env::var(self.info().api_key_env)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            })
            .ok_or_else(|| RagError::MissingApiKey {
                provider: self.info().display_name.to_string(),
                env_var: self.info().api_key_env.to_string(),
            })
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.info().display_name)
    }
}

impl FromStr for Provider {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(Provider::Groq),
            "gemini" | "google" => Ok(Provider::Gemini),
            other => Err(RagError::Configuration(format!(
                "unsupported provider: '{}'. Must be groq or gemini.",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Provider {
    type Error = RagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Provider> for String {
    fn from(p: Provider) -> Self {
        p.key().to_string()
    }
}

/// Vector index storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Backend {
    /// Working memory only; gone when the session ends.
    Ephemeral,
    /// SQLite file under a per-provider directory.
    Persistent,
}

impl Backend {
    pub fn key(self) -> &'static str {
        match self {
            Backend::Ephemeral => "ephemeral",
            Backend::Persistent => "persistent",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Ephemeral => f.write_str("Ephemeral (memory)"),
            Backend::Persistent => f.write_str("Persistent (disk)"),
        }
    }
}

impl FromStr for Backend {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ephemeral" | "memory" => Ok(Backend::Ephemeral),
            "persistent" | "disk" => Ok(Backend::Persistent),
            other => Err(RagError::Configuration(format!(
                "unsupported vector backend: '{}'. Must be ephemeral or persistent.",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Backend {
    type Error = RagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Backend> for String {
    fn from(b: Backend) -> Self {
        b.key().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_case_insensitively() {
        assert_eq!("GROQ".parse::<Provider>().unwrap(), Provider::Groq);
        assert_eq!(" Gemini ".parse::<Provider>().unwrap(), Provider::Gemini);
        assert!(matches!(
            "openai".parse::<Provider>(),
            Err(RagError::Configuration(_))
        ));
    }

    #[test]
    fn validates_catalog_models() {
        assert!(Provider::Groq.validate_model("llama-3.1-8b-instant").is_ok());
        assert!(Provider::Groq.validate_model("gemini-1.5-pro").is_err());
        assert_eq!(Provider::Gemini.default_model(), "gemini-2.0-flash");
    }

    #[test]
    fn explicit_key_wins() {
        let key = Provider::Groq.resolve_api_key(Some("sk-explicit")).unwrap();
        assert_eq!(key, "sk-explicit");
    }

    #[test]
    fn blank_explicit_key_is_missing() {
        // Only meaningful when the variable is not set in the test environment.
        if std::env::var("GOOGLE_API_KEY").is_err() {
            let err = Provider::Gemini.resolve_api_key(Some("  ")).unwrap_err();
            assert!(matches!(err, RagError::MissingApiKey { .. }));
        }
    }

    #[test]
    fn parses_backend_aliases() {
        assert_eq!("memory".parse::<Backend>().unwrap(), Backend::Ephemeral);
        assert_eq!("disk".parse::<Backend>().unwrap(), Backend::Persistent);
        assert!("redis".parse::<Backend>().is_err());
    }
}
