// src/config/classifier.rs
use serde::{Deserialize, Serialize};
use std::env;

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-5-mini".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_connect_timeout() -> u64 {
    8
}
fn default_read_timeout() -> u64 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Only "openai" is wired; anything else disables classification.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from OPENAI_API_KEY.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

fn default_enabled() -> bool {
    true
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            provider: default_provider(),
            model: default_model(),
            api_key: default_api_key(),
            endpoint: default_endpoint(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
        }
    }
}

impl ClassifierConfig {
    /// Resolve the API key. `"ENV"` (case-insensitive) reads the provider's env var.
    /// Returns `None` when nothing usable is configured.
    pub fn resolve_api_key(&self) -> Option<String> {
        let raw = self.api_key.trim();
        let key = if raw.eq_ignore_ascii_case("env") {
            match self.provider.to_ascii_lowercase().as_str() {
                "openai" => env::var("OPENAI_API_KEY").ok()?,
                _ => return None,
            }
        } else {
            raw.to_string()
        };
        let key = key.trim().to_string();
        (!key.is_empty()).then_some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[serial_test::serial]
    #[test]
    fn env_key_resolution() {
        let mut cfg = ClassifierConfig::default();
        env::remove_var("OPENAI_API_KEY");
        assert_eq!(cfg.resolve_api_key(), None);

        env::set_var("OPENAI_API_KEY", " sk-test ");
        assert_eq!(cfg.resolve_api_key().as_deref(), Some("sk-test"));
        env::remove_var("OPENAI_API_KEY");

        cfg.api_key = "sk-inline".into();
        assert_eq!(cfg.resolve_api_key().as_deref(), Some("sk-inline"));

        cfg.api_key = "env".into();
        cfg.provider = "claude".into();
        assert_eq!(cfg.resolve_api_key(), None);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: ClassifierConfig = serde_json::from_str(r#"{"model":"gpt-4o-mini"}"#).unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.model, "gpt-4o-mini");
        assert_eq!(cfg.provider, "openai");
        assert_eq!(cfg.read_timeout_secs, 20);
    }
}
