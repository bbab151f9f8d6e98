// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const ENV_AI_CONFIG_PATH: &str = "AI_CONFIG_PATH";
pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";

fn default_enabled() -> bool {
    true
}
fn default_provider() -> String {
    "gemini".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_daily_limit() -> u32 {
    20
}
fn default_cache_dir() -> String {
    "cache/ai".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiProviderKind {
    Gemini,
    OpenAi,
}

impl AiProviderKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Some(Self::Gemini),
            "openai" => Some(Self::OpenAi),
            _ => None,
        }
    }

    pub fn key_env(self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn model_env(self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_MODEL",
            Self::OpenAi => "OPENAI_MODEL",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-1.5-flash",
            Self::OpenAi => "gpt-4o-mini",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// "gemini" | "openai" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Overrides the provider default and the `*_MODEL` env var.
    #[serde(default)]
    pub model: Option<String>,
    /// "ENV" means: read from GEMINI_API_KEY / OPENAI_API_KEY (by provider)
    #[serde(default = "default_api_key")]
    pub api_key: String,
    /// Real (uncached) calls allowed per UTC day.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            provider: default_provider(),
            model: None,
            api_key: default_api_key(),
            daily_limit: default_daily_limit(),
            cache_dir: default_cache_dir(),
        }
    }
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let cfg: AiConfig = serde_json::from_str(&data)?;
        Ok(cfg.resolved())
    }

    /// `$AI_CONFIG_PATH`, then `config/ai.json`, then defaults. Never fails:
    /// a broken file is logged and ignored.
    pub fn load_default() -> Self {
        let path = env::var(ENV_AI_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_AI_CONFIG_PATH.into());
        if !Path::new(&path).exists() {
            return Self::default().resolved();
        }
        match Self::load_from_file(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = ?e, path = %path, "ai config unreadable, using defaults");
                Self::default().resolved()
            }
        }
    }

    /// Normalize provider and resolve an "ENV" key. A missing env var leaves
    /// the key empty so callers can report it instead of failing startup.
    pub fn resolved(mut self) -> Self {
        self.provider = self.provider.trim().to_lowercase();
        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = self
                .provider_kind()
                .and_then(|k| env::var(k.key_env()).ok())
                .unwrap_or_default();
        }
        self.api_key = self.api_key.trim().to_string();
        self
    }

    pub fn provider_kind(&self) -> Option<AiProviderKind> {
        AiProviderKind::parse(&self.provider)
    }

    pub fn model_name(&self) -> String {
        let kind = self.provider_kind().unwrap_or(AiProviderKind::Gemini);
        self.model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| env::var(kind.model_env()).ok().filter(|m| !m.trim().is_empty()))
            .unwrap_or_else(|| kind.default_model().to_string())
    }

    /// True when a real provider call could be attempted.
    pub fn has_key(&self) -> bool {
        self.enabled && self.provider_kind().is_some() && !self.api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[serial_test::serial]
    #[test]
    fn env_key_is_resolved_by_provider() {
        env::set_var("GEMINI_API_KEY", "g-key");
        let cfg: AiConfig = serde_json::from_str(r#"{"provider":"Gemini"}"#).unwrap();
        let cfg = cfg.resolved();
        assert_eq!(cfg.provider, "gemini");
        assert_eq!(cfg.api_key, "g-key");
        assert!(cfg.has_key());
        env::remove_var("GEMINI_API_KEY");

        let cfg = AiConfig::default().resolved();
        assert!(cfg.api_key.is_empty());
        assert!(!cfg.has_key());
    }

    #[test]
    fn explicit_key_and_model_win() {
        let cfg: AiConfig = serde_json::from_str(
            r#"{"enabled":true,"provider":"openai","api_key":" sk-1 ","model":"gpt-x"}"#,
        )
        .unwrap();
        let cfg = cfg.resolved();
        assert_eq!(cfg.api_key, "sk-1");
        assert_eq!(cfg.model_name(), "gpt-x");
        assert_eq!(cfg.provider_kind(), Some(AiProviderKind::OpenAi));
    }

    #[test]
    fn unknown_provider_or_disabled_has_no_key() {
        let cfg: AiConfig =
            serde_json::from_str(r#"{"provider":"claude","api_key":"x"}"#).unwrap();
        assert!(!cfg.resolved().has_key());
        let cfg: AiConfig =
            serde_json::from_str(r#"{"enabled":false,"api_key":"x"}"#).unwrap();
        assert!(!cfg.resolved().has_key());
    }
}
