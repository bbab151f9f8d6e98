// src/config/events.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_EVENTS_CONFIG_PATH: &str = "EVENTS_CONFIG_PATH";
pub const DEFAULT_EVENTS_CONFIG_PATH: &str = "config/events.toml";

/// Pages scraped on every refresh; listing pages work best.
pub const DEFAULT_SOURCES: &[&str] = &[
    "https://www.city.sagamihara.kanagawa.jp/event_calendar.html",
    "https://sagamiharacitymuseum.jp/event/",
    "https://sagamiharacitymuseum.jp/eventnews/",
    "https://sagamigawa-fureai.com/",
    "https://fujino-art.jp/workshop/",
    "https://www.e-sagamihara.com/event/",
];

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Origin {
    pub lat: f64,
    pub lon: f64,
}

impl Default for Origin {
    fn default() -> Self {
        // Sagamihara city hall
        Self {
            lat: 35.5710,
            lon: 139.3707,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Label used as `place` for link-derived events that name a local area.
    pub region: String,
    pub sources: Vec<String>,
    pub origin: Origin,
    pub default_radius_km: f64,
    pub max_radius_km: f64,
    pub per_host_cap: usize,
    pub result_limit: usize,
    /// Harvest freshness window; 0 disables the cache.
    pub cache_ttl_secs: u64,
    pub connect_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub accept_language: String,
    pub page_text_cap: usize,
    pub llm_text_cap: usize,
    pub min_link_label_chars: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            region: "相模原・近隣".to_string(),
            sources: DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect(),
            origin: Origin::default(),
            default_radius_km: 8.0,
            max_radius_km: 30.0,
            per_host_cap: 3,
            result_limit: 20,
            cache_ttl_secs: 6 * 3600,
            connect_timeout_secs: 4,
            fetch_timeout_secs: 10,
            user_agent: "Mozilla/5.0".to_string(),
            accept_language: "ja-JP,ja;q=0.9".to_string(),
            page_text_cap: 18_000,
            llm_text_cap: 60_000,
            min_link_label_chars: 2,
        }
    }
}

impl EventsConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading events config from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: EventsConfig = toml::from_str(s).context("parsing events config toml")?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $EVENTS_CONFIG_PATH (must exist)
    /// 2) config/events.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_EVENTS_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_EVENTS_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from_file(&pb);
        }
        let default = PathBuf::from(DEFAULT_EVENTS_CONFIG_PATH);
        if default.exists() {
            return Self::load_from_file(&default);
        }
        Ok(Self::default())
    }

    fn sanitize(&mut self) {
        let defaults = Self::default();
        self.sources = self
            .sources
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !(self.max_radius_km.is_finite() && self.max_radius_km > 0.0) {
            self.max_radius_km = defaults.max_radius_km;
        }
        if !self.default_radius_km.is_finite() || self.default_radius_km < 0.0 {
            self.default_radius_km = defaults.default_radius_km;
        }
        self.default_radius_km = self.default_radius_km.min(self.max_radius_km);
        if self.per_host_cap == 0 {
            self.per_host_cap = defaults.per_host_cap;
        }
        if self.result_limit == 0 {
            self.result_limit = defaults.result_limit;
        }
        if self.connect_timeout_secs == 0 {
            self.connect_timeout_secs = defaults.connect_timeout_secs;
        }
        if self.fetch_timeout_secs == 0 {
            self.fetch_timeout_secs = defaults.fetch_timeout_secs;
        }
    }

    /// Clamp a requested radius into `[0, max_radius_km]`; falls back to the default.
    pub fn clamp_radius(&self, requested: Option<f64>) -> f64 {
        match requested {
            Some(r) if r.is_finite() => r.clamp(0.0, self.max_radius_km),
            _ => self.default_radius_km,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = EventsConfig::from_toml_str(
            r#"
            sources = [" https://a.example/ ", ""]
            per_host_cap = 0
            [origin]
            lat = 35.0
            lon = 139.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sources, vec!["https://a.example/".to_string()]);
        assert_eq!(cfg.per_host_cap, 3);
        assert_eq!(cfg.origin, Origin { lat: 35.0, lon: 139.0 });
        assert_eq!(cfg.result_limit, 20);
    }

    #[test]
    fn radius_is_clamped() {
        let cfg = EventsConfig::default();
        assert_eq!(cfg.clamp_radius(None), 8.0);
        assert_eq!(cfg.clamp_radius(Some(100.0)), 30.0);
        assert_eq!(cfg.clamp_radius(Some(-4.0)), 0.0);
        assert_eq!(cfg.clamp_radius(Some(f64::NAN)), 8.0);
        assert_eq!(cfg.clamp_radius(Some(12.5)), 12.5);
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_EVENTS_CONFIG_PATH);

        let v = EventsConfig::load_default().unwrap();
        assert_eq!(v.sources.len(), DEFAULT_SOURCES.len());

        let p = tmp.path().join("custom.toml");
        fs::write(&p, r#"sources = ["https://only.example/"]"#).unwrap();
        env::set_var(ENV_EVENTS_CONFIG_PATH, p.display().to_string());
        let v2 = EventsConfig::load_default().unwrap();
        assert_eq!(v2.sources, vec!["https://only.example/".to_string()]);

        env::set_var(ENV_EVENTS_CONFIG_PATH, tmp.path().join("missing.toml"));
        assert!(EventsConfig::load_default().is_err());
        env::remove_var(ENV_EVENTS_CONFIG_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
