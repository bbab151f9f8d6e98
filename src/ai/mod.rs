//! AI adapter: provider abstraction + file cache + daily limit.
//!
//! The model's output is untrusted text; callers parse it with the helpers in
//! [`prompt`] and discard anything that does not parse.

pub mod prompt;

use std::fs;
use std::future::Future;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{AiConfig, AiProviderKind};

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// Raw text returned by a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiReply {
    pub text: String,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AiError {
    #[error("AI provider is not configured")]
    Disabled,
    #[error("daily AI call limit reached")]
    DailyLimit,
    #[error("AI quota exhausted: {0}")]
    Quota(String),
    #[error("AI upstream error: {0}")]
    Upstream(String),
    #[error("AI returned an empty reply")]
    Empty,
}

impl AiError {
    /// Errors the caller should surface as "try again later".
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AiError::Quota(_) | AiError::DailyLimit)
    }
}

pub type AiResult = Result<AiReply, AiError>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait object used by the extraction strategies and handlers.
pub trait AiClient: Send + Sync {
    /// Send `prompt` and return the model's text.
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, AiResult>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
    /// False when every call would return [`AiError::Disabled`].
    fn is_available(&self) -> bool {
        true
    }
}

pub type DynAiClient = Arc<dyn AiClient>;

/// Reads config from disk and builds a client.
pub fn build_ai_client() -> DynAiClient {
    build_client_from_config(&AiConfig::load_default())
}

/// Factory: build a client according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic mock client (no cache).
/// * Else if no provider key is configured, returns a disabled client.
/// * Else builds the real provider wrapped with caching + daily limit.
pub fn build_client_from_config(config: &AiConfig) -> DynAiClient {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockClient::new(MockProvider::sample_events()));
    }

    if !config.has_key() {
        return Arc::new(DisabledClient);
    }

    let cache_dir = PathBuf::from(&config.cache_dir);
    let model = config.model_name();
    match config.provider_kind() {
        Some(AiProviderKind::Gemini) => match GeminiProvider::new(&config.api_key, &model) {
            Ok(p) => Arc::new(CachingClient::new(p, cache_dir, config.daily_limit)),
            Err(e) => {
                tracing::warn!(error = ?e, "gemini client unavailable");
                Arc::new(DisabledClient)
            }
        },
        Some(AiProviderKind::OpenAi) => match OpenAiProvider::new(&config.api_key, &model) {
            Ok(p) => Arc::new(CachingClient::new(p, cache_dir, config.daily_limit)),
            Err(e) => {
                tracing::warn!(error = ?e, "openai client unavailable");
                Arc::new(DisabledClient)
            }
        },
        None => Arc::new(DisabledClient),
    }
}

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

/// Low-level provider: does a *real* remote call. Separated so the same
/// caching wrapper serves production and tests.
pub trait Provider: Send + Sync + 'static {
    fn fetch<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, AiResult>;
    fn name(&self) -> &'static str;
    /// Distinguishes cache entries of different models.
    fn model(&self) -> &str;
}

fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("event-scout/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(4))
        .timeout(Duration::from_secs(60))
        .build()
}

async fn classify_failure(resp: reqwest::Response) -> AiError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let lower = body.to_lowercase();
    let snippet: String = body.chars().take(200).collect();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || lower.contains("quota")
        || lower.contains("too many requests")
    {
        AiError::Quota(format!("HTTP {status}"))
    } else {
        AiError::Upstream(format!("HTTP {status}: {snippet}"))
    }
}

/// Google Gemini `generateContent`. Requests a JSON response body.
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: &str, model: &str) -> reqwest::Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

impl Provider for GeminiProvider {
    fn fetch<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, AiResult> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Part<'a> {
                text: &'a str,
            }
            #[derive(Serialize)]
            struct Content<'a> {
                role: &'a str,
                parts: Vec<Part<'a>>,
            }
            #[derive(Serialize)]
            #[serde(rename_all = "camelCase")]
            struct GenConfig {
                temperature: f32,
                response_mime_type: &'static str,
            }
            #[derive(Serialize)]
            #[serde(rename_all = "camelCase")]
            struct Req<'a> {
                contents: Vec<Content<'a>>,
                generation_config: GenConfig,
            }
            #[derive(Deserialize)]
            struct Resp {
                #[serde(default)]
                candidates: Vec<Candidate>,
            }
            #[derive(Deserialize)]
            struct Candidate {
                content: Option<RespContent>,
            }
            #[derive(Deserialize)]
            struct RespContent {
                #[serde(default)]
                parts: Vec<RespPart>,
            }
            #[derive(Deserialize)]
            struct RespPart {
                #[serde(default)]
                text: String,
            }

            let req = Req {
                contents: vec![Content {
                    role: "user",
                    parts: vec![Part { text: prompt }],
                }],
                generation_config: GenConfig {
                    temperature: 0.2,
                    response_mime_type: "application/json",
                },
            };
            let url = format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                self.model
            );
            let resp = self
                .http
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(&req)
                .send()
                .await
                .map_err(|e| AiError::Upstream(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(classify_failure(resp).await);
            }
            let body: Resp = resp
                .json()
                .await
                .map_err(|e| AiError::Upstream(format!("decoding gemini reply: {e}")))?;
            let text: String = body
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content)
                .map(|c| c.parts.into_iter().map(|p| p.text).collect())
                .unwrap_or_default();
            if text.trim().is_empty() {
                return Err(AiError::Empty);
            }
            Ok(AiReply { text })
        })
    }
    fn name(&self) -> &'static str {
        "gemini"
    }
    fn model(&self) -> &str {
        &self.model
    }
}

/// OpenAI provider (Chat Completions API).
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, model: &str) -> reqwest::Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

impl Provider for OpenAiProvider {
    fn fetch<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, AiResult> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                #[serde(default)]
                content: Option<String>,
            }

            let req = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: "Reply with JSON only. No prose, no Markdown.",
                    },
                    Msg {
                        role: "user",
                        content: prompt,
                    },
                ],
                temperature: 0.2,
            };

            let resp = self
                .http
                .post("https://api.openai.com/v1/chat/completions")
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await
                .map_err(|e| AiError::Upstream(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(classify_failure(resp).await);
            }
            let body: Resp = resp
                .json()
                .await
                .map_err(|e| AiError::Upstream(format!("decoding openai reply: {e}")))?;
            let text = body
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default();
            if text.trim().is_empty() {
                return Err(AiError::Empty);
            }
            Ok(AiReply { text })
        })
    }
    fn name(&self) -> &'static str {
        "openai"
    }
    fn model(&self) -> &str {
        &self.model
    }
}

/// Always fails with [`AiError::Disabled`]; used when no provider is configured.
pub struct DisabledClient;

impl AiClient for DisabledClient {
    fn generate<'a>(&'a self, _prompt: &'a str) -> BoxFuture<'a, AiResult> {
        Box::pin(async { Err(AiError::Disabled) })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
    fn is_available(&self) -> bool {
        false
    }
}

/// Deterministic provider for tests/local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: AiResult,
}

impl MockProvider {
    /// Two events near central Sagamihara, in the shape the event prompt asks for.
    pub fn sample_events() -> Self {
        let text = serde_json::json!([
            {
                "title": "苔玉づくりワークショップ",
                "description": "親子で苔玉をつくる体験教室",
                "place": "相模原市立博物館",
                "lat": 35.5416, "lon": 139.3608,
                "price": 500, "when": "5月10日(土) 10:00-12:00",
                "tags": ["苔", "工作"], "url": "https://sagamiharacitymuseum.jp/event/koke"
            },
            {
                "title": "星空観望会",
                "description": "天体望遠鏡で月と土星を観察",
                "place": "相模原市立博物館",
                "lat": 35.5416, "lon": 139.3608,
                "price": 0, "when": "5月17日(土) 19:00",
                "tags": ["天体"], "url": "https://sagamiharacitymuseum.jp/event/star"
            }
        ])
        .to_string();
        Self {
            fixed: Ok(AiReply { text }),
        }
    }
}

impl Provider for MockProvider {
    fn fetch<'a>(&'a self, _prompt: &'a str) -> BoxFuture<'a, AiResult> {
        let out = self.fixed.clone();
        Box::pin(async move { out })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
    fn model(&self) -> &str {
        "mock"
    }
}

/// Uncached client over any provider.
pub struct MockClient<P: Provider> {
    inner: P,
}

impl<P: Provider> MockClient<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<P: Provider> AiClient for MockClient<P> {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, AiResult> {
        self.inner.fetch(prompt)
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// Caching client wrapper (file cache + daily limit)
// ------------------------------------------------------------

/// Counter state is guarded by a `Mutex`; it is never held across an await.
pub struct CachingClient<P: Provider> {
    inner: P,
    cache_dir: PathBuf,
    daily_limit_max: u32,
    counter: Arc<Mutex<DailyCounter>>,
}

impl<P: Provider> CachingClient<P> {
    pub fn new(inner: P, cache_dir: PathBuf, daily_limit_max: u32) -> Self {
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            tracing::warn!(error = ?e, dir = %cache_dir.display(), "ai cache dir not created");
        }
        let counter = Arc::new(Mutex::new(
            load_daily_counter(&cache_dir).unwrap_or_default(),
        ));
        Self {
            inner,
            cache_dir,
            daily_limit_max,
            counter,
        }
    }

    /// Real calls made today.
    pub fn calls_today(&self) -> u32 {
        let g = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
        if g.is_expired() {
            0
        } else {
            g.count
        }
    }

    async fn generate_impl(&self, prompt: &str) -> AiResult {
        // 1) Cache lookup (hits do not count towards the limit).
        let key = cache_key(self.inner.name(), self.inner.model(), prompt);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            tracing::debug!(target: "ai", provider = self.inner.name(), "ai cache hit");
            return Ok(hit);
        }

        // 2) Daily limit.
        {
            let mut g = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
            if g.is_expired() {
                g.reset_to_today();
                let _ = save_daily_counter(&self.cache_dir, &g);
            }
            if g.count >= self.daily_limit_max {
                return Err(AiError::DailyLimit);
            }
        }

        // 3) Real call; count every attempt that reached the provider.
        let fresh = self.inner.fetch(prompt).await;
        {
            let mut g = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
            g.count = g.count.saturating_add(1);
            let _ = save_daily_counter(&self.cache_dir, &g);
        }
        let reply = fresh?;
        if reply.text.trim().is_empty() {
            return Err(AiError::Empty);
        }
        if let Err(e) = write_cache_file(&self.cache_dir, &key, &reply) {
            tracing::warn!(target: "ai", error = ?e, "ai cache write failed");
        }
        Ok(reply)
    }
}

impl<P: Provider> AiClient for CachingClient<P> {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, AiResult> {
        Box::pin(self.generate_impl(prompt))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

fn cache_key(provider: &str, model: &str, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(provider.as_bytes());
    hasher.update([0u8]);
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(16).map(|b| format!("{b:02x}")).collect()
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<AiReply> {
    let path = cache_path(dir, key);
    let mut file = fs::File::open(path).ok()?;
    let mut buf = String::new();
    file.read_to_string(&mut buf).ok()?;
    serde_json::from_str(&buf).ok()
}

fn write_cache_file(dir: &Path, key: &str, value: &AiReply) -> io::Result<()> {
    let path = cache_path(dir, key);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(value).map_err(io::Error::other)?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

// ------------------------------------------------------------
// Daily counter helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}
impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}
impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let p = counter_path(dir);
    let tmp = p.with_extension("json.tmp");
    let s = serde_json::to_string(dc).map_err(io::Error::other)?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(s.as_bytes())?;
    fs::rename(tmp, p)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
        reply: AiResult,
    }

    impl Provider for CountingProvider {
        fn fetch<'a>(&'a self, _prompt: &'a str) -> BoxFuture<'a, AiResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let out = self.reply.clone();
            Box::pin(async move { out })
        }
        fn name(&self) -> &'static str {
            "counting"
        }
        fn model(&self) -> &str {
            "m"
        }
    }

    fn counting(reply: AiResult) -> (CountingProvider, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            CountingProvider {
                calls: calls.clone(),
                reply,
            },
            calls,
        )
    }

    #[tokio::test]
    async fn second_identical_prompt_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (p, calls) = counting(Ok(AiReply { text: "[]".into() }));
        let client = CachingClient::new(p, dir.path().to_path_buf(), 5);

        assert_eq!(client.generate("p").await.unwrap().text, "[]");
        assert_eq!(client.generate("p").await.unwrap().text, "[]");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.calls_today(), 1);

        client.generate("other").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn daily_limit_blocks_real_calls_but_not_cache_hits() {
        let dir = tempfile::tempdir().unwrap();
        let (p, calls) = counting(Ok(AiReply { text: "{}".into() }));
        let client = CachingClient::new(p, dir.path().to_path_buf(), 1);

        client.generate("a").await.unwrap();
        assert_eq!(client.generate("b").await, Err(AiError::DailyLimit));
        assert!(client.generate("a").await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn counter_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (p, _) = counting(Ok(AiReply { text: "x".into() }));
            let client = CachingClient::new(p, dir.path().to_path_buf(), 1);
            client.generate("a").await.unwrap();
        }
        let (p, calls) = counting(Ok(AiReply { text: "x".into() }));
        let client = CachingClient::new(p, dir.path().to_path_buf(), 1);
        assert_eq!(client.generate("b").await, Err(AiError::DailyLimit));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let (p, calls) = counting(Err(AiError::Quota("HTTP 429".into())));
        let client = CachingClient::new(p, dir.path().to_path_buf(), 10);
        let err = client.generate("a").await.unwrap_err();
        assert!(err.is_rate_limited());
        assert!(client.generate("a").await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disabled_client_reports_unavailable() {
        let c = DisabledClient;
        assert!(!c.is_available());
        assert_eq!(c.generate("x").await, Err(AiError::Disabled));
    }

    #[test]
    fn cache_key_depends_on_model_and_prompt() {
        assert_ne!(cache_key("g", "m1", "p"), cache_key("g", "m2", "p"));
        assert_ne!(cache_key("g", "m", "p1"), cache_key("g", "m", "p2"));
        assert_eq!(cache_key("g", "m", "p").len(), 32);
    }

    #[test]
    fn mock_sample_parses_as_events() {
        let reply = MockProvider::sample_events().fixed.unwrap();
        let v = prompt::parse_json_array(&reply.text).unwrap();
        assert_eq!(v.as_array().unwrap().len(), 2);
    }
}
