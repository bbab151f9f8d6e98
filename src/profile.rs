// src/profile.rs
//! Guardian interview transcript → child profile object.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::ai::prompt::{parse_json_object, profile_prompt};
use crate::ai::{AiClient, AiError};
use crate::api::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub child_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Number or numeric string.
    #[serde(default)]
    pub age: Option<Value>,
}

impl ProfileRequest {
    fn age(&self) -> Option<i64> {
        match self.age.as_ref()? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ProfileError {
    NotConfigured,
    BadRequest(&'static str),
    RateLimited,
    Failed(String),
}

impl IntoResponse for ProfileError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ProfileError::NotConfigured => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "AI provider is not configured" }),
            ),
            ProfileError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ProfileError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({
                    "error": "AI quota exceeded",
                    "hint": "Wait a while and retry, or raise the provider quota."
                }),
            ),
            ProfileError::Failed(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
        };
        (status, Json(body)).into_response()
    }
}

fn non_blank(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Validate, prompt, parse. The reply object gets `lastUpdated` (RFC 3339, UTC).
pub async fn extract_profile(ai: &dyn AiClient, req: &ProfileRequest) -> Result<Value, ProfileError> {
    let transcript = non_blank(&req.transcript).ok_or(ProfileError::BadRequest("transcript is required"))?;
    let child_id = non_blank(&req.child_id).ok_or(ProfileError::BadRequest("childId is required"))?;

    let prompt = profile_prompt(child_id, non_blank(&req.display_name), req.age(), transcript);
    let reply = ai.generate(&prompt).await.map_err(|e| match e {
        AiError::Disabled => ProfileError::NotConfigured,
        e if e.is_rate_limited() => ProfileError::RateLimited,
        e => ProfileError::Failed(e.to_string()),
    })?;

    let mut profile = match parse_json_object(&reply.text) {
        Some(Value::Object(map)) => map,
        _ => return Err(ProfileError::Failed("model reply is not a JSON object".into())),
    };
    profile
        .entry("childId")
        .or_insert_with(|| Value::String(child_id.to_string()));
    profile.insert(
        "lastUpdated".into(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    Ok(Value::Object(profile))
}

pub async fn profile_extract(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ProfileError> {
    if !state.ai.is_available() {
        return Err(ProfileError::NotConfigured);
    }
    let req: ProfileRequest =
        serde_json::from_slice(&body).map_err(|_| ProfileError::BadRequest("invalid JSON body"))?;
    match extract_profile(state.ai.as_ref(), &req).await {
        Ok(v) => Ok(Json(v)),
        Err(e) => {
            tracing::warn!(target: "api", error = ?e, "profile extract failed");
            Err(e)
        }
    }
}

pub async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method Not Allowed" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AiReply, DisabledClient, MockClient, MockProvider};

    fn client(reply: Result<&str, AiError>) -> MockClient<MockProvider> {
        MockClient::new(MockProvider {
            fixed: reply.map(|t| AiReply { text: t.to_string() }),
        })
    }

    fn req() -> ProfileRequest {
        ProfileRequest {
            transcript: Some("恐竜と苔が好き".into()),
            child_id: Some("c1".into()),
            display_name: None,
            age: Some(json!("7")),
        }
    }

    #[tokio::test]
    async fn success_adds_last_updated() {
        let ai = client(Ok(r#"```json
{"interests": ["恐竜", "苔"]}
```"#));
        let v = extract_profile(&ai, &req()).await.unwrap();
        assert_eq!(v["interests"][1], "苔");
        assert_eq!(v["childId"], "c1");
        let ts = v["lastUpdated"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
        assert!(ts.ends_with('Z'));
    }

    #[tokio::test]
    async fn missing_fields_are_bad_requests() {
        let ai = client(Ok("{}"));
        let mut r = req();
        r.child_id = Some("  ".into());
        assert!(matches!(
            extract_profile(&ai, &r).await,
            Err(ProfileError::BadRequest(_))
        ));
        let r = ProfileRequest::default();
        assert!(matches!(
            extract_profile(&ai, &r).await,
            Err(ProfileError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn failures_map_to_kinds() {
        let quota = client(Err(AiError::Quota("HTTP 429".into())));
        assert_eq!(extract_profile(&quota, &req()).await, Err(ProfileError::RateLimited));

        let junk = client(Ok("not json"));
        assert!(matches!(
            extract_profile(&junk, &req()).await,
            Err(ProfileError::Failed(_))
        ));

        assert_eq!(
            extract_profile(&DisabledClient, &req()).await,
            Err(ProfileError::NotConfigured)
        );
    }

    #[test]
    fn age_accepts_number_or_string() {
        let mut r = req();
        assert_eq!(r.age(), Some(7));
        r.age = Some(json!(9));
        assert_eq!(r.age(), Some(9));
        r.age = Some(json!("seven"));
        assert_eq!(r.age(), None);
    }
}
