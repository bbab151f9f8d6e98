// src/ai/prompt.rs
//! Prompt templates and tolerant JSON recovery from model replies.

use serde_json::Value;

/// Prompt asking for a JSON array of events found in `page_text`.
pub fn event_prompt(region: &str, page_text: &str) -> String {
    format!(
        "You extract upcoming events for families from Japanese municipal and tourism web pages \
about {region}.\n\
Return ONLY a JSON array. Each element must be an object with these keys:\n\
  title (string), description (string, one sentence), place (string),\n\
  lat (number or null), lon (number or null), price (number in JPY or null),\n\
  when (string, as written on the page), tags (array of up to 8 short strings),\n\
  url (string or empty).\n\
Skip administrative notices (tenders, taxes, hiring, elections). Do not invent events, \
dates or coordinates; use null or \"\" when unknown. Return [] when nothing qualifies.\n\
----- page text start -----\n\
{page_text}\n\
----- page text end -----"
    )
}

/// Prompt turning a guardian interview transcript into a child profile object.
pub fn profile_prompt(
    child_id: &str,
    display_name: Option<&str>,
    age: Option<i64>,
    transcript: &str,
) -> String {
    let mut lines = vec![
        "You build a child's profile from an interview with their guardian.".to_string(),
        "Output a single JSON object only. Use null or empty values for anything unknown; do not guess.".to_string(),
        "Suggested keys: interests (array), dislikes (array), strengths (array), notes (string).".to_string(),
        String::new(),
        format!("childId: {child_id}"),
    ];
    if let Some(name) = display_name.filter(|n| !n.trim().is_empty()) {
        lines.push(format!("displayName: {name}"));
    }
    if let Some(age) = age {
        lines.push(format!("age: {age}"));
    }
    lines.push(String::new());
    lines.push("----- transcript start -----".to_string());
    lines.push(transcript.to_string());
    lines.push("----- transcript end -----".to_string());
    lines.join("\n")
}

/// Remove Markdown code fences (```json ... ```).
pub fn strip_code_fences(reply: &str) -> String {
    reply.replace("```json", "").replace("```JSON", "").replace("```", "")
}

fn slice_between(s: &str, open: char, close: char) -> Option<&str> {
    let start = s.find(open)?;
    let end = s.rfind(close)?;
    (end > start).then(|| &s[start..=end])
}

/// Parse the outermost JSON array in a reply. `None` when there is none or it is malformed.
pub fn parse_json_array(reply: &str) -> Option<Value> {
    let cleaned = strip_code_fences(reply);
    let trimmed = cleaned.trim();
    if let Ok(v @ Value::Array(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }
    // Some models wrap the array: {"events": [...]}
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(trimmed) {
        if let Some(v @ Value::Array(_)) = obj.into_iter().map(|(_, v)| v).find(Value::is_array) {
            return Some(v);
        }
    }
    let candidate = slice_between(trimmed, '[', ']')?;
    match serde_json::from_str::<Value>(candidate) {
        Ok(v @ Value::Array(_)) => Some(v),
        _ => None,
    }
}

/// Parse the outermost JSON object in a reply.
pub fn parse_json_object(reply: &str) -> Option<Value> {
    let cleaned = strip_code_fences(reply);
    let trimmed = cleaned.trim();
    if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }
    let candidate = slice_between(trimmed, '{', '}')?;
    match serde_json::from_str::<Value>(candidate) {
        Ok(v @ Value::Object(_)) => Some(v),
        _ => None,
    }
}
