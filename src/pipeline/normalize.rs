// src/pipeline/normalize.rs
//! Coerce untrusted JSON records into [`EventCandidate`].

use serde_json::{Map, Value};

use crate::model::{Coordinates, EventCandidate};

/// Text form of a scalar; `None` for null, arrays and objects.
fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, ',' | '¥' | '円' | '$'))
                .collect();
            cleaned.trim().parse::<f64>().ok()
        }
        _ => None,
    };
    n.filter(|x| x.is_finite())
}

fn first<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
}

fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> String {
    first(obj, keys).and_then(as_text).unwrap_or_default()
}

fn coordinates(obj: &Map<String, Value>) -> Option<Coordinates> {
    let (lat, lon) = match first(obj, &["coordinates", "location"]) {
        Some(Value::Object(inner)) => (
            first(inner, &["lat", "latitude"]).and_then(as_number),
            first(inner, &["lon", "lng", "longitude"]).and_then(as_number),
        ),
        Some(Value::Array(pair)) if pair.len() == 2 => {
            (as_number(&pair[0]), as_number(&pair[1]))
        }
        _ => (
            first(obj, &["lat", "latitude"]).and_then(as_number),
            first(obj, &["lon", "lng", "longitude"]).and_then(as_number),
        ),
    };
    Coordinates::new(lat?, lon?)
}

fn tags(obj: &Map<String, Value>) -> Vec<String> {
    match first(obj, &["tags", "keywords"]) {
        Some(Value::Array(items)) => items.iter().filter_map(as_text).collect(),
        Some(Value::String(s)) => s
            .split([',', '、', '，'])
            .map(|t| t.to_string())
            .collect(),
        _ => Vec::new(),
    }
}

/// Normalize one record. Non-objects yield `None`; missing fields take defaults.
pub fn normalize_value(v: &Value) -> Option<EventCandidate> {
    let obj = v.as_object()?;
    let mut ev = EventCandidate {
        title: text_field(obj, &["title", "name"]),
        description: text_field(obj, &["description", "summary"]),
        place: text_field(obj, &["place", "venue", "location_name"]),
        coordinates: coordinates(obj),
        price: first(obj, &["price", "fee"])
            .and_then(as_number)
            .filter(|p| *p >= 0.0),
        when: text_field(obj, &["when", "date", "datetime"]),
        url: text_field(obj, &["url", "link"]),
        ..Default::default()
    };
    ev.set_tags(tags(obj));
    Some(ev)
}

/// Normalize every element of a JSON array; anything else yields nothing.
pub fn normalize_all(v: &Value) -> Vec<EventCandidate> {
    match v {
        Value::Array(items) => items.iter().filter_map(normalize_value).collect(),
        _ => Vec::new(),
    }
}
