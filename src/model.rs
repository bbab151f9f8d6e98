// src/model.rs
//! Core records shared by the fetch, extraction and ranking stages.

use serde::{Serialize, Serializer};

/// Maximum number of tags kept on a single event.
pub const MAX_TAGS: usize = 8;

/// WGS84 point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    /// Returns `None` for non-finite or out-of-range values.
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        let ok = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        ok.then_some(Self { lat, lon })
    }
}

/// A discovered activity after normalization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventCandidate {
    pub title: String,
    pub description: String,
    pub place: String,
    pub coordinates: Option<Coordinates>,
    pub price: Option<f64>,
    /// Free-text date description, never parsed.
    pub when: String,
    pub tags: Vec<String>,
    pub url: String,
    pub score: i32,
    pub distance_km: Option<f64>,
}

impl EventCandidate {
    /// Replace tags, dropping blanks and capping at [`MAX_TAGS`].
    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = tags
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .take(MAX_TAGS)
            .collect();
    }
}

#[derive(Serialize)]
struct EventWire<'a> {
    title: &'a str,
    description: &'a str,
    place: &'a str,
    lat: Option<f64>,
    lon: Option<f64>,
    price: Option<f64>,
    when: &'a str,
    tags: &'a [String],
    url: &'a str,
    score: i32,
    #[serde(rename = "distanceKm")]
    distance_km: Option<f64>,
}

impl Serialize for EventCandidate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        EventWire {
            title: &self.title,
            description: &self.description,
            place: &self.place,
            lat: self.coordinates.map(|c| c.lat),
            lon: self.coordinates.map(|c| c.lon),
            price: self.price,
            when: &self.when,
            tags: &self.tags,
            url: &self.url,
            score: self.score,
            distance_km: self.distance_km.map(round_km),
        }
        .serialize(serializer)
    }
}

fn round_km(km: f64) -> f64 {
    (km * 100.0).round() / 100.0
}

/// Anchor found on a scraped page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub url: String,
    pub label: String,
    /// Lower-cased host without a leading `www.`; empty when the URL has none.
    pub host: String,
}

/// Plain text of one fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub source: String,
    pub text: String,
}

/// Everything gathered from the source list in one refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Harvest {
    pub pages: Vec<PageText>,
    pub links: Vec<Link>,
    pub errors: Vec<String>,
}

impl Harvest {
    /// Page texts joined with blank lines, capped at `max_chars` characters.
    pub fn combined_text(&self, max_chars: usize) -> String {
        let joined = self
            .pages
            .iter()
            .map(|p| p.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        if joined.chars().count() > max_chars {
            joined.chars().take(max_chars).collect()
        } else {
            joined
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_reject_out_of_range() {
        assert!(Coordinates::new(35.57, 139.37).is_some());
        assert!(Coordinates::new(91.0, 0.0).is_none());
        assert!(Coordinates::new(0.0, f64::NAN).is_none());
    }

    #[test]
    fn tags_are_capped_and_trimmed() {
        let mut ev = EventCandidate::default();
        ev.set_tags((0..12).map(|i| format!(" t{i} ")).chain([" ".to_string()]));
        assert_eq!(ev.tags.len(), MAX_TAGS);
        assert_eq!(ev.tags[0], "t0");
    }

    #[test]
    fn wire_shape_uses_flat_coordinates_and_camel_distance() {
        let ev = EventCandidate {
            title: "苔観察".into(),
            coordinates: Coordinates::new(35.5, 139.3),
            distance_km: Some(3.14159),
            ..Default::default()
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["lat"], 35.5);
        assert_eq!(v["lon"], 139.3);
        assert_eq!(v["distanceKm"], 3.14);
        assert!(v["price"].is_null());
        assert_eq!(v["title"], "苔観察");
    }

    #[test]
    fn combined_text_is_capped() {
        let h = Harvest {
            pages: vec![
                PageText { source: "a".into(), text: "あ".repeat(10) },
                PageText { source: "b".into(), text: "い".repeat(10) },
            ],
            ..Default::default()
        };
        assert_eq!(h.combined_text(12).chars().count(), 12);
        assert_eq!(h.combined_text(1_000).chars().count(), 22);
    }
}
