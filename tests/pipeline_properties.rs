// tests/pipeline_properties.rs
//
// Properties of the post-extraction pipeline, checked through the public API.

use event_scout::model::{Coordinates, EventCandidate};
use event_scout::pipeline::{
    self, dedup_and_cap, filter_by_radius, haversine_km, normalize_all, rank, PipelineParams,
};
use serde_json::json;

fn origin() -> Coordinates {
    Coordinates::new(35.571, 139.3707).unwrap()
}

fn ev(title: &str, url: &str, at: Option<(f64, f64)>) -> EventCandidate {
    EventCandidate {
        title: title.into(),
        url: url.into(),
        coordinates: at.and_then(|(lat, lon)| Coordinates::new(lat, lon)),
        ..Default::default()
    }
}

fn params(query: &str) -> PipelineParams<'_> {
    PipelineParams {
        query,
        origin: origin(),
        radius_km: 8.0,
        per_host_cap: 3,
        limit: 20,
    }
}

#[test]
fn identical_candidates_collapse_to_one() {
    let a = ev("A", "https://a.jp/1", None);
    let (out, stats) = dedup_and_cap(vec![a.clone(), a], 3);
    assert_eq!(out.len(), 1);
    assert_eq!(stats.duplicates, 1);
}

#[test]
fn museum_candidate_is_kept_and_scored_by_bucket() {
    let out = pipeline::run(
        vec![ev("Museum", "https://m.jp/", Some((35.5416, 139.3608)))],
        params(""),
    );
    assert_eq!(out.len(), 1);
    let d = out[0].distance_km.unwrap();
    assert!((d - 3.39).abs() < 0.05, "distance {d}");
    assert_eq!(out[0].score, 10);
}

#[test]
fn query_in_title_adds_exactly_twelve() {
    let at = Some((35.5416, 139.3608));
    let plain = pipeline::run(vec![ev("観察会", "https://m.jp/a", at)], params("苔"));
    let hit = pipeline::run(vec![ev("苔の観察会", "https://m.jp/b", at)], params("苔"));
    assert_eq!(hit[0].score - plain[0].score, 12);
}

#[test]
fn radius_keeps_unknown_locations() {
    let items = vec![
        ev("far", "https://a.jp/1", Some((35.9, 139.9))),
        ev("nowhere", "https://a.jp/2", None),
        ev("near", "https://a.jp/3", Some((35.572, 139.371))),
    ];
    let (kept, dropped) = filter_by_radius(items, origin(), 8.0);
    let titles: Vec<_> = kept.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["nowhere", "near"]);
    assert_eq!(dropped, 1);
}

#[test]
fn ranking_is_bounded_and_non_increasing() {
    let items: Vec<_> = (0..35)
        .map(|i| {
            let lat = 35.571 + (i as f64) * 0.004;
            ev(&format!("e{i}"), &format!("https://h{i}.jp/"), Some((lat, 139.3707)))
        })
        .collect();
    let out = rank(items, "", origin(), 20);
    assert_eq!(out.len(), 20);
    assert!(out.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn haversine_is_symmetric_and_zero_on_self() {
    let a = origin();
    let b = Coordinates::new(35.5416, 139.3608).unwrap();
    assert_eq!(haversine_km(a, a), 0.0);
    assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-9);
}

#[test]
fn per_host_cap_holds_except_for_unparsable_urls() {
    let mut items: Vec<_> = (0..6)
        .map(|i| ev(&format!("same host {i}"), &format!("https://www.city.jp/e/{i}"), None))
        .collect();
    items.extend((0..4).map(|i| ev(&format!("no url {i}"), "", None)));
    let (out, stats) = dedup_and_cap(items, 3);
    let city = out.iter().filter(|e| e.url.contains("city.jp")).count();
    assert_eq!(city, 3);
    assert_eq!(out.len(), 7);
    assert_eq!(stats.capped, 3);
}

#[test]
fn model_output_is_coerced() {
    let raw = json!([
        { "name": "苔玉教室", "venue": "博物館", "latitude": "35.5416", "lng": 139.3608,
          "fee": "1,000円", "date": "5月10日", "keywords": "苔, 工作, , 親子",
          "link": "https://m.jp/koke" },
        { "description": "no title" },
        "not an object",
        { "title": "tags", "tags": ["a","b","c","d","e","f","g","h","i","j"] }
    ]);
    let out = normalize_all(&raw);
    assert_eq!(out.len(), 3);
    assert_eq!(out[0].title, "苔玉教室");
    assert_eq!(out[0].place, "博物館");
    assert_eq!(out[0].price, Some(1000.0));
    assert_eq!(out[0].tags, vec!["苔", "工作", "親子"]);
    assert!(out[0].coordinates.is_some());
    assert_eq!(out[1].title, "");
    assert_eq!(out[2].tags.len(), 8);
}
