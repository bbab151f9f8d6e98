// src/extract/heuristics.rs
//! Keyword heuristics for turning anchor labels into event-like records.
//!
//! Everything here is plain substring/regex matching over NFKC-folded,
//! lower-cased text. Word lists are tuned for the Sagamihara area.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use unicode_normalization::UnicodeNormalization;

use crate::model::Link;

/// Hosts that publish first-party local listings.
pub const PRIORITY_DOMAINS: &[&str] = &[
    "city.sagamihara.kanagawa.jp",
    "sagamiharacitymuseum.jp",
    "sagamigawa-fureai.com",
    "fujino-art.jp",
    "e-sagamihara.com",
    "pref.kanagawa.jp",
    "kanagawa-park.or.jp",
    "jalps.org",
];

/// Local place names.
pub const LOCATION_WORDS: &[&str] = &[
    "相模原", "緑区", "中央区", "南区", "橋本", "淵野辺", "相模大野", "相模湖", "城山", "藤野",
    "愛川", "座間", "町田", "八王子", "高尾", "厚木",
];

/// Words that make a label look like an activity.
pub const EVENTISH: &[&str] = &[
    "イベント",
    "体験",
    "ワークショップ",
    "講座",
    "教室",
    "展示",
    "観察",
    "見学",
    "工作",
    "工房",
    "フェア",
    "マルシェ",
    "まつり",
    "祭",
    "ハンズオン",
    "セミナー",
    "天体観望",
    "星空",
    "プラネタリウム",
    "自然観察",
    "ガイドツアー",
    "クラフト",
];

/// Administrative notices (tenders, taxes, hiring, ...).
pub const TITLE_BLACKLIST: &[&str] = &[
    "入札", "落札", "公告", "指名停止", "募集要項", "公募型", "交通規制", "税", "納付", "確定申告",
    "防災", "注意喚起", "詐欺", "選挙", "議会", "採用", "人事", "求人", "条例", "告示", "コロナ",
    "新型",
];

/// Query synonym groups: (triggers, expansions).
const SYNONYMS: &[(&[&str], &[&str])] = &[
    (
        &["苔", "こけ", "ｺｹ"],
        &["苔", "こけ", "コケ", "苔玉", "テラリウム", "苔観察", "苔庭"],
    ),
    (
        &["手芸", "クラフト", "ハンドメイド"],
        &["手芸", "ハンドメイド", "クラフト", "刺繍", "裁縫", "ビーズ", "フェルト", "羊毛フェルト"],
    ),
    (
        &["編み", "ニット"],
        &["編み物", "かぎ編み", "棒針編み", "ニット", "アミグルミ"],
    ),
    (&["木工", "木"], &["木工", "木の工作", "DIY", "工房体験"]),
    (
        &["花", "フラワー"],
        &["花屋", "ブーケ", "フラワーアレンジメント", "生け花", "ドライフラワー"],
    ),
    (
        &["科学", "科学館", "天体"],
        &["科学", "科学館", "工作", "実験", "観察", "天体観望", "星空", "プラネタリウム"],
    ),
];

static RE_URL_EVENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(event|events|workshop|ws|calendar|katsudou|exhibition|eventnews)")
        .expect("url event regex")
});
static RE_TITLE_BRACKETS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[【】「」『』［］\[\]（）()]").expect("bracket regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));
static RE_WHEN: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"(?:20\d{2}年)?\s*\d{1,2}\s*月\s*\d{1,2}\s*日(?:\s*[（(][^）)]+[）)])?")
            .expect("when ymd regex"),
        Regex::new(r"\d{1,2}/\d{1,2}(?:\s*[-〜～]\s*\d{1,2}/\d{1,2})?").expect("when slash regex"),
        Regex::new(r"\d{1,2}\s*月(?:\s*\d{1,2}\s*日)?(?:\s*[-〜～]\s*\d{1,2}\s*月?\s*\d{0,2}\s*日?)?")
            .expect("when month regex"),
    ]
});

/// NFKC fold + lowercase, so full-width and half-width forms compare equal.
pub fn fold(s: &str) -> String {
    s.nfkc().collect::<String>().to_lowercase()
}

pub fn has_any(text: &str, words: &[&str]) -> bool {
    let n = fold(text);
    words.iter().any(|w| n.contains(&fold(w)))
}

pub fn url_looks_event(url: &str) -> bool {
    RE_URL_EVENT.is_match(&url.to_lowercase())
}

/// Label with bracket punctuation replaced by spaces and whitespace collapsed.
pub fn clean_title(label: &str) -> String {
    let s = RE_TITLE_BRACKETS.replace_all(label, " ");
    RE_WS.replace_all(&s, " ").trim().to_string()
}

/// Date-like fragments of a label joined with " / ", or empty.
/// Patterns are tried in order (full dates, slashes, bare months); the first
/// one that matches wins.
pub fn extract_when(label: &str) -> String {
    let s = RE_WS.replace_all(label, " ");
    for re in RE_WHEN.iter() {
        let hits: Vec<&str> = re
            .find_iter(&s)
            .map(|m| m.as_str().trim())
            .filter(|m| !m.is_empty())
            .collect();
        if !hits.is_empty() {
            return hits.join(" / ");
        }
    }
    String::new()
}

/// Folded query plus synonyms of any group it triggers. Empty for an empty query.
pub fn expand_terms(query: &str) -> Vec<String> {
    let q = fold(query.trim());
    if q.is_empty() {
        return Vec::new();
    }
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut push = |t: String| {
        if seen.insert(t.clone()) {
            out.push(t);
        }
    };
    push(q.clone());
    for (triggers, expansions) in SYNONYMS {
        if triggers.iter().any(|t| q.contains(&fold(t))) {
            for e in expansions.iter() {
                push(fold(e));
            }
        }
    }
    out
}

/// A link with its heuristic score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredLink {
    pub link: Link,
    pub score: i32,
}

/// Heuristic "event-likeness" of a link for query `query`.
pub fn score_link(link: &Link, query: &str, terms: &[String]) -> i32 {
    let label = fold(&link.label);
    let mut score = 0;
    if has_any(&link.label, TITLE_BLACKLIST) {
        score -= 100;
    }
    if url_looks_event(&link.url) {
        score += 4;
    }
    if has_any(&link.label, EVENTISH) {
        score += 6;
    }
    if has_any(&link.label, LOCATION_WORDS) {
        score += 6;
    }
    if !link.host.is_empty() && PRIORITY_DOMAINS.contains(&link.host.as_str()) {
        score += 8;
    }
    let q = fold(query.trim());
    if !terms.is_empty() && terms.iter().any(|t| label.contains(t.as_str())) {
        score += 10;
    } else if terms.is_empty() && !q.is_empty() && label.contains(&q) {
        score += 6;
    }
    score
}

pub fn score_links(links: &[Link], query: &str) -> Vec<ScoredLink> {
    let terms = expand_terms(query);
    links
        .iter()
        .map(|l| ScoredLink {
            link: l.clone(),
            score: score_link(l, query, &terms),
        })
        .collect()
}

/// Sort by score (stable), drop repeated URLs, cap per host, keep `limit`.
/// Links without a host are not capped.
pub fn rank_links(mut scored: Vec<ScoredLink>, per_host_cap: usize, limit: usize) -> Vec<ScoredLink> {
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    let mut seen_urls = HashSet::new();
    let mut per_host: HashMap<String, usize> = HashMap::new();
    let mut kept = Vec::new();
    for s in scored {
        if kept.len() >= limit {
            break;
        }
        if !seen_urls.insert(s.link.url.clone()) {
            continue;
        }
        if !s.link.host.is_empty() {
            let n = per_host.entry(s.link.host.clone()).or_default();
            *n += 1;
            if *n > per_host_cap {
                continue;
            }
        }
        kept.push(s);
    }
    kept
}
