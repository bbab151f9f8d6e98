// src/extract/html.rs
//! Regex-based page flattening and anchor collection.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::model::Link;

static RE_SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("script regex"));
static RE_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("style regex"));
static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));
static RE_ANCHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a[^>]+href=["']([^"']+)["'][^>]*>(.*?)</a>"#).expect("anchor regex")
});

/// Collapse runs of whitespace (including NBSP) into one space and trim.
pub fn collapse_ws(s: &str) -> String {
    RE_WS.replace_all(s, " ").trim().to_string()
}

/// Strip markup from a fragment: tags become spaces, entities are decoded.
pub fn strip_tags(fragment: &str) -> String {
    let no_tags = RE_TAGS.replace_all(fragment, " ");
    let decoded = html_escape::decode_html_entities(&no_tags);
    collapse_ws(&decoded)
}

/// Flatten a whole page to plain text, dropping scripts and styles,
/// capped at `max_chars` characters.
pub fn page_text(html: &str, max_chars: usize) -> String {
    let s = RE_SCRIPT.replace_all(html, " ");
    let s = RE_STYLE.replace_all(&s, " ");
    let text = strip_tags(&s);
    if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect()
    } else {
        text
    }
}

/// Host of `url` lower-cased with a leading `www.` removed.
/// `None` when the URL does not parse or has no host.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Collect anchors from `html`. Relative hrefs are resolved against `base`;
/// labels shorter than `min_label_chars` are skipped.
pub fn extract_links(html: &str, base: &str, min_label_chars: usize) -> Vec<Link> {
    let base_url = Url::parse(base).ok();
    let mut out = Vec::new();
    for caps in RE_ANCHOR.captures_iter(html) {
        let href = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let label = strip_tags(caps.get(2).map(|m| m.as_str()).unwrap_or_default());
        if label.is_empty() || label.chars().count() < min_label_chars {
            continue;
        }
        let href = html_escape::decode_html_entities(href);
        let abs = base_url
            .as_ref()
            .and_then(|b| b.join(&href).ok())
            .map(|u| u.to_string())
            .unwrap_or_else(|| href.to_string());
        let host = host_of(&abs).unwrap_or_default();
        out.push(Link {
            url: abs,
            label,
            host,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_text_drops_scripts_styles_and_entities() {
        let html = r#"<html><head><style>p{color:red}</style>
            <script>var x = "<b>no</b>";</script></head>
            <body><p>苔&nbsp;観察&amp;散歩</p>
            <div>  二行目 </div></body></html>"#;
        assert_eq!(page_text(html, 1_000), "苔 観察&散歩 二行目");
    }

    #[test]
    fn page_text_caps_by_chars() {
        let html = format!("<p>{}</p>", "あ".repeat(50));
        assert_eq!(page_text(&html, 10).chars().count(), 10);
    }

    #[test]
    fn links_are_resolved_and_hosts_normalized() {
        let html = r#"
            <a href="/event/123.html"><span>苔の観察会</span></a>
            <a class="x" href='https://www.Example.com/a?b=1&amp;c=2'>外部 リンク</a>
            <a href="/x">x</a>
            <a href="/empty"><img src="a.png"></a>
        "#;
        let links = extract_links(html, "https://www.city.sagamihara.kanagawa.jp/index.html", 2);
        assert_eq!(links.len(), 2);
        assert_eq!(
            links[0].url,
            "https://www.city.sagamihara.kanagawa.jp/event/123.html"
        );
        assert_eq!(links[0].label, "苔の観察会");
        assert_eq!(links[0].host, "city.sagamihara.kanagawa.jp");
        assert_eq!(links[1].url, "https://www.example.com/a?b=1&c=2");
        assert_eq!(links[1].host, "example.com");
    }

    #[test]
    fn host_of_handles_garbage() {
        assert_eq!(host_of("not a url"), None);
        assert_eq!(host_of(""), None);
        assert_eq!(host_of("https://WWW.fujino-art.jp/x").as_deref(), Some("fujino-art.jp"));
    }
}
