// src/ingest/normalize.rs
//! Canonical forms for titles, links and summaries, plus article identity.

use once_cell::sync::OnceCell;
use regex::Regex;
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;
use url::{form_urlencoded, Url};

use crate::indicator::Indicator;

/// Query keys dropped besides every `utm_*` key.
const TRACKING_PARAMS: &[&str] = &[
    "ref",
    "ref_src",
    "source",
    "fbclid",
    "gclid",
    "oc",
    "guccounter",
];

const SUMMARY_MAX_CHARS: usize = 1500;

fn re_ws() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn collapse_ws(s: &str) -> String {
    re_ws().replace_all(s, " ").trim().to_string()
}

/// NFKC, case-fold, drop `[..]`/`(..)` segments, replace punctuation with
/// spaces, collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    static RE_BRACKETED: OnceCell<Regex> = OnceCell::new();
    let re = RE_BRACKETED.get_or_init(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)").unwrap());

    let folded = title.nfkc().collect::<String>().to_lowercase();
    let stripped = re.replace_all(&folded, " ");
    let alnum: String = stripped
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    collapse_ws(&alnum)
}

fn is_tracking_param(key: &str) -> bool {
    let k = key.to_ascii_lowercase();
    k.starts_with("utm_") || TRACKING_PARAMS.contains(&k.as_str())
}

/// Lower-case scheme/host, drop tracking params and fragment, drop one
/// trailing slash. Unparsable input comes back trimmed.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let q = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&kept)
            .finish();
        url.set_query(Some(&q));
    }
    url.set_fragment(None);

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(&path[..path.len() - 1]);
    }

    let mut out = url.to_string();
    if url.query().is_none() && out.ends_with('/') {
        out.pop();
    }
    out
}

/// 16 hex chars of SHA-256 over `indicator|title_norm|link_norm`.
pub fn fingerprint(indicator: Indicator, title_norm: &str, link_norm: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(indicator.key().as_bytes());
    hasher.update(b"|");
    hasher.update(title_norm.as_bytes());
    hasher.update(b"|");
    hasher.update(link_norm.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Store uniqueness key: normalized link when present, else normalized title.
pub fn dedup_key(title_norm: &str, link_norm: &str) -> String {
    if link_norm.is_empty() {
        format!("T:{title_norm}")
    } else {
        format!("L:{link_norm}")
    }
}

/// Feed summaries arrive as HTML fragments: decode entities, strip tags,
/// fold typographic quotes, collapse whitespace, cap length.
pub fn clean_summary(s: &str) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());

    let decoded = html_escape::decode_html_entities(s).to_string();
    let out = re_tags.replace_all(&decoded, " ");
    let out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    let out = collapse_ws(&out);
    truncate_chars(&out, SUMMARY_MAX_CHARS)
}

/// Truncate to at most `max` chars (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
