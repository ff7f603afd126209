use std::sync::LazyLock;

use itertools::Itertools;
use regex::Regex;
use serde_json::Value;

static SKILL_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[、,，/／|｜;；\n]+").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static HOST_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9.-]+\.[A-Za-z]{2,}/").unwrap());

/// Render a scalar as a trimmed string. Null, containers and missing values
/// become the empty string.
pub fn normalize_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

pub fn normalize_opt(value: Option<&Value>) -> String {
    value.map(normalize_text).unwrap_or_default()
}

pub fn normalize_skills(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().map(skill_item_text).collect(),
        Value::String(s) => SKILL_SPLIT_RE.split(s).map(str::to_string).collect(),
        other => vec![normalize_text(other)],
    };
    dedupe_preserving_order(raw)
}

fn skill_item_text(item: &Value) -> String {
    match item {
        Value::Object(map) => ["name", "label", "value"]
            .iter()
            .filter_map(|k| map.get(*k))
            .map(normalize_text)
            .find(|t| !t.is_empty())
            .unwrap_or_default(),
        other => normalize_text(other),
    }
}

/// Trim, drop empties, keep the first occurrence of each entry.
pub fn dedupe_preserving_order<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().trim().to_string())
        .filter(|s| !s.is_empty())
        .unique()
        .collect()
}

pub fn collapse_whitespace(text: &str) -> String {
    WS_RE.replace_all(text, " ").trim().to_string()
}

/// Turn whatever a payload holds for a logo into an absolute URL.
/// `image_host` is the site's CDN used for bare relative paths.
pub fn normalize_logo_url(raw: &str, image_host: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("data:") {
        return String::new();
    }
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return raw.to_string();
    }
    if let Some(rest) = raw.strip_prefix("//") {
        return format!("https://{}", rest);
    }

    let cleaned = raw.trim_start_matches('/');
    if HOST_PATH_RE.is_match(cleaned) {
        return format!("https://{}", cleaned);
    }
    format!("{}/{}", image_host.trim_end_matches('/'), cleaned)
}
