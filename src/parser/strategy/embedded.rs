use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::{records_from_objects, PageContext, Strategy};
use crate::parser::fields::iter_dicts;
use crate::parser::record::CandidateRecord;
use crate::sites::SiteProfile;

static TRAILING_COMMA_OBJ_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s*\}").unwrap());
static TRAILING_COMMA_ARR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s*\]").unwrap());

/// Job objects inside the page's bootstrapped client state.
pub struct EmbeddedState;

impl Strategy for EmbeddedState {
    fn name(&self) -> &'static str {
        "embedded-state"
    }

    fn collect(&self, page: &PageContext, site: &SiteProfile) -> Vec<CandidateRecord> {
        site.state_markers
            .iter()
            .filter_map(|marker| extract_state(&page.html, marker))
            .map(|state| records_from_objects(iter_dicts(&state), site))
            .find(|records| !records.is_empty())
            .unwrap_or_default()
    }
}

/// Locate `marker`, then return the JSON object text that follows it.
pub fn find_state_object<'a>(html: &'a str, marker: &str) -> Option<&'a str> {
    let idx = html.find(marker)?;
    let start = idx + html[idx..].find('{')?;
    let end = scan_balanced(html, start)?;
    Some(&html[start..end])
}

/// Byte offset just past the brace closing the one at `start`. Braces inside
/// string literals are ignored, escapes included.
pub fn scan_balanced(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes.get(start..)?.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the object text, retrying once with trailing commas removed.
pub fn parse_state(text: &str) -> Option<Value> {
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(first) => {
            let repaired = TRAILING_COMMA_OBJ_RE.replace_all(text, "}");
            let repaired = TRAILING_COMMA_ARR_RE.replace_all(&repaired, "]");
            serde_json::from_str(&repaired)
                .inspect_err(|e| debug!(error = %e, first = %first, "embedded state unparseable"))
                .ok()
        }
    }
}

pub fn extract_state(html: &str, marker: &str) -> Option<Value> {
    find_state_object(html, marker)
        .and_then(parse_state)
        .filter(Value::is_object)
}
