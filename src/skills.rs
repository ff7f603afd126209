use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use serde_json::Value;
use tracing::{debug, warn};

use crate::parser::normalize::normalize_text;

/// Per-topic skill lists loaded from `<dir>/*.json`, keyed by the
/// lowercased file stem (`java.json` → `java`).
#[derive(Debug, Default, Clone)]
pub struct SkillLibrary {
    topics: BTreeMap<String, Vec<String>>,
}

impl SkillLibrary {
    /// A missing directory gives an empty library. Files that are not a
    /// JSON list of strings are skipped.
    pub fn load(dir: &Path) -> Self {
        let mut topics = BTreeMap::new();
        let Ok(entries) = fs::read_dir(dir) else {
            debug!(dir = %dir.display(), "no skill library directory");
            return Self { topics };
        };

        for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match read_topic(&path) {
                Some(values) if !values.is_empty() => {
                    topics.insert(stem.to_lowercase(), values);
                }
                Some(_) => {}
                None => warn!(file = %path.display(), "skill file is not a json list, skipped"),
            }
        }
        Self { topics }
    }

    #[cfg(test)]
    pub fn from_topics<I, K>(topics: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<String>)>,
        K: Into<String>,
    {
        Self {
            topics: topics
                .into_iter()
                .map(|(k, v)| (k.into().to_lowercase(), v))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Sample up to `count` skills without replacement. Topics whose name
    /// overlaps the keyword or appears in the title form the pool; with no
    /// match every topic does.
    pub fn pick_fallback<R: Rng + ?Sized>(
        &self,
        keyword: &str,
        title: &str,
        count: usize,
        rng: &mut R,
    ) -> Vec<String> {
        let key = keyword.trim().to_lowercase();
        let title = title.trim().to_lowercase();

        let matches = |name: &str| {
            (!key.is_empty() && (key.contains(name) || name.contains(&key)))
                || (!title.is_empty() && title.contains(name))
        };
        let mut pool: Vec<&String> = self
            .topics
            .iter()
            .filter(|(name, _)| matches(name))
            .flat_map(|(_, values)| values)
            .collect();
        if pool.is_empty() {
            pool = self.topics.values().flatten().collect();
        }

        if pool.len() <= count {
            pool.shuffle(rng);
            return pool.into_iter().cloned().collect();
        }
        pool.choose_multiple(rng, count)
            .map(|s| (*s).clone())
            .collect()
    }
}

fn read_topic(path: &Path) -> Option<Vec<String>> {
    let bytes = fs::read(path).ok()?;
    let text = String::from_utf8_lossy(&bytes);
    let text = text.trim_start_matches('\u{feff}');
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Array(items) => Some(
            items
                .iter()
                .map(normalize_text)
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        _ => None,
    }
}
