pub mod dom;
pub mod embedded;
pub mod network;

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use super::record::{extract_job_record, CandidateRecord};
use crate::session::CapturedResponse;
use crate::sites::SiteProfile;

pub use dom::DomHeuristics;
pub use embedded::EmbeddedState;
pub use network::NetworkCapture;

/// Point-in-time snapshot of one loaded search page.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub url: String,
    pub html: String,
    pub responses: Vec<CapturedResponse>,
}

/// One way of recovering job records from a page.
pub trait Strategy {
    fn name(&self) -> &'static str;

    /// Resolvable records only, unique by URL. Empty means "try the next one".
    fn collect(&self, page: &PageContext, site: &SiteProfile) -> Vec<CandidateRecord>;
}

#[derive(Debug, Default)]
pub struct ChainOutcome {
    /// Name of the strategy that produced the records, if any did.
    pub strategy: Option<&'static str>,
    pub records: Vec<CandidateRecord>,
}

/// Embedded state, then captured API responses, then the DOM.
pub fn default_chain() -> Vec<Box<dyn Strategy>> {
    vec![
        Box::new(EmbeddedState),
        Box::new(NetworkCapture),
        Box::new(DomHeuristics),
    ]
}

/// Run strategies in order and keep the first non-empty result.
/// Results from different strategies are never merged.
pub fn first_non_empty(
    chain: &[Box<dyn Strategy>],
    page: &PageContext,
    site: &SiteProfile,
) -> ChainOutcome {
    for strategy in chain {
        let records = strategy.collect(page, site);
        debug!(strategy = strategy.name(), found = records.len(), url = %page.url, "strategy tried");
        if !records.is_empty() {
            return ChainOutcome {
                strategy: Some(strategy.name()),
                records,
            };
        }
    }
    ChainOutcome::default()
}

pub fn collect_candidates(page: &PageContext, site: &SiteProfile) -> ChainOutcome {
    first_non_empty(&default_chain(), page, site)
}

/// Extract every candidate object, dropping unresolvable and repeated URLs.
pub fn records_from_objects<'a>(
    objects: impl IntoIterator<Item = &'a Value>,
    site: &SiteProfile,
) -> Vec<CandidateRecord> {
    let mut seen = HashSet::new();
    objects
        .into_iter()
        .filter_map(|obj| extract_job_record(obj, site))
        .filter(|rec| seen.insert(rec.job_url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sites::{Source, ZHILIAN};

    struct Fixed(&'static str, usize);

    impl Strategy for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn collect(&self, _page: &PageContext, site: &SiteProfile) -> Vec<CandidateRecord> {
            (0..self.1)
                .map(|i| {
                    CandidateRecord::bare(site.source, format!("https://jobs.zhaopin.com/{}-{}.htm", self.0, i))
                })
                .collect()
        }
    }

    #[test]
    fn first_non_empty_wins_without_merging() {
        let chain: Vec<Box<dyn Strategy>> = vec![
            Box::new(Fixed("empty", 0)),
            Box::new(Fixed("second", 2)),
            Box::new(Fixed("third", 5)),
        ];
        let out = first_non_empty(&chain, &PageContext::default(), &ZHILIAN);
        assert_eq!(out.strategy, Some("second"));
        assert_eq!(out.records.len(), 2);
        assert!(out.records.iter().all(|r| r.job_url.contains("second")));
        assert!(out.records.iter().all(|r| r.source == Source::Zhilian));
    }

    #[test]
    fn all_empty_yields_nothing() {
        let chain: Vec<Box<dyn Strategy>> = vec![Box::new(Fixed("a", 0)), Box::new(Fixed("b", 0))];
        let out = first_non_empty(&chain, &PageContext::default(), &ZHILIAN);
        assert_eq!(out.strategy, None);
        assert!(out.records.is_empty());
    }

    #[test]
    fn embedded_state_preferred_over_dom() {
        let html = r#"<html><script>window.__INITIAL_STATE__ = {"positionList":[
            {"name":"State Job","positionURL":"https://jobs.zhaopin.com/S1.htm"}]};</script>
            <ul><li><a href="https://jobs.zhaopin.com/D1.htm">Dom Job</a></li></ul></html>"#;
        let page = PageContext {
            html: html.to_string(),
            ..Default::default()
        };
        let out = collect_candidates(&page, &ZHILIAN);
        assert_eq!(out.strategy, Some("embedded-state"));
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].title, "State Job");
    }
}
