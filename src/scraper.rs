use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::db;
use crate::error::ScrapeError;
use crate::parser::finalize::{is_security_page, Finalizer};
use crate::parser::record::JobRecord;
use crate::parser::strategy::network::blocked_asset_seen;
use crate::parser::strategy::{collect_candidates, PageContext};
use crate::session::{parse_cookie_header, Fingerprint, Session};
use crate::sites::SiteProfile;
use crate::skills::SkillLibrary;

pub struct CrawlOptions<'a> {
    pub site: &'static SiteProfile,
    pub base_url: &'a str,
    pub pages: u32,
    pub keyword: &'a str,
    pub fetch_details: bool,
    pub detail_wait: Duration,
}

/// Crawl stats returned after completion.
#[derive(Debug, Default)]
pub struct ScrapeStats {
    pub pages: usize,
    pub found: usize,
    pub duplicates: usize,
    pub saved: usize,
    pub security_pages: usize,
    pub failed_batches: usize,
}

#[derive(Default)]
struct PageOutcome {
    records: Vec<JobRecord>,
    found: usize,
    duplicates: usize,
    blocked: bool,
}

/// Load the site origin and replay the fingerprint cookies into it.
pub fn replay_cookies(
    session: &mut dyn Session,
    site: &SiteProfile,
    fingerprint: &Fingerprint,
) -> Result<()> {
    let cookies = parse_cookie_header(&fingerprint.cookie);
    if cookies.is_empty() {
        return Ok(());
    }
    if let Err(e) = session.navigate(site.origin) {
        if e.is_fatal() {
            return Err(e).context("opening site origin");
        }
        warn!(origin = site.origin, error = %e, "origin did not load, setting cookies anyway");
    }
    session.add_cookies(&cookies, site.cookie_domain)?;
    info!(count = cookies.len(), domain = site.cookie_domain, "cookies replayed");
    Ok(())
}

/// Walk search pages in order, saving each page's new records as one batch.
/// Only a lost browser session aborts the run.
pub fn crawl<R: Rng + ?Sized>(
    session: &mut dyn Session,
    conn: &Connection,
    opts: &CrawlOptions,
    library: &SkillLibrary,
    rng: &mut R,
) -> Result<ScrapeStats> {
    let finalizer = Finalizer {
        site: opts.site,
        keyword: opts.keyword,
        library,
        fetch_details: opts.fetch_details,
        detail_wait: opts.detail_wait,
    };
    let mut seen = HashSet::new();
    let mut stats = ScrapeStats::default();

    let pb = ProgressBar::new(u64::from(opts.pages));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} pages {msg}")?
            .progress_chars("=> "),
    );

    for index in 0..opts.pages {
        let url = opts.site.search_url(opts.base_url, index, opts.keyword);
        let page_no = index + 1;

        let outcome = scrape_page(session, &url, &finalizer, &mut seen, rng)
            .with_context(|| format!("page {} ({})", page_no, url))?;
        stats.pages += 1;
        stats.found += outcome.found;
        stats.duplicates += outcome.duplicates;
        if outcome.blocked {
            stats.security_pages += 1;
        }

        match db::upsert_jobs(conn, &outcome.records) {
            Ok(n) => {
                stats.saved += outcome.records.len();
                info!(page = page_no, found = outcome.found, saved = n, "page done");
            }
            Err(e) => {
                stats.failed_batches += 1;
                warn!(page = page_no, records = outcome.records.len(), error = %e, "batch not saved");
            }
        }
        pb.set_message(format!("{} saved", stats.saved));
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        pages = stats.pages,
        found = stats.found,
        saved = stats.saved,
        duplicates = stats.duplicates,
        "crawl finished"
    );
    Ok(stats)
}

fn scrape_page<R: Rng + ?Sized>(
    session: &mut dyn Session,
    url: &str,
    finalizer: &Finalizer,
    seen: &mut HashSet<String>,
    rng: &mut R,
) -> Result<PageOutcome, ScrapeError> {
    let site = finalizer.site;
    let loaded = session.navigate(url).and_then(|_| session.page_source());
    let html = match loaded {
        Ok(html) => html,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            warn!(url, error = %e, "search page not loaded");
            return Ok(PageOutcome::default());
        }
    };

    if is_security_page(&html, site) {
        warn!(url, "security verification on search page");
        return Ok(PageOutcome {
            blocked: true,
            ..Default::default()
        });
    }

    let page = PageContext {
        url: url.to_string(),
        html,
        responses: session.take_responses(),
    };
    let chain = collect_candidates(&page, site);
    if chain.records.is_empty() {
        if blocked_asset_seen(&page.responses, site) {
            warn!(url, "site rejected the injected fingerprint (403 on static assets); retry without --use-fingerprint");
        } else {
            warn!(url, "no jobs found on page");
        }
        return Ok(PageOutcome::default());
    }
    info!(url, strategy = chain.strategy.unwrap_or("none"), found = chain.records.len(), "candidates");

    let mut outcome = PageOutcome {
        found: chain.records.len(),
        ..Default::default()
    };
    for candidate in chain.records {
        if !seen.insert(candidate.job_url.clone()) {
            outcome.duplicates += 1;
            continue;
        }
        let record = finalizer.finalize(session, candidate, rng)?;
        info!(title = %record.title, company = %record.company, url = %record.job_url, "job");
        outcome.records.push(record);
    }
    Ok(outcome)
}
