use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::db;
use crate::parser::finalize::{fetch_detail_description, skills_from_description, DetailPage};
use crate::session::Session;
use crate::sites::Source;

pub struct BackfillOptions {
    pub source: Source,
    pub limit: Option<usize>,
    /// Revisit every row, not only those without skills.
    pub all: bool,
    pub dry_run: bool,
    pub wait: Duration,
    pub attempts: u32,
}

#[derive(Debug, Default)]
pub struct BackfillStats {
    pub total: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Re-derive skills for stored rows from their detail pages.
pub fn backfill(
    session: &mut dyn Session,
    conn: &Connection,
    opts: &BackfillOptions,
) -> Result<BackfillStats> {
    let site = opts.source.profile();
    let rows = db::fetch_missing_skills(conn, opts.source, opts.limit, !opts.all)?;
    let mut stats = BackfillStats {
        total: rows.len(),
        ..Default::default()
    };
    info!(rows = rows.len(), source = %opts.source, dry_run = opts.dry_run, "backfill starting");

    let pb = ProgressBar::new(rows.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    for row in &rows {
        pb.inc(1);
        let mut page = DetailPage::Unusable;
        for _ in 0..opts.attempts.max(1) {
            page = fetch_detail_description(session, &row.job_url, site, opts.wait)
                .with_context(|| format!("job {} ({})", row.id, row.job_url))?;
            if page != DetailPage::Unusable {
                break;
            }
        }

        let skills = page
            .into_description()
            .map(|d| skills_from_description(&d))
            .unwrap_or_default();
        if skills.is_empty() {
            stats.skipped += 1;
            info!(id = row.id, url = %row.job_url, "skip");
            continue;
        }

        if opts.dry_run {
            stats.updated += 1;
            info!(id = row.id, title = %row.title, ?skills, "dry-run");
            continue;
        }
        match db::update_skills(conn, row.id, &skills) {
            Ok(_) => {
                stats.updated += 1;
                info!(id = row.id, previous = %row.skills, ?skills, "updated");
            }
            Err(e) => {
                stats.failed += 1;
                warn!(id = row.id, error = %e, "update failed");
            }
        }
    }

    pb.finish_and_clear();
    Ok(stats)
}
