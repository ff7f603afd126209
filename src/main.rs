mod backfill;
mod config;
mod db;
mod error;
mod parser;
mod scraper;
mod session;
mod sites;
mod skills;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use indicatif::HumanDuration;
use tracing::{info, warn};

use crate::config::Settings;
use crate::session::{ChromeSession, Session};
use crate::sites::Source;
use crate::skills::SkillLibrary;

#[derive(Parser)]
#[command(name = "job_scraper", about = "Liepin / Zhilian job listing scraper")]
struct Cli {
    /// Settings file, any extension the config crate understands
    #[arg(long, global = true, default_value = "jobscrape")]
    config: PathBuf,
    /// SQLite database path (overrides settings)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct BrowserArgs {
    /// Run the browser without a window
    #[arg(long)]
    headless: bool,
    /// Replay user agent, cookies and xsrf token from the fingerprint file
    #[arg(long)]
    use_fingerprint: bool,
    #[arg(long)]
    fingerprint_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl search pages and upsert jobs
    Crawl {
        #[arg(long, value_enum, default_value = "zhilian")]
        site: Source,
        /// Number of search pages
        #[arg(short = 'n', long, default_value = "3")]
        pages: u32,
        /// Search keyword, also used to pick fallback skills
        #[arg(long, default_value = "java")]
        key: String,
        /// First search page (defaults to the site's)
        #[arg(long)]
        base_url: Option<String>,
        #[command(flatten)]
        browser: BrowserArgs,
        /// Raw cookie header, implies fingerprint replay
        #[arg(long)]
        cookie: Option<String>,
        #[arg(long)]
        user_agent: Option<String>,
        /// Seconds to wait on each detail page
        #[arg(long)]
        detail_wait: Option<f64>,
        /// Never open detail pages
        #[arg(long)]
        no_detail: bool,
        #[arg(long)]
        skills_dir: Option<PathBuf>,
    },
    /// Fill empty skills of stored jobs from their detail pages
    Backfill {
        #[arg(long, value_enum, default_value = "liepin")]
        site: Source,
        #[arg(short = 'n', long, default_value = "200")]
        limit: usize,
        /// Process every row, not only those without skills
        #[arg(long)]
        all: bool,
        #[arg(long)]
        dry_run: bool,
        /// Seconds to wait on each detail page
        #[arg(long, default_value = "1.5")]
        wait: f64,
        #[command(flatten)]
        browser: BrowserArgs,
    },
    /// Open the site, wait for a manual login, save the browser identity
    Fingerprint {
        #[arg(long, value_enum, default_value = "liepin")]
        site: Source,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Seconds to leave the window open
        #[arg(long, default_value = "60")]
        wait: u64,
    },
    /// Show database statistics
    Stats,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load_from(&cli.config)?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }

    let result = match cli.command {
        Commands::Crawl {
            site,
            pages,
            key,
            base_url,
            browser,
            cookie,
            user_agent,
            detail_wait,
            no_detail,
            skills_dir,
        } => {
            browser.apply(&mut settings);
            if let Some(w) = detail_wait {
                settings.detail_wait_secs = w;
            }
            if no_detail {
                settings.fetch_details = false;
            }
            if let Some(dir) = skills_dir {
                settings.skills_dir = dir;
            }

            let mut session_config = settings.session_config()?;
            if let Some(c) = cookie {
                session_config.fingerprint.cookie = c;
                session_config.use_fingerprint = true;
            }
            if let Some(ua) = user_agent {
                session_config.fingerprint.user_agent = ua;
                session_config.use_fingerprint = true;
            }

            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let library = SkillLibrary::load(&settings.skills_dir);
            if library.is_empty() {
                warn!(dir = %settings.skills_dir.display(), "no fallback skill library");
            } else {
                info!(topics = library.len(), "skill library loaded");
            }

            let profile = site.profile();
            let mut session = ChromeSession::launch(session_config)?;
            if session.config().use_fingerprint {
                let fingerprint = session.config().fingerprint.clone();
                scraper::replay_cookies(&mut session, profile, &fingerprint)?;
            }

            let base_url = base_url.unwrap_or_else(|| profile.default_search_url.to_string());
            let opts = scraper::CrawlOptions {
                site: profile,
                base_url: &base_url,
                pages,
                keyword: &key,
                fetch_details: settings.fetch_details,
                detail_wait: settings.detail_wait(),
            };
            println!("Crawling {} page(s) of {} ...", pages, site);
            let stats = scraper::crawl(&mut session, &conn, &opts, &library, &mut rand::rng())?;
            println!(
                "Done: {} pages, {} jobs found, {} saved, {} duplicates, {} security pages, {} failed batches.",
                stats.pages,
                stats.found,
                stats.saved,
                stats.duplicates,
                stats.security_pages,
                stats.failed_batches
            );
            Ok(())
        }
        Commands::Backfill {
            site,
            limit,
            all,
            dry_run,
            wait,
            browser,
        } => {
            browser.apply(&mut settings);
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;

            let session_config = settings.session_config()?;
            let mut session = ChromeSession::launch(session_config)?;
            if session.config().use_fingerprint {
                let fingerprint = session.config().fingerprint.clone();
                scraper::replay_cookies(&mut session, site.profile(), &fingerprint)?;
            }

            let opts = backfill::BackfillOptions {
                source: site,
                limit: Some(limit),
                all,
                dry_run,
                wait: Duration::try_from_secs_f64(wait).unwrap_or_default(),
                attempts: 2,
            };
            let stats = backfill::backfill(&mut session, &conn, &opts)?;
            println!(
                "Done: {} rows, {} updated, {} skipped, {} failed{}.",
                stats.total,
                stats.updated,
                stats.skipped,
                stats.failed,
                if dry_run { " (dry run)" } else { "" }
            );
            Ok(())
        }
        Commands::Fingerprint { site, output, wait } => {
            let output = output.unwrap_or_else(|| settings.fingerprint_file.clone());
            let mut session_config = settings.session_config()?;
            session_config.headless = false;
            session_config.use_fingerprint = false;

            let mut session = ChromeSession::launch(session_config)?;
            session.navigate(site.profile().origin)?;
            println!("Log in within {}s; the browser identity is saved afterwards.", wait);
            std::thread::sleep(Duration::from_secs(wait));

            let fingerprint = session.capture_fingerprint()?;
            fingerprint.save(&output)?;
            println!(
                "Saved fingerprint to {} ({} cookie chars, xsrf token {}).",
                output.display(),
                fingerprint.cookie.len(),
                if fingerprint.xsrf_token.is_empty() { "missing" } else { "present" }
            );
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Total:          {}", s.total);
            for (source, count) in &s.per_source {
                println!("  {:<12} {}", source, count);
            }
            println!("Without skills: {}", s.without_skills);
            println!("Without salary: {}", s.without_salary);
            println!("Last crawl:     {}", s.last_crawl.as_deref().unwrap_or("-"));
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nFinished in {}", HumanDuration(elapsed));
    }

    result
}

impl BrowserArgs {
    fn apply(&self, settings: &mut Settings) {
        if self.headless {
            settings.headless = true;
        }
        if self.use_fingerprint {
            settings.use_fingerprint = true;
        }
        if let Some(path) = &self.fingerprint_file {
            settings.fingerprint_file = path.clone();
        }
    }
}
