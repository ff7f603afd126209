use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use ::config::{Config, Environment, File};
use serde::Deserialize;
use tracing::warn;

use crate::session::{Fingerprint, SessionConfig};

const ENV_PREFIX: &str = "JOBSCRAPE";

/// Run settings: defaults, then `jobscrape.toml`, then `JOBSCRAPE_*`
/// variables. CLI flags are applied on top by the caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    pub skills_dir: PathBuf,
    pub fingerprint_file: PathBuf,
    pub headless: bool,
    pub use_fingerprint: bool,
    pub fetch_details: bool,
    pub settle_secs: f64,
    pub detail_wait_secs: f64,
    pub page_load_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/jobs.sqlite"),
            skills_dir: PathBuf::from("skills"),
            fingerprint_file: PathBuf::from("fingerprint.txt"),
            headless: false,
            use_fingerprint: false,
            fetch_details: true,
            settle_secs: 4.0,
            detail_wait_secs: 2.0,
            page_load_timeout_secs: 35,
        }
    }
}

impl Settings {
    /// `file` is looked up with any supported extension and may be absent.
    pub fn load_from(file: &Path) -> Result<Self> {
        let file = file.to_string_lossy();
        Config::builder()
            .add_source(File::with_name(&file).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .and_then(Config::try_deserialize)
            .context("invalid configuration")
    }

    pub fn detail_wait(&self) -> Duration {
        secs(self.detail_wait_secs)
    }

    /// Freeze the browser settings. The fingerprint file is only read when
    /// replay is enabled.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let fingerprint = if self.use_fingerprint {
            let fp = Fingerprint::load(&self.fingerprint_file)?;
            if fp.is_empty() {
                warn!(path = %self.fingerprint_file.display(), "fingerprint replay requested but nothing to replay");
            }
            fp
        } else {
            Fingerprint::default()
        };
        Ok(SessionConfig {
            headless: self.headless,
            use_fingerprint: self.use_fingerprint,
            fingerprint,
            page_load_timeout: Duration::from_secs(self.page_load_timeout_secs),
            settle_delay: secs(self.settle_secs),
        })
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}
