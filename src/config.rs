use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

const CONFIG_FILE: &str = "scraper";
const ENV_PREFIX: &str = "SCRAPER";

pub const DEFAULT_SEARCH_URL_TEMPLATE: &str = "https://www.linkedin.com/search/results/companies/\
?companyHqGeo=%5B%22{location}%22%5D\
&industryCompanyVertical=%5B%22{industry}%22%5D\
&companySize=%5B%22{company_size}%22%5D\
&keywords=a&origin=FACETED_SEARCH&page={page}";

/// Runtime settings: defaults, then `scraper.toml` if present, then `SCRAPER_*` env vars.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    pub locations_file: PathBuf,
    pub search_url_template: String,
    pub login_url: String,
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub wait_timeout_ms: u64,
    pub page_settle_ms: u64,
    pub detail_settle_ms: u64,
    pub login_settle_ms: u64,
    pub bind: String,
    pub cors_origin: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/companies.sqlite"),
            locations_file: PathBuf::from("locations.json"),
            search_url_template: DEFAULT_SEARCH_URL_TEMPLATE.to_string(),
            login_url: "https://www.linkedin.com/login".to_string(),
            headless: true,
            chrome_executable: None,
            wait_timeout_ms: 10_000,
            page_settle_ms: 10_000,
            detail_settle_ms: 5_000,
            login_settle_ms: 15_000,
            bind: "0.0.0.0:8000".to_string(),
            cors_origin: "http://localhost:3000".to_string(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn timings(&self) -> Timings {
        Timings {
            wait_timeout: Duration::from_millis(self.wait_timeout_ms),
            page_settle: Duration::from_millis(self.page_settle_ms),
            detail_settle: Duration::from_millis(self.detail_settle_ms),
            login_settle: Duration::from_millis(self.login_settle_ms),
        }
    }
}

/// Waits applied around browser navigation.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    /// Upper bound for an element-presence wait.
    pub wait_timeout: Duration,
    /// Pause after loading a search results page.
    pub page_settle: Duration,
    /// Pause after loading a detail page.
    pub detail_settle: Duration,
    /// Pause after submitting the login form.
    pub login_settle: Duration,
}

#[cfg(test)]
impl Timings {
    pub fn immediate() -> Self {
        Self {
            wait_timeout: Duration::ZERO,
            page_settle: Duration::ZERO,
            detail_settle: Duration::ZERO,
            login_settle: Duration::ZERO,
        }
    }
}
