mod api;
mod browser;
mod config;
mod db;
mod error;
mod facet;
mod frontier;
mod orchestrator;
mod parser;
mod runner;
mod session;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::warn;

use browser::chrome::ChromeLauncher;
use config::Settings;
use db::Store;
use facet::{FacetGrid, LocationNames};
use runner::{JobKind, JobOutcome, JobRequest, JobRunner};
use session::Credentials;

#[derive(Parser)]
#[command(name = "company_scraper", about = "Faceted company directory scraper")]
struct Cli {
    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LoginArgs {
    #[arg(long, env = "SCRAPER_EMAIL")]
    email: String,
    #[arg(long, env = "SCRAPER_PASSWORD", hide_env_values = true)]
    password: String,
}

impl LoginArgs {
    fn credentials(self) -> Credentials {
        Credentials {
            email: self.email,
            password: self.password,
        }
    }
}

#[derive(Args)]
struct SearchArgs {
    /// Location code (repeatable)
    #[arg(short, long = "location", required = true)]
    locations: Vec<String>,
    /// Industry code (repeatable, default: any)
    #[arg(short, long = "industry")]
    industries: Vec<String>,
    /// Company size, label or code, e.g. "11-50" or "C" (repeatable, default: any)
    #[arg(short, long = "size")]
    sizes: Vec<String>,
    /// Table receiving discovered URLs
    #[arg(long, default_value = "urls")]
    table: String,
    /// Max result pages per facet, at least 1 (default: until a page is empty)
    #[arg(short = 'n', long, value_parser = parse_page_limit)]
    pages: Option<u32>,
}

fn parse_page_limit(arg: &str) -> Result<u32, String> {
    let pages: i64 = arg.trim().parse().map_err(|e| format!("{e}"))?;
    facet::page_limit(pages).map_err(|e| e.to_string())
}

impl SearchArgs {
    fn grid(&self) -> anyhow::Result<FacetGrid> {
        Ok(FacetGrid::new(
            self.locations.clone(),
            self.industries.clone(),
            self.sizes.clone(),
        )?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the URL and record tables
    Init {
        #[arg(long, default_value = "urls")]
        urls: String,
        #[arg(long, default_value = "empresas")]
        records: String,
    },
    /// Crawl search facets and store company URLs
    Discover {
        #[command(flatten)]
        login: LoginArgs,
        #[command(flatten)]
        search: SearchArgs,
    },
    /// Extract company details for every stored URL
    Extract {
        #[command(flatten)]
        login: LoginArgs,
        /// Table holding discovered URLs
        #[arg(long, default_value = "urls")]
        from: String,
        /// Table receiving company records
        #[arg(long, default_value = "empresas")]
        into: String,
    },
    /// Discover + extract in one pass (each URL extracted as soon as it is found)
    Run {
        #[command(flatten)]
        login: LoginArgs,
        #[command(flatten)]
        search: SearchArgs,
        #[arg(long, default_value = "empresas")]
        into: String,
    },
    /// Serve the HTTP job API
    Serve,
    /// Row counts per table
    Stats {
        #[arg(long = "table", default_values = ["urls", "empresas"])]
        tables: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load().context("loading settings")?;
    if cli.headed {
        settings.headless = false;
    }

    let result = match cli.command {
        Commands::Init { urls, records } => {
            let store = Store::open(&settings.db_path)?;
            store.init_frontier_table(&urls)?;
            store.init_records_table(&records)?;
            println!(
                "Tables '{}' and '{}' ready in {}",
                urls,
                records,
                settings.db_path.display()
            );
            Ok(())
        }
        Commands::Discover { login, search } => {
            let kind = JobKind::Discover {
                grid: search.grid()?,
                frontier_table: search.table.clone(),
                page_limit: search.pages,
            };
            run_job(settings, login.credentials(), kind).await
        }
        Commands::Extract { login, from, into } => {
            let kind = JobKind::Extract {
                frontier_table: from,
                records_table: into,
            };
            run_job(settings, login.credentials(), kind).await
        }
        Commands::Run {
            login,
            search,
            into,
        } => {
            let kind = JobKind::Combined {
                grid: search.grid()?,
                frontier_table: search.table.clone(),
                records_table: into,
                page_limit: search.pages,
            };
            run_job(settings, login.credentials(), kind).await
        }
        Commands::Serve => {
            let runner = build_runner(&settings)?;
            api::serve(runner, &settings).await
        }
        Commands::Stats { tables } => {
            let store = Store::open(&settings.db_path)?;
            for table in &tables {
                match store.count(table) {
                    Ok(n) => println!("{:<16} {}", table, n),
                    Err(e) => println!("{:<16} - ({})", table, e),
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn build_runner(settings: &Settings) -> anyhow::Result<JobRunner> {
    let store = Store::open(&settings.db_path)
        .with_context(|| format!("opening {}", settings.db_path.display()))?;
    let locations = load_locations(&settings.locations_file)?;
    Ok(JobRunner::new(
        Arc::new(ChromeLauncher::from_settings(settings)),
        Arc::new(store),
        Arc::new(locations),
        Arc::new(settings.clone()),
    ))
}

fn load_locations(path: &Path) -> anyhow::Result<LocationNames> {
    if !path.exists() {
        warn!(path = %path.display(), "Location file missing, every city will be unknown");
        return Ok(LocationNames::default());
    }
    LocationNames::load(path).with_context(|| format!("reading {}", path.display()))
}

/// One job in the foreground. Ctrl-C cancels it at the next checkpoint.
async fn run_job(settings: Settings, credentials: Credentials, kind: JobKind) -> anyhow::Result<()> {
    let runner = build_runner(&settings)?.with_progress(true);

    let watcher = runner.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current step");
            watcher.cancel();
        }
    });

    let outcome = runner.run(JobRequest { credentials, kind }).await;
    ctrl_c.abort();

    match outcome? {
        JobOutcome::Completed { summary } | JobOutcome::Cancelled { summary } => {
            println!(
                "{} facets ({} empty, {} failed), {} pages, {} URLs, {} records ({} skipped).",
                summary.facets,
                summary.empty_facets,
                summary.failed_facets,
                summary.pages,
                summary.urls,
                summary.records,
                summary.skipped,
            );
            Ok(())
        }
        JobOutcome::Failed { error } => anyhow::bail!(error),
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
