use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::browser::{Browser, Launcher};
use crate::config::Settings;
use crate::db::Store;
use crate::error::{Result, ScrapeError};
use crate::facet::{FacetGrid, LocationNames};
use crate::orchestrator::{DiscoverPlan, Flow, Orchestrator, RunSummary};
use crate::session::{self, Credentials};

#[derive(Debug, Clone)]
pub enum JobKind {
    /// Crawl facets into a frontier table.
    Discover {
        grid: FacetGrid,
        frontier_table: String,
        page_limit: Option<u32>,
    },
    /// Extract every URL of an existing frontier table.
    Extract {
        frontier_table: String,
        records_table: String,
    },
    /// Crawl facets and extract each new URL as it is found.
    Combined {
        grid: FacetGrid,
        frontier_table: String,
        records_table: String,
        page_limit: Option<u32>,
    },
}

impl JobKind {
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::Discover { .. } => "discover",
            JobKind::Extract { .. } => "extract",
            JobKind::Combined { .. } => "run",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobRequest {
    pub credentials: Credentials,
    pub kind: JobKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed { summary: RunSummary },
    Cancelled { summary: RunSummary },
    Failed { error: String },
}

impl JobOutcome {
    fn failed(e: ScrapeError) -> Self {
        JobOutcome::Failed {
            error: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinishedJob {
    pub job: &'static str,
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub state: JobState,
    pub job: Option<&'static str>,
    pub started_at: Option<DateTime<Utc>>,
    pub last: Option<FinishedJob>,
}

struct Slot {
    status: JobStatus,
    /// Only set while a job runs; every job gets a fresh token.
    cancel: Option<CancellationToken>,
}

/// Runs at most one scrape job at a time and owns its cancellation signal.
///
/// Cheap to clone; all clones share the same job slot.
#[derive(Clone)]
pub struct JobRunner {
    launcher: Arc<dyn Launcher>,
    store: Arc<Store>,
    locations: Arc<LocationNames>,
    settings: Arc<Settings>,
    slot: Arc<Mutex<Slot>>,
    progress: bool,
}

impl JobRunner {
    pub fn new(
        launcher: Arc<dyn Launcher>,
        store: Arc<Store>,
        locations: Arc<LocationNames>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            launcher,
            store,
            locations,
            settings,
            slot: Arc::new(Mutex::new(Slot {
                status: JobStatus {
                    state: JobState::Idle,
                    job: None,
                    started_at: None,
                    last: None,
                },
                cancel: None,
            })),
            progress: false,
        }
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> JobStatus {
        self.slot().status.clone()
    }

    /// Ask the running job to stop at its next checkpoint. Returns whether a job was running.
    pub fn cancel(&self) -> bool {
        match &self.slot().cancel {
            Some(token) => {
                info!("Cancellation requested");
                token.cancel();
                true
            }
            None => {
                info!("Cancellation requested but no job is running");
                false
            }
        }
    }

    /// Start `job` in the background and return at once.
    pub fn start(&self, job: JobRequest) -> Result<()> {
        let token = self.claim(&job)?;
        let runner = self.clone();
        tokio::spawn(async move {
            let outcome = runner.supervise(&job, token).await;
            runner.release(&job, outcome);
        });
        Ok(())
    }

    /// Run `job` to the end and wait for its outcome.
    pub async fn run(&self, job: JobRequest) -> Result<JobOutcome> {
        let token = self.claim(&job)?;
        let outcome = self.supervise(&job, token).await;
        self.release(&job, outcome.clone());
        Ok(outcome)
    }

    /// Executes on its own task so a panic still ends in `release`.
    async fn supervise(&self, job: &JobRequest, token: CancellationToken) -> JobOutcome {
        let worker = self.clone();
        let request = job.clone();
        let task = tokio::spawn(async move { worker.execute(&request, &token).await });
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(job = job.kind.label(), "Job task died: {}", e);
                JobOutcome::Failed {
                    error: format!("job task failed: {e}"),
                }
            }
        }
    }

    fn claim(&self, job: &JobRequest) -> Result<CancellationToken> {
        let mut slot = self.slot();
        if slot.status.state == JobState::Running {
            warn!(job = job.kind.label(), "Rejected, another job is running");
            return Err(ScrapeError::JobAlreadyRunning);
        }
        let token = CancellationToken::new();
        slot.cancel = Some(token.clone());
        slot.status.state = JobState::Running;
        slot.status.job = Some(job.kind.label());
        slot.status.started_at = Some(Utc::now());
        info!(job = job.kind.label(), "Job started");
        Ok(token)
    }

    fn release(&self, job: &JobRequest, outcome: JobOutcome) {
        match &outcome {
            JobOutcome::Completed { summary } => info!(job = job.kind.label(), ?summary, "Job completed"),
            JobOutcome::Cancelled { summary } => info!(job = job.kind.label(), ?summary, "Job cancelled"),
            JobOutcome::Failed { error } => error!(job = job.kind.label(), "Job failed: {}", error),
        }
        let mut slot = self.slot();
        slot.cancel = None;
        slot.status = JobStatus {
            state: JobState::Idle,
            job: None,
            started_at: None,
            last: Some(FinishedJob {
                job: job.kind.label(),
                finished_at: Utc::now(),
                outcome,
            }),
        };
    }

    fn prepare_tables(&self, kind: &JobKind) -> Result<()> {
        match kind {
            JobKind::Discover { frontier_table, .. } => {
                self.store.init_frontier_table(frontier_table)?;
            }
            JobKind::Extract { records_table, .. } => {
                self.store.init_records_table(records_table)?;
            }
            JobKind::Combined {
                frontier_table,
                records_table,
                ..
            } => {
                self.store.init_frontier_table(frontier_table)?;
                self.store.init_records_table(records_table)?;
            }
        }
        Ok(())
    }

    /// Launch, sign in, orchestrate. The browser is shut down on every path that returns.
    async fn execute(&self, job: &JobRequest, cancel: &CancellationToken) -> JobOutcome {
        if let Err(e) = self.prepare_tables(&job.kind) {
            return JobOutcome::failed(e);
        }

        let mut browser = match self.launcher.launch().await {
            Ok(browser) => browser,
            Err(e) => {
                error!("Could not start the browser: {}", e);
                return JobOutcome::failed(e);
            }
        };

        let outcome = self.drive(browser.as_ref(), job, cancel).await;

        info!("Closing browser");
        if let Err(e) = browser.shutdown().await {
            warn!("Browser shutdown failed: {}", e);
        }
        outcome
    }

    async fn drive(
        &self,
        browser: &dyn Browser,
        job: &JobRequest,
        cancel: &CancellationToken,
    ) -> JobOutcome {
        let timings = self.settings.timings();
        if let Err(e) =
            session::authenticate(browser, &job.credentials, &self.settings.login_url, &timings).await
        {
            error!("Login failed: {}", e);
            return JobOutcome::failed(e);
        }

        let orchestrator = Orchestrator::new(
            browser,
            &self.store,
            &self.locations,
            &self.settings.search_url_template,
            timings,
            cancel,
        )
        .with_progress(self.progress);

        let result = match &job.kind {
            JobKind::Discover {
                grid,
                frontier_table,
                page_limit,
            } => {
                let plan = DiscoverPlan {
                    frontier_table: frontier_table.as_str(),
                    records_table: None,
                    page_limit: *page_limit,
                };
                Ok(orchestrator.discover(grid, &plan).await)
            }
            JobKind::Combined {
                grid,
                frontier_table,
                records_table,
                page_limit,
            } => {
                let plan = DiscoverPlan {
                    frontier_table: frontier_table.as_str(),
                    records_table: Some(records_table.as_str()),
                    page_limit: *page_limit,
                };
                Ok(orchestrator.discover(grid, &plan).await)
            }
            JobKind::Extract {
                frontier_table,
                records_table,
            } => orchestrator.extract_frontier(frontier_table, records_table).await,
        };

        match result {
            Ok((Flow::Finished, summary)) => JobOutcome::Completed { summary },
            Ok((Flow::Cancelled, summary)) => JobOutcome::Cancelled { summary },
            Err(e) => JobOutcome::failed(e),
        }
    }
}
