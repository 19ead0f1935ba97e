use axum::{
    extract::State,
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Settings;
use crate::db::check_table;
use crate::error::ScrapeError;
use crate::facet::{page_limit, FacetGrid};
use crate::runner::{JobKind, JobRequest, JobRunner, JobStatus};
use crate::session::Credentials;

#[derive(Deserialize)]
pub struct ScraperRequest {
    email: String,
    password: String,
    tabla: String,
    location: Vec<String>,
    #[serde(default)]
    industries: Vec<String>,
    #[serde(default)]
    company_sizes: Vec<String>,
    /// Absent: crawl each facet until a page is empty.
    #[serde(default)]
    pages_per_size: Option<i64>,
}

impl ScraperRequest {
    fn credentials(&self) -> Credentials {
        Credentials {
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }

    fn grid(&self) -> Result<FacetGrid, ScrapeError> {
        FacetGrid::new(
            self.location.clone(),
            self.industries.clone(),
            self.company_sizes.clone(),
        )
    }

    fn page_limit(&self) -> Result<Option<u32>, ScrapeError> {
        self.pages_per_size.map(page_limit).transpose()
    }
}

#[derive(Deserialize)]
pub struct ScrapeInfoRequest {
    email: String,
    password: String,
    tabla_origen: String,
    tabla_destino: String,
}

#[derive(Deserialize)]
pub struct RunRequest {
    #[serde(flatten)]
    search: ScraperRequest,
    tabla_destino: String,
}

/// Maps job errors onto HTTP statuses.
pub struct ApiError(ScrapeError);

impl From<ScrapeError> for ApiError {
    fn from(e: ScrapeError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ScrapeError::JobAlreadyRunning => StatusCode::CONFLICT,
            ScrapeError::InvalidFacet(_) | ScrapeError::InvalidTable(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(%status, "Request rejected: {}", self.0);
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult = Result<(StatusCode, Json<serde_json::Value>), ApiError>;

fn accepted(message: &str) -> ApiResult {
    Ok((StatusCode::ACCEPTED, Json(json!({ "message": message }))))
}

pub fn router(runner: JobRunner, cors_origin: HeaderValue) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/url", post(start_discovery))
        .route("/scrape", post(start_extraction))
        .route("/run", post(start_combined))
        .route("/cancel-process", post(cancel))
        .route("/status", get(status))
        .with_state(runner)
        .layer(
            CorsLayer::new()
                .allow_origin(cors_origin)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(Any),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            },
        ))
}

pub async fn serve(runner: JobRunner, settings: &Settings) -> anyhow::Result<()> {
    let origin: HeaderValue = settings.cors_origin.parse()?;
    let app = router(runner, origin);

    let listener = tokio::net::TcpListener::bind(&settings.bind).await?;
    info!("Scrape API listening on {}", settings.bind);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn home() -> Json<serde_json::Value> {
    Json(json!({ "message": "API de Scraping en ejecución." }))
}

async fn start_discovery(State(runner): State<JobRunner>, Json(req): Json<ScraperRequest>) -> ApiResult {
    let kind = JobKind::Discover {
        grid: req.grid()?,
        frontier_table: check_table(&req.tabla)?.to_string(),
        page_limit: req.page_limit()?,
    };
    runner.start(JobRequest {
        credentials: req.credentials(),
        kind,
    })?;
    accepted("Proceso de scraping iniciado en segundo plano.")
}

async fn start_extraction(
    State(runner): State<JobRunner>,
    Json(req): Json<ScrapeInfoRequest>,
) -> ApiResult {
    let kind = JobKind::Extract {
        frontier_table: check_table(&req.tabla_origen)?.to_string(),
        records_table: check_table(&req.tabla_destino)?.to_string(),
    };
    runner.start(JobRequest {
        credentials: Credentials {
            email: req.email,
            password: req.password,
        },
        kind,
    })?;
    accepted("Proceso de scraping de información iniciado en segundo plano.")
}

async fn start_combined(State(runner): State<JobRunner>, Json(req): Json<RunRequest>) -> ApiResult {
    let search = &req.search;
    let kind = JobKind::Combined {
        grid: search.grid()?,
        frontier_table: check_table(&search.tabla)?.to_string(),
        records_table: check_table(&req.tabla_destino)?.to_string(),
        page_limit: search.page_limit()?,
    };
    runner.start(JobRequest {
        credentials: search.credentials(),
        kind,
    })?;
    accepted("Proceso de scraping completo iniciado en segundo plano.")
}

async fn cancel(State(runner): State<JobRunner>) -> Json<serde_json::Value> {
    let was_running = runner.cancel();
    Json(json!({
        "message": "El proceso de scraping se ha cancelado.",
        "was_running": was_running,
    }))
}

async fn status(State(runner): State<JobRunner>) -> Json<JobStatus> {
    Json(runner.status())
}
