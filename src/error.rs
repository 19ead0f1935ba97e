use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScrapeError>;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("browser error: {0}")]
    Browser(String),

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid facet: {0}")]
    InvalidFacet(String),

    #[error("invalid table name: {0:?}")]
    InvalidTable(String),

    #[error("a job is already running")]
    JobAlreadyRunning,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
