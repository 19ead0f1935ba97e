pub mod chrome;
#[cfg(test)]
pub mod fake;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Snapshot of a located element, read eagerly so callers never hold live handles.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub text: String,
    /// Vertical offset on screen; `None` when the element has no layout box.
    pub y: Option<f64>,
    pub href: Option<String>,
}

#[cfg(test)]
impl Element {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            y: None,
            href: None,
        }
    }

    pub fn at(text: &str, y: f64) -> Self {
        Self {
            y: Some(y),
            ..Self::text(text)
        }
    }

    pub fn link(href: &str) -> Self {
        Self {
            href: Some(href.to_string()),
            ..Self::text("")
        }
    }
}

/// The minimal headless-browser capability set the pipeline is written against.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Poll until at least one element matches or `timeout` elapses.
    /// A timeout is not an error: it yields an empty list.
    async fn wait_for_all(&self, selector: &str, timeout: Duration) -> Result<Vec<Element>>;

    async fn find(&self, selector: &str) -> Result<Option<Element>>;

    /// All matches in document order.
    async fn find_all(&self, selector: &str) -> Result<Vec<Element>>;

    async fn type_into(&self, selector: &str, text: &str) -> Result<()>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    async fn shutdown(&mut self) -> Result<()>;
}

/// Acquires a fresh browser for one job.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Browser>>;
}
