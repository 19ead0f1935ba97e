use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Browser, Element, Launcher};
use crate::config::Settings;
use crate::error::{Result, ScrapeError};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

impl From<CdpError> for ScrapeError {
    fn from(err: CdpError) -> Self {
        ScrapeError::Browser(err.to_string())
    }
}

/// Launches a local Chrome over CDP.
pub struct ChromeLauncher {
    headless: bool,
    executable: Option<PathBuf>,
}

impl ChromeLauncher {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            headless: settings.headless,
            executable: settings.chrome_executable.clone(),
        }
    }
}

#[async_trait]
impl Launcher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn Browser>> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-blink-features=AutomationControlled");
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(ref path) = self.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(ScrapeError::Browser)?;

        let (browser, mut handler) = CdpBrowser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler stopped: {}", e);
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        info!(headless = self.headless, "Chrome launched");

        Ok(Box::new(ChromeBrowser {
            browser: Mutex::new(browser),
            page,
            handler: Some(handler),
        }))
    }
}

/// One Chrome process driving a single tab.
pub struct ChromeBrowser {
    browser: Mutex<CdpBrowser>,
    page: Page,
    handler: Option<JoinHandle<()>>,
}

async fn snapshot(el: &chromiumoxide::element::Element) -> Result<Element> {
    let text = el.inner_text().await?.unwrap_or_default();
    let y = match el.bounding_box().await {
        Ok(bbox) => Some(bbox.y),
        Err(e) => {
            debug!("No layout box for element: {}", e);
            None
        }
    };
    let href = el.attribute("href").await?;
    Ok(Element { text, y, href })
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| ScrapeError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn wait_for_all(&self, selector: &str, timeout: Duration) -> Result<Vec<Element>> {
        let deadline = Instant::now() + timeout;
        loop {
            // No match is an empty list, so an error here is a real failure.
            let found = self.find_all(selector).await?;
            if !found.is_empty() || Instant::now() >= deadline {
                return Ok(found);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn find(&self, selector: &str) -> Result<Option<Element>> {
        // CDP reports a missing node as an error; absence is not a failure here.
        match self.page.find_element(selector).await {
            Ok(el) => Ok(Some(snapshot(&el).await?)),
            Err(e) => {
                debug!(selector, "Element not found: {}", e);
                Ok(None)
            }
        }
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Element>> {
        let handles = self.page.find_elements(selector).await?;
        let mut out = Vec::with_capacity(handles.len());
        for el in &handles {
            match snapshot(el).await {
                Ok(snap) => out.push(snap),
                // Nodes can detach between the query and the read.
                Err(e) => debug!(selector, "Skipping unreadable element: {}", e),
            }
        }
        Ok(out)
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<()> {
        let el = self.page.find_element(selector).await?;
        el.click().await?;
        el.type_str(text).await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.page.find_element(selector).await?.click().await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn shutdown(&mut self) -> Result<()> {
        let browser = self.browser.get_mut();
        if let Err(e) = browser.close().await {
            warn!("Chrome close failed: {}", e);
        }
        if let Err(e) = browser.wait().await {
            warn!("Chrome did not exit cleanly: {}", e);
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        info!("Chrome shut down");
        Ok(())
    }
}

impl Drop for ChromeBrowser {
    fn drop(&mut self) {
        // Reached without `shutdown` when the job task unwinds.
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}
