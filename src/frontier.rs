use tracing::{debug, info, warn};

use crate::browser::Browser;
use crate::config::Timings;
use crate::facet::FacetKey;

/// Anchors pointing at an organisation page.
pub const RESULT_LINK_SELECTOR: &str = "a[href*=\"linkedin.com/company/\"]";

/// A discovered candidate for detail extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontierEntry {
    pub url: String,
    pub city: String,
    pub facet: FacetKey,
}

/// Why a crawl stopped emitting pages.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// `page` came back with no result links.
    Exhausted { page: u32 },
    /// The configured page limit was reached.
    PageLimit,
    /// Navigation or the result wait failed on `page`.
    Aborted { page: u32, error: String },
}

/// Walks the search result pages of one facet, one page per `next_page` call.
///
/// Pages are numbered from 1 on every new crawler; nothing is resumable.
pub struct FrontierCrawler<'a> {
    browser: &'a dyn Browser,
    facet: FacetKey,
    city: String,
    template: &'a str,
    page_limit: Option<u32>,
    timings: Timings,
    page: u32,
    stopped: Option<StopReason>,
}

impl<'a> FrontierCrawler<'a> {
    pub fn new(
        browser: &'a dyn Browser,
        facet: FacetKey,
        city: &str,
        template: &'a str,
        page_limit: Option<u32>,
        timings: Timings,
    ) -> Self {
        Self {
            browser,
            facet,
            city: city.to_string(),
            template,
            page_limit,
            timings,
            page: 1,
            stopped: None,
        }
    }

    /// Set once the crawl has ended.
    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stopped.as_ref()
    }

    /// Number of pages that produced entries so far.
    pub fn pages_emitted(&self) -> u32 {
        self.page - 1
    }

    /// Entries of the next result page, in document order. `None` once the crawl is over.
    pub async fn next_page(&mut self) -> Option<Vec<FrontierEntry>> {
        if self.stopped.is_some() {
            return None;
        }
        if self.page_limit.is_some_and(|limit| self.page > limit) {
            return self.stop(StopReason::PageLimit);
        }

        let page = self.page;
        let url = self.facet.render_url(self.template, page);
        debug!(%url, page, "Loading result page");

        if let Err(e) = self.browser.navigate(&url).await {
            warn!(facet = %self.facet, page, "Result page failed to load: {}", e);
            return self.stop(StopReason::Aborted {
                page,
                error: e.to_string(),
            });
        }
        tokio::time::sleep(self.timings.page_settle).await;

        let links = match self
            .browser
            .wait_for_all(RESULT_LINK_SELECTOR, self.timings.wait_timeout)
            .await
        {
            Ok(links) => links,
            Err(e) => {
                warn!(facet = %self.facet, page, "Waiting for results failed: {}", e);
                return self.stop(StopReason::Aborted {
                    page,
                    error: e.to_string(),
                });
            }
        };

        let entries: Vec<FrontierEntry> = links
            .into_iter()
            .filter_map(|link| link.href)
            .map(|url| FrontierEntry {
                url,
                city: self.city.clone(),
                facet: self.facet.clone(),
            })
            .collect();

        if entries.is_empty() {
            info!(facet = %self.facet, page, "No more results");
            return self.stop(StopReason::Exhausted { page });
        }

        info!(facet = %self.facet, page, found = entries.len(), "Result page");
        self.page += 1;
        Some(entries)
    }

    fn stop(&mut self, reason: StopReason) -> Option<Vec<FrontierEntry>> {
        self.stopped = Some(reason);
        None
    }
}
