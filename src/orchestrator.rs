use std::collections::HashSet;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::Browser;
use crate::config::Timings;
use crate::db::Store;
use crate::error::Result;
use crate::facet::{FacetGrid, FacetKey, LocationNames};
use crate::frontier::{FrontierCrawler, StopReason};
use crate::parser;

/// Counters for one job, kept up to date as rows are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub facets: usize,
    pub empty_facets: usize,
    pub failed_facets: usize,
    pub pages: usize,
    pub urls: usize,
    pub records: usize,
    pub skipped: usize,
}

/// How a walk over facets or frontier rows ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Finished,
    Cancelled,
}

/// Result of crawling one facet. Every variant lets the walk continue except `Cancelled`.
#[derive(Debug, Clone, PartialEq)]
pub enum FacetOutcome {
    Crawled { pages: u32 },
    /// First page had no results.
    Empty,
    /// Navigation or the result wait failed; rows already written stay.
    Aborted { page: u32, error: String },
    Cancelled,
}

/// Where discovered URLs go, and whether each one is extracted on the spot.
#[derive(Debug, Clone, Copy)]
pub struct DiscoverPlan<'a> {
    pub frontier_table: &'a str,
    /// Set for the combined mode: extract and store every new URL right away.
    pub records_table: Option<&'a str>,
    pub page_limit: Option<u32>,
}

pub struct Orchestrator<'a> {
    browser: &'a dyn Browser,
    store: &'a Store,
    locations: &'a LocationNames,
    template: &'a str,
    timings: Timings,
    cancel: &'a CancellationToken,
    progress: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        browser: &'a dyn Browser,
        store: &'a Store,
        locations: &'a LocationNames,
        template: &'a str,
        timings: Timings,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            browser,
            store,
            locations,
            template,
            timings,
            cancel,
            progress: false,
        }
    }

    /// Show a progress bar during the frontier extraction pass.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    fn cancelled(&self, checkpoint: &str) -> bool {
        let hit = self.cancel.is_cancelled();
        if hit {
            info!(checkpoint, "Cancellation requested, stopping");
        }
        hit
    }

    // ── Discovery ──

    /// Walk locations → industries → sizes. Cancellation is checked on entry to
    /// every level and after every page and record, and ends all levels at once.
    pub async fn discover(&self, grid: &FacetGrid, plan: &DiscoverPlan<'_>) -> (Flow, RunSummary) {
        let mut summary = RunSummary::default();
        let mut extracted = HashSet::new();
        info!(facets = grid.len(), table = plan.frontier_table, "Starting discovery");

        for location in &grid.locations {
            if self.cancelled("location") {
                return (Flow::Cancelled, summary);
            }
            let city = self.locations.resolve(location);
            info!(location = %location, city, "Searching location");

            for industry in &grid.industries {
                if self.cancelled("industry") {
                    return (Flow::Cancelled, summary);
                }
                for size in &grid.sizes {
                    if self.cancelled("size") {
                        return (Flow::Cancelled, summary);
                    }

                    let facet = FacetKey::new(location, industry, size);
                    info!(facet = %facet, city, "Searching facet");
                    summary.facets += 1;

                    match self
                        .crawl_facet(facet.clone(), city, plan, &mut summary, &mut extracted)
                        .await
                    {
                        Ok(FacetOutcome::Crawled { pages }) => {
                            info!(facet = %facet, pages, "Facet done");
                        }
                        Ok(FacetOutcome::Empty) => {
                            summary.empty_facets += 1;
                            info!(facet = %facet, "No companies found, skipping");
                        }
                        Ok(FacetOutcome::Aborted { page, error }) => {
                            summary.failed_facets += 1;
                            warn!(facet = %facet, page, "Facet aborted, moving on: {}", error);
                        }
                        Ok(FacetOutcome::Cancelled) => return (Flow::Cancelled, summary),
                        Err(e) => {
                            summary.failed_facets += 1;
                            warn!(facet = %facet, "Facet failed, moving on: {}", e);
                        }
                    }
                }
            }
        }

        (Flow::Finished, summary)
    }

    async fn crawl_facet(
        &self,
        facet: FacetKey,
        city: &str,
        plan: &DiscoverPlan<'_>,
        summary: &mut RunSummary,
        extracted: &mut HashSet<String>,
    ) -> Result<FacetOutcome> {
        let mut crawler = FrontierCrawler::new(
            self.browser,
            facet,
            city,
            self.template,
            plan.page_limit,
            self.timings,
        );

        while let Some(entries) = crawler.next_page().await {
            summary.pages += 1;
            for entry in entries {
                self.store
                    .insert_frontier(plan.frontier_table, &entry.url, &entry.city)?;
                summary.urls += 1;
                debug!(url = %entry.url, facet = %entry.facet, "URL stored");

                if let Some(records_table) = plan.records_table {
                    // Each organisation is linked more than once per result page.
                    if !extracted.insert(entry.url.clone()) {
                        continue;
                    }
                    self.extract_and_store(&entry.url, &entry.city, records_table, summary)
                        .await;
                    if self.cancelled("record") {
                        return Ok(FacetOutcome::Cancelled);
                    }
                }
            }
            if self.cancelled("page") {
                return Ok(FacetOutcome::Cancelled);
            }
        }

        Ok(match crawler.stop_reason() {
            Some(StopReason::Exhausted { page: 1 }) => FacetOutcome::Empty,
            Some(StopReason::Aborted { page, error }) => FacetOutcome::Aborted {
                page: *page,
                error: error.clone(),
            },
            _ => FacetOutcome::Crawled {
                pages: crawler.pages_emitted(),
            },
        })
    }

    // ── Detail extraction ──

    /// Extract every distinct URL stored in `frontier_table` into `records_table`.
    pub async fn extract_frontier(
        &self,
        frontier_table: &str,
        records_table: &str,
    ) -> Result<(Flow, RunSummary)> {
        let mut summary = RunSummary::default();
        let rows = self.store.fetch_frontier(frontier_table)?;
        if rows.is_empty() {
            info!(table = frontier_table, "No URLs to extract");
            return Ok((Flow::Finished, summary));
        }
        info!(table = frontier_table, count = rows.len(), "Extracting company details");

        if self.cancelled("record") {
            return Ok((Flow::Cancelled, summary));
        }

        let pb = self.progress_bar(rows.len());
        for (url, city) in rows {
            self.extract_and_store(&url, &city, records_table, &mut summary)
                .await;
            pb.inc(1);
            if self.cancelled("record") {
                pb.abandon();
                return Ok((Flow::Cancelled, summary));
            }
        }
        pb.finish_and_clear();

        info!(
            records = summary.records,
            skipped = summary.skipped,
            "Extraction finished"
        );
        Ok((Flow::Finished, summary))
    }

    async fn extract_and_store(
        &self,
        url: &str,
        city: &str,
        records_table: &str,
        summary: &mut RunSummary,
    ) {
        match self.extract_one(url, city, records_table).await {
            Ok(true) => summary.records += 1,
            Ok(false) => summary.skipped += 1,
            Err(e) => {
                summary.skipped += 1;
                warn!(url, "Detail extraction failed: {}", e);
            }
        }
    }

    /// Load the detail page for `url`, extract, and store. `false` when the page
    /// gave nothing usable.
    pub async fn extract_one(&self, url: &str, city: &str, records_table: &str) -> Result<bool> {
        let detail = detail_url(url);
        self.browser.navigate(&detail).await?;
        tokio::time::sleep(self.timings.detail_settle).await;

        let Some((raw, record)) = parser::process_page(self.browser).await else {
            warn!(url = %detail, "Nothing extracted, skipping");
            return Ok(false);
        };
        debug!(
            url = %detail,
            fields = raw.len(),
            raw = %serde_json::to_string(&raw).unwrap_or_default(),
            "Extracted fields"
        );

        let record = record.with_city(city);
        self.store.insert_record(records_table, &record)?;
        info!(
            url = %detail,
            name = record.name.as_deref().unwrap_or("-"),
            "Record stored"
        );
        Ok(true)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        pb
    }
}

/// The "about" page of an organisation, without query string or fragment.
pub fn detail_url(url: &str) -> String {
    let base = url.split(['?', '#']).next().unwrap_or_default();
    let base = base.trim_end_matches('/');
    if base.ends_with("/about") {
        format!("{base}/")
    } else {
        format!("{base}/about/")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::browser::fake::ScriptedBrowser;
    use crate::browser::Element;
    use crate::frontier::RESULT_LINK_SELECTOR;

    const TEMPLATE: &str = "https://s/?geo={location}&ind={industry}&size={company_size}&page={page}";

    fn search(loc: &str, ind: &str, size: &str, page: u32) -> String {
        FacetKey::new(loc, ind, size).render_url(TEMPLATE, page)
    }

    fn company(slug: &str) -> String {
        format!("https://www.linkedin.com/company/{slug}/")
    }

    fn links(slugs: &[&str]) -> Vec<Element> {
        slugs.iter().map(|s| Element::link(&company(s))).collect()
    }

    fn with_detail(browser: ScriptedBrowser, slug: &str, name: &str) -> ScriptedBrowser {
        browser.page(
            &detail_url(&company(slug)),
            "h1.org-top-card-summary__title",
            vec![Element::text(name)],
        )
    }

    fn store() -> Store {
        let s = Store::in_memory().unwrap();
        s.init_frontier_table("urls").unwrap();
        s.init_records_table("empresas").unwrap();
        s
    }

    fn names() -> LocationNames {
        LocationNames::from_map(HashMap::from([("100".to_string(), "Madrid".to_string())]))
    }

    fn grid(locs: &[&str], inds: &[&str], sizes: &[&str]) -> FacetGrid {
        let v = |xs: &[&str]| xs.iter().map(|x| x.to_string()).collect::<Vec<_>>();
        FacetGrid::new(v(locs), v(inds), v(sizes)).unwrap()
    }

    const DISCOVER_ONLY: DiscoverPlan<'static> = DiscoverPlan {
        frontier_table: "urls",
        records_table: None,
        page_limit: Some(1),
    };

    #[tokio::test]
    async fn single_facet_stores_links_in_document_order() {
        let browser = ScriptedBrowser::new().page(
            &search("100", "4", "B", 1),
            RESULT_LINK_SELECTOR,
            links(&["c", "a", "b"]),
        );
        let (store, names, cancel) = (store(), names(), CancellationToken::new());
        let orch = Orchestrator::new(&browser, &store, &names, TEMPLATE, Timings::immediate(), &cancel);

        let (flow, summary) = orch.discover(&grid(&["100"], &["4"], &["1-10"]), &DISCOVER_ONLY).await;

        assert_eq!(flow, Flow::Finished);
        assert_eq!(summary.urls, 3);
        assert_eq!(summary.pages, 1);
        assert_eq!(
            store.fetch_frontier("urls").unwrap(),
            vec![
                (company("c"), "Madrid".to_string()),
                (company("a"), "Madrid".to_string()),
                (company("b"), "Madrid".to_string()),
            ]
        );
        // page limit 1: page 2 never requested
        assert_eq!(browser.visits(), vec![search("100", "4", "B", 1)]);
    }

    #[tokio::test]
    async fn empty_and_failing_facets_are_skipped() {
        let browser = ScriptedBrowser::new()
            .failing(&search("100", "4", "C", 1))
            .page(&search("100", "4", "D", 1), RESULT_LINK_SELECTOR, links(&["x"]));
        let (store, names, cancel) = (store(), names(), CancellationToken::new());
        let orch = Orchestrator::new(&browser, &store, &names, TEMPLATE, Timings::immediate(), &cancel);

        let (flow, summary) = orch
            .discover(&grid(&["100"], &["4"], &["1-10", "11-50", "51-200"]), &DISCOVER_ONLY)
            .await;

        assert_eq!(flow, Flow::Finished);
        assert_eq!(summary.facets, 3);
        assert_eq!(summary.empty_facets, 1);
        assert_eq!(summary.failed_facets, 1);
        assert_eq!(summary.urls, 1);
        assert_eq!(store.count("urls").unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_location_uses_sentinel_city() {
        let browser = ScriptedBrowser::new().page(
            &search("999", "", "", 1),
            RESULT_LINK_SELECTOR,
            links(&["z"]),
        );
        let (store, names, cancel) = (store(), names(), CancellationToken::new());
        let orch = Orchestrator::new(&browser, &store, &names, TEMPLATE, Timings::immediate(), &cancel);

        orch.discover(&grid(&["999"], &[], &[]), &DISCOVER_ONLY).await;

        assert_eq!(
            store.fetch_frontier("urls").unwrap(),
            vec![(company("z"), crate::facet::UNKNOWN_LOCATION.to_string())]
        );
    }

    #[tokio::test]
    async fn cancel_inside_size_loop_stops_every_level() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let first = search("100", "4", "B", 1);
        let browser = ScriptedBrowser::new()
            .page(&first, RESULT_LINK_SELECTOR, links(&["a", "b"]))
            .on_visit(&first, move || trigger.cancel());
        let (store, names) = (store(), names());
        let orch = Orchestrator::new(&browser, &store, &names, TEMPLATE, Timings::immediate(), &cancel);

        let (flow, summary) = orch
            .discover(
                &grid(&["100", "200"], &["4", "5"], &["1-10", "11-50"]),
                &DiscoverPlan {
                    page_limit: None,
                    ..DISCOVER_ONLY
                },
            )
            .await;

        assert_eq!(flow, Flow::Cancelled);
        assert_eq!(summary.facets, 1);
        // the page in flight is committed, nothing after it runs
        assert_eq!(summary.urls, 2);
        assert_eq!(browser.visits(), vec![first]);
    }

    #[tokio::test]
    async fn cancelled_before_start_does_nothing() {
        let browser = ScriptedBrowser::new();
        let (store, names, cancel) = (store(), names(), CancellationToken::new());
        cancel.cancel();
        let orch = Orchestrator::new(&browser, &store, &names, TEMPLATE, Timings::immediate(), &cancel);

        let (flow, summary) = orch.discover(&grid(&["100"], &[], &[]), &DISCOVER_ONLY).await;

        assert_eq!(flow, Flow::Cancelled);
        assert_eq!(summary, RunSummary::default());
        assert!(browser.visits().is_empty());
    }

    #[tokio::test]
    async fn combined_mode_extracts_each_url_once() {
        let browser = ScriptedBrowser::new().page(
            &search("100", "", "", 1),
            RESULT_LINK_SELECTOR,
            links(&["a", "a", "b"]),
        );
        let browser = with_detail(browser, "a", "Acme");
        let browser = with_detail(browser, "b", "Beta");
        let (store, names, cancel) = (store(), names(), CancellationToken::new());
        let orch = Orchestrator::new(&browser, &store, &names, TEMPLATE, Timings::immediate(), &cancel);

        let (flow, summary) = orch
            .discover(
                &grid(&["100"], &[], &[]),
                &DiscoverPlan {
                    records_table: Some("empresas"),
                    ..DISCOVER_ONLY
                },
            )
            .await;

        assert_eq!(flow, Flow::Finished);
        assert_eq!(summary.urls, 3);
        assert_eq!(summary.records, 2);
        assert_eq!(store.count("urls").unwrap(), 3);
        assert_eq!(store.count("empresas").unwrap(), 2);
    }

    #[tokio::test]
    async fn frontier_pass_skips_empty_and_failing_pages() {
        let (store, names, cancel) = (store(), names(), CancellationToken::new());
        for slug in ["good", "blank", "broken", "good"] {
            store.insert_frontier("urls", &company(slug), "Madrid").unwrap();
        }
        let browser = with_detail(ScriptedBrowser::new(), "good", "Good S.A.")
            .failing(&detail_url(&company("broken")));
        let orch = Orchestrator::new(&browser, &store, &names, TEMPLATE, Timings::immediate(), &cancel);

        let (flow, summary) = orch.extract_frontier("urls", "empresas").await.unwrap();

        assert_eq!(flow, Flow::Finished);
        assert_eq!(summary.records, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(browser.visits().len(), 3);
        assert_eq!(store.count("empresas").unwrap(), 1);
    }

    #[tokio::test]
    async fn frontier_pass_stops_after_cancelled_record() {
        let (store, names, cancel) = (store(), names(), CancellationToken::new());
        store.insert_frontier("urls", &company("a"), "Madrid").unwrap();
        store.insert_frontier("urls", &company("b"), "Madrid").unwrap();
        let trigger = cancel.clone();
        let browser = with_detail(ScriptedBrowser::new(), "a", "Acme")
            .on_visit(&detail_url(&company("a")), move || trigger.cancel());
        let orch = Orchestrator::new(&browser, &store, &names, TEMPLATE, Timings::immediate(), &cancel);

        let (flow, summary) = orch.extract_frontier("urls", "empresas").await.unwrap();

        assert_eq!(flow, Flow::Cancelled);
        assert_eq!(summary.records, 1);
        assert_eq!(browser.visits(), vec![detail_url(&company("a"))]);
    }

    #[test]
    fn detail_url_points_at_about_page() {
        assert_eq!(
            detail_url("https://www.linkedin.com/company/acme/"),
            "https://www.linkedin.com/company/acme/about/"
        );
        assert_eq!(
            detail_url("https://www.linkedin.com/company/acme?trk=x"),
            "https://www.linkedin.com/company/acme/about/"
        );
        assert_eq!(
            detail_url("https://www.linkedin.com/company/acme/about"),
            "https://www.linkedin.com/company/acme/about/"
        );
    }
}
