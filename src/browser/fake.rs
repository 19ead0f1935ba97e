//! Scripted in-memory browser for tests: canned element lists per URL and selector.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{Browser, Element, Launcher};
use crate::error::{Result, ScrapeError};

type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Inner {
    pages: Mutex<HashMap<String, HashMap<String, Vec<Element>>>>,
    failing: Mutex<HashSet<String>>,
    failing_wait: Mutex<HashSet<String>>,
    hooks: Mutex<HashMap<String, Hook>>,
    current: Mutex<String>,
    visits: Mutex<Vec<String>>,
    typed: Mutex<Vec<(String, String)>>,
    redirect_after_click: Mutex<Option<String>>,
    shutdowns: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct ScriptedBrowser {
    inner: Arc<Inner>,
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, selector: &str, elements: Vec<Element>) -> Self {
        self.inner
            .pages
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .insert(selector.to_string(), elements);
        self
    }

    pub fn failing(self, url: &str) -> Self {
        self.inner.failing.lock().unwrap().insert(url.to_string());
        self
    }

    /// `url` loads, but waiting for elements on it errors.
    pub fn failing_wait(self, url: &str) -> Self {
        self.inner.failing_wait.lock().unwrap().insert(url.to_string());
        self
    }

    /// Run `hook` when `url` is navigated to.
    pub fn on_visit(self, url: &str, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.inner
            .hooks
            .lock()
            .unwrap()
            .insert(url.to_string(), Arc::new(hook));
        self
    }

    /// URL reported by `current_url` once anything has been clicked.
    pub fn after_click(self, url: &str) -> Self {
        *self.inner.redirect_after_click.lock().unwrap() = Some(url.to_string());
        self
    }

    pub fn visits(&self) -> Vec<String> {
        self.inner.visits.lock().unwrap().clone()
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.inner.typed.lock().unwrap().clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.inner.shutdowns.load(Ordering::SeqCst)
    }

    fn lookup(&self, selector: &str) -> Vec<Element> {
        let current = self.inner.current.lock().unwrap().clone();
        self.inner
            .pages
            .lock()
            .unwrap()
            .get(&current)
            .and_then(|page| page.get(selector))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Browser for ScriptedBrowser {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.inner.visits.lock().unwrap().push(url.to_string());
        let hook = self.inner.hooks.lock().unwrap().get(url).cloned();
        if let Some(hook) = hook {
            hook();
        }
        if self.inner.failing.lock().unwrap().contains(url) {
            return Err(ScrapeError::Navigation {
                url: url.to_string(),
                message: "scripted failure".into(),
            });
        }
        *self.inner.current.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn wait_for_all(&self, selector: &str, _timeout: Duration) -> Result<Vec<Element>> {
        let current = self.inner.current.lock().unwrap().clone();
        if self.inner.failing_wait.lock().unwrap().contains(&current) {
            return Err(ScrapeError::Browser("scripted wait failure".into()));
        }
        Ok(self.lookup(selector))
    }

    async fn find(&self, selector: &str) -> Result<Option<Element>> {
        Ok(self.lookup(selector).into_iter().next())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Element>> {
        Ok(self.lookup(selector))
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<()> {
        self.inner
            .typed
            .lock()
            .unwrap()
            .push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn click(&self, _selector: &str) -> Result<()> {
        if let Some(url) = self.inner.redirect_after_click.lock().unwrap().clone() {
            *self.inner.current.lock().unwrap() = url;
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.inner.current.lock().unwrap().clone())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out clones of one scripted browser, or fails to launch when empty.
#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    browser: Option<ScriptedBrowser>,
}

impl ScriptedLauncher {
    pub fn new(browser: ScriptedBrowser) -> Self {
        Self {
            browser: Some(browser),
        }
    }

    pub fn broken() -> Self {
        Self { browser: None }
    }
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    async fn launch(&self) -> Result<Box<dyn Browser>> {
        match &self.browser {
            Some(b) => Ok(Box::new(b.clone())),
            None => Err(ScrapeError::Browser("no chrome available".into())),
        }
    }
}
