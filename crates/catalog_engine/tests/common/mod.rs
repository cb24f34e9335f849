#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::WorkItem;
use catalog_engine::{
    DriverFactory, FailureKind, ItemError, PageDriver, PipelineSettings, SessionError, SessionMode,
    SessionSettings,
};

/// Scripted pages keyed by URL; unknown URLs answer 404.
#[derive(Default)]
pub struct FakeSite {
    pages: Mutex<HashMap<String, String>>,
    fetched: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    latency: Mutex<Duration>,
}

impl FakeSite {
    pub fn new() -> Arc<Self> {
        engine_logging::initialize_for_tests();
        Arc::new(Self::default())
    }

    pub fn page(&self, url: &str, html: impl Into<String>) {
        self.pages.lock().unwrap().insert(url.to_string(), html.into());
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct FakeDriver {
    site: Arc<FakeSite>,
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn fetch_page_content(&self, url: &str) -> Result<String, ItemError> {
        let now = self.site.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.site.peak.fetch_max(now, Ordering::SeqCst);
        let latency = *self.site.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.site.fetched.lock().unwrap().push(url.to_string());
        self.site.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.site
            .pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| ItemError::new(FailureKind::HttpStatus(404), url))
    }

    async fn shutdown(&self) {}
}

/// Counts launches; launches numbered `fail_from` and later fail.
pub struct FakeFactory {
    site: Arc<FakeSite>,
    launches: AtomicUsize,
    fail_from: Option<usize>,
}

impl FakeFactory {
    pub fn new(site: Arc<FakeSite>) -> Arc<Self> {
        Arc::new(Self {
            site,
            launches: AtomicUsize::new(0),
            fail_from: None,
        })
    }

    pub fn failing_from(site: Arc<FakeSite>, launch: usize) -> Arc<Self> {
        Arc::new(Self {
            site,
            launches: AtomicUsize::new(0),
            fail_from: Some(launch),
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DriverFactory for FakeFactory {
    async fn launch(&self) -> Result<Arc<dyn PageDriver>, SessionError> {
        let attempt = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_from.is_some_and(|from| attempt >= from) {
            return Err(SessionError::Launch("chromium exited".into()));
        }
        Ok(Arc::new(FakeDriver {
            site: self.site.clone(),
        }))
    }
}

pub fn url(id: &str) -> String {
    format!("https://shop.test/p/{id}")
}

pub fn items(ids: &[&str]) -> Vec<WorkItem> {
    ids.iter().map(|id| WorkItem::new(*id, url(id))).collect()
}

pub fn product_page(name: &str, price: &str, swatches: &[&str]) -> String {
    let swatches: String = swatches
        .iter()
        .map(|s| format!(r#"<label class="color-swatch"><span class="sr-only">{s}</span></label>"#))
        .collect();
    format!(
        r#"<html><head><title>{name} | Shop</title></head><body>
        <h1>{name}</h1><span class="price">{price}</span>{swatches}</body></html>"#
    )
}

pub fn competitor_page(title: &str, text: &str) -> String {
    format!(
        r#"<html><body><h1 class="product-single__title">{title}</h1>
        <div class="prose"><p>{text} <a href="/guide">guide</a></p></div></body></html>"#
    )
}

pub fn sync_settings() -> SessionSettings {
    SessionSettings::default().without_delay()
}

pub fn concurrent_settings(max_in_flight: usize) -> SessionSettings {
    SessionSettings {
        mode: SessionMode::Concurrent,
        max_in_flight,
        ..SessionSettings::default().without_delay()
    }
}

pub fn pipeline_settings(root: &std::path::Path, session: SessionSettings) -> PipelineSettings {
    PipelineSettings::new(root).with_session(session)
}
