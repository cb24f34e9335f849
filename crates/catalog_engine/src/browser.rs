use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use engine_logging::{engine_debug, engine_info, engine_warn};
use futures_util::StreamExt;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::session::{DriverFactory, PageDriver, SessionError};
use crate::{FailureKind, ItemError};

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub page_timeout: Duration,
    /// Extra wait after navigation so client-side rendering can finish.
    pub settle_delay: Duration,
    pub window_size: (u32, u32),
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            page_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(1_500),
            window_size: (1280, 900),
        }
    }
}

/// Chromium controlled over the DevTools protocol. One page per fetch,
/// closed afterwards.
pub struct ChromiumDriver {
    settings: BrowserSettings,
    browser: RwLock<Option<Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
}

impl ChromiumDriver {
    pub async fn launch(settings: BrowserSettings) -> Result<Self, SessionError> {
        let (width, height) = settings.window_size;
        let mut builder = BrowserConfig::builder()
            .window_size(width, height)
            .request_timeout(settings.page_timeout)
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--mute-audio");
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &settings.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(SessionError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| SessionError::Launch(err.to_string()))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    engine_debug!("Browser handler error: {err}");
                }
            }
        });
        engine_info!("Chromium launched (headless: {})", settings.headless);

        Ok(Self {
            settings,
            browser: RwLock::new(Some(browser)),
            handler: Mutex::new(Some(handler_task)),
        })
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn fetch_page_content(&self, url: &str) -> Result<String, ItemError> {
        let guard = self.browser.read().await;
        let browser = guard
            .as_ref()
            .ok_or_else(|| ItemError::new(FailureKind::SessionFatal, "browser closed"))?;

        let page = tokio::time::timeout(self.settings.page_timeout, browser.new_page(url))
            .await
            .map_err(|_| ItemError::new(FailureKind::Timeout, url))?
            .map_err(|err| ItemError::new(FailureKind::Browser, err.to_string()))?;

        let rendered = async {
            page.wait_for_navigation()
                .await
                .map_err(|err| ItemError::new(FailureKind::Browser, err.to_string()))?;
            if !self.settings.settle_delay.is_zero() {
                tokio::time::sleep(self.settings.settle_delay).await;
            }
            page.content()
                .await
                .map_err(|err| ItemError::new(FailureKind::Browser, err.to_string()))
        }
        .await;

        if let Err(err) = page.close().await {
            engine_warn!("Failed to close page {url}: {err}");
        }
        rendered
    }

    async fn shutdown(&self) {
        if let Some(mut browser) = self.browser.write().await.take() {
            if let Err(err) = browser.close().await {
                engine_warn!("Failed to close browser: {err}");
            }
            if let Err(err) = browser.wait().await {
                engine_debug!("Browser process wait failed: {err}");
            }
        }
        if let Some(task) = self.handler.lock().await.take() {
            task.abort();
        }
        engine_info!("Chromium shut down");
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChromiumFactory {
    settings: BrowserSettings,
}

impl ChromiumFactory {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl DriverFactory for ChromiumFactory {
    async fn launch(&self) -> Result<Arc<dyn PageDriver>, SessionError> {
        let driver = ChromiumDriver::launch(self.settings.clone()).await?;
        Ok(Arc::new(driver))
    }
}
