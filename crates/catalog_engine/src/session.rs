use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use engine_logging::{engine_info, engine_warn};
use tokio::sync::{Mutex, Semaphore};

use crate::{FailureKind, ItemError};

/// One running page renderer (a browser process, or a plain HTTP client).
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Loads `url`, waits for it to settle and returns the rendered HTML.
    async fn fetch_page_content(&self, url: &str) -> Result<String, ItemError>;

    async fn shutdown(&self);
}

/// Starts page drivers. Sessions call it once at open and again on every
/// recycle.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn PageDriver>, SessionError>;
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("browser session failed to start: {0}")]
    Launch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// One page at a time, restarted periodically, with a randomized pause.
    #[default]
    Synchronous,
    /// One shared driver, bounded number of pages in flight.
    Concurrent,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub mode: SessionMode,
    /// Restart the driver after this many pages (synchronous mode). Zero
    /// disables recycling.
    pub recycle_every: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Concurrent mode bound.
    pub max_in_flight: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            mode: SessionMode::Synchronous,
            recycle_every: 25,
            min_delay: Duration::from_millis(2_500),
            max_delay: Duration::from_millis(4_500),
            max_in_flight: 4,
        }
    }
}

impl SessionSettings {
    /// Same settings without any inter-page pause.
    pub fn without_delay(mut self) -> Self {
        self.min_delay = Duration::ZERO;
        self.max_delay = Duration::ZERO;
        self
    }

    fn pause(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        Duration::from_millis(fastrand::u64(min..=max))
    }
}

/// A lifecycle-managed page source shared by one stage.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Errors of kind [`FailureKind::SessionFatal`] mean the session is
    /// unusable and the stage must stop.
    async fn fetch_page_content(&self, url: &str) -> Result<String, ItemError>;

    async fn shutdown(&self);

    /// How many items the dispatcher may keep in flight.
    fn max_in_flight(&self) -> usize;
}

/// Opens the session kind selected by `settings.mode`.
pub async fn open_session(
    settings: &SessionSettings,
    factory: Arc<dyn DriverFactory>,
) -> Result<Box<dyn BrowserSession>, SessionError> {
    match settings.mode {
        SessionMode::Synchronous => Ok(Box::new(
            SequentialSession::open(settings.clone(), factory).await?,
        )),
        SessionMode::Concurrent => Ok(Box::new(
            PooledSession::open(settings.clone(), factory).await?,
        )),
    }
}

struct SequentialState {
    driver: Option<Arc<dyn PageDriver>>,
    served: usize,
}

pub struct SequentialSession {
    settings: SessionSettings,
    factory: Arc<dyn DriverFactory>,
    state: Mutex<SequentialState>,
    launches: AtomicUsize,
}

impl SequentialSession {
    pub async fn open(
        settings: SessionSettings,
        factory: Arc<dyn DriverFactory>,
    ) -> Result<Self, SessionError> {
        let driver = factory.launch().await?;
        engine_info!("Browser session started (synchronous)");
        Ok(Self {
            settings,
            factory,
            state: Mutex::new(SequentialState {
                driver: Some(driver),
                served: 0,
            }),
            launches: AtomicUsize::new(1),
        })
    }

    /// Number of driver launches so far, the initial one included.
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    async fn recycle(&self, state: &mut SequentialState) -> Result<(), ItemError> {
        if let Some(driver) = state.driver.take() {
            driver.shutdown().await;
        }
        match self.factory.launch().await {
            Ok(driver) => {
                self.launches.fetch_add(1, Ordering::SeqCst);
                engine_info!("Browser session recycled after {} pages", state.served);
                state.driver = Some(driver);
                Ok(())
            }
            Err(err) => {
                engine_warn!("Browser relaunch failed: {err}");
                Err(ItemError::new(FailureKind::SessionFatal, err.to_string()))
            }
        }
    }
}

#[async_trait]
impl BrowserSession for SequentialSession {
    async fn fetch_page_content(&self, url: &str) -> Result<String, ItemError> {
        let mut state = self.state.lock().await;
        if state.driver.is_none() {
            return Err(ItemError::new(FailureKind::SessionFatal, "no running browser"));
        }
        let every = self.settings.recycle_every;
        if every > 0 && state.served > 0 && state.served % every == 0 {
            self.recycle(&mut state).await?;
        }
        let Some(driver) = state.driver.clone() else {
            return Err(ItemError::new(FailureKind::SessionFatal, "no running browser"));
        };

        let pause = self.settings.pause();
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        state.served += 1;
        driver.fetch_page_content(url).await
    }

    async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let Some(driver) = state.driver.take() {
            driver.shutdown().await;
        }
    }

    fn max_in_flight(&self) -> usize {
        1
    }
}

pub struct PooledSession {
    settings: SessionSettings,
    driver: Arc<dyn PageDriver>,
    permits: Semaphore,
}

impl PooledSession {
    pub async fn open(
        settings: SessionSettings,
        factory: Arc<dyn DriverFactory>,
    ) -> Result<Self, SessionError> {
        let driver = factory.launch().await?;
        let bound = settings.max_in_flight.max(1);
        engine_info!("Browser session started (concurrent, {bound} pages in flight)");
        Ok(Self {
            settings,
            driver,
            permits: Semaphore::new(bound),
        })
    }
}

#[async_trait]
impl BrowserSession for PooledSession {
    async fn fetch_page_content(&self, url: &str) -> Result<String, ItemError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ItemError::new(FailureKind::SessionFatal, "session closed"))?;
        let pause = self.settings.pause();
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        self.driver.fetch_page_content(url).await
    }

    async fn shutdown(&self) {
        self.permits.close();
        self.driver.shutdown().await;
    }

    fn max_in_flight(&self) -> usize {
        self.settings.max_in_flight.max(1)
    }
}
