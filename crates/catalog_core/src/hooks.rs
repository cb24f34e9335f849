use std::sync::Arc;

use engine_logging::{engine_debug, LogSink, NullSink};

use crate::ProgressFn;

/// Zero-argument cancellation predicate, polled cooperatively.
pub type CancelFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// The narrow surface a host (desktop shell, CLI) hands to a run.
#[derive(Clone)]
pub struct RunHooks {
    pub progress: ProgressFn,
    pub cancel: CancelFn,
    pub log: Arc<dyn LogSink>,
}

impl RunHooks {
    /// No progress reporting, never cancelled, lines discarded.
    pub fn silent() -> Self {
        Self {
            progress: Arc::new(|_| {}),
            cancel: Arc::new(|| false),
            log: Arc::new(NullSink),
        }
    }

    pub fn with_progress(mut self, progress: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.progress = Arc::new(progress);
        self
    }

    pub fn with_cancel(mut self, cancel: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.cancel = Arc::new(cancel);
        self
    }

    pub fn with_log(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = log;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        (self.cancel)()
    }

    /// Writes one line to the host sink.
    pub fn line(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        engine_debug!("{line}");
        self.log.line(line);
    }
}

impl Default for RunHooks {
    fn default() -> Self {
        Self::silent()
    }
}

impl std::fmt::Debug for RunHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHooks").finish_non_exhaustive()
    }
}
