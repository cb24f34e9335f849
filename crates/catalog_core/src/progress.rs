use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

/// Receives a percentage in `0..=100`.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Maps per-stage progress onto one overall bar.
///
/// Each selected stage weighs `1 / stage_count`. The overall value never goes
/// backwards and 100 is reported at most once.
pub struct ProgressAggregator {
    stage_count: usize,
    overall: ProgressFn,
    last: Arc<AtomicU8>,
    full: Arc<AtomicBool>,
}

impl ProgressAggregator {
    pub fn new(stage_count: usize, overall: ProgressFn) -> Self {
        Self {
            stage_count: stage_count.max(1),
            overall,
            last: Arc::new(AtomicU8::new(0)),
            full: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Progress callback for the stage at `index` among the selected stages.
    pub fn stage(&self, index: usize) -> ProgressFn {
        let count = self.stage_count;
        let overall = self.overall.clone();
        let last = self.last.clone();
        let full = self.full.clone();
        Arc::new(move |local: u8| {
            let scaled = (index * 100 + usize::from(local.min(100))) / count;
            emit(&overall, &last, &full, scaled.min(100) as u8);
        })
    }

    /// Settles the overall bar at 100 (completed or cancelled alike).
    pub fn finish(&self) {
        emit(&self.overall, &self.last, &self.full, 100);
    }
}

fn emit(overall: &ProgressFn, last: &AtomicU8, full: &AtomicBool, value: u8) {
    let value = last.fetch_max(value, Ordering::SeqCst).max(value);
    if value == 100 && full.swap(true, Ordering::SeqCst) {
        return;
    }
    overall(value);
}

/// Per-stage item counter.
///
/// Reports after every concluded item and reaches 100 exactly once, through
/// [`StageTracker::settle`] or through the last item.
pub struct StageTracker {
    total: usize,
    done: AtomicUsize,
    settled: AtomicBool,
    progress: ProgressFn,
}

impl StageTracker {
    pub fn new(total: usize, progress: ProgressFn) -> Self {
        Self {
            total,
            done: AtomicUsize::new(0),
            settled: AtomicBool::new(false),
            progress,
        }
    }

    pub fn item_done(&self) {
        if self.settled.load(Ordering::SeqCst) {
            return;
        }
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        if self.total == 0 || done >= self.total {
            self.settle();
            return;
        }
        (self.progress)((done * 100 / self.total) as u8);
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }

    pub fn settle(&self) {
        if !self.settled.swap(true, Ordering::SeqCst) {
            (self.progress)(100);
        }
    }
}
