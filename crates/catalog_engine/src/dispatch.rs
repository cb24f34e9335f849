use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use catalog_core::{
    ExtractionResult, PipelineStage, ProgressFn, RunHooks, StageReport, StageStatus, StageTracker,
    WorkItem,
};
use engine_logging::{engine_info, engine_warn};
use futures_util::stream::{self, StreamExt};

use crate::checkpoint::CheckpointStore;
use crate::ItemError;

/// What a stage executor needs from the surrounding run.
#[derive(Clone)]
pub struct StageContext<'a> {
    pub stage: PipelineStage,
    pub store: Option<&'a CheckpointStore>,
    pub hooks: &'a RunHooks,
    pub progress: ProgressFn,
}

impl<'a> StageContext<'a> {
    pub fn new(stage: PipelineStage, hooks: &'a RunHooks) -> Self {
        Self {
            stage,
            store: None,
            hooks,
            progress: hooks.progress.clone(),
        }
    }

    pub fn with_store(mut self, store: &'a CheckpointStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = progress;
        self
    }
}

/// What a stage executor hands back: its report plus one result per item it
/// concluded, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub report: StageReport,
    pub results: Vec<ExtractionResult>,
}

pub(crate) struct Dispatched<T> {
    /// Concluded items in input order, seeded ones excluded.
    pub outcomes: Vec<(WorkItem, Result<T, ItemError>)>,
    pub report: StageReport,
}

enum Step<T> {
    Skipped,
    Concluded(Result<T, ItemError>),
}

/// Runs `work` over every item not in `seed`, at most `in_flight` at once.
///
/// Cancellation is polled before each item starts. Each concluded item is
/// added to the processed set and checkpointed right away. A session-fatal
/// error stops dispatch; it and every item not yet concluded count as errors
/// and stay unprocessed.
pub(crate) async fn dispatch_items<T, F, Fut>(
    items: &[WorkItem],
    seed: BTreeSet<String>,
    in_flight: usize,
    ctx: &StageContext<'_>,
    work: F,
) -> Dispatched<T>
where
    F: Fn(WorkItem) -> Fut,
    Fut: Future<Output = Result<T, ItemError>>,
{
    let pending: Vec<(usize, WorkItem)> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| !seed.contains(&item.identifier))
        .map(|(index, item)| (index, item.clone()))
        .collect();
    let tracker = StageTracker::new(pending.len(), ctx.progress.clone());
    let fatal = AtomicBool::new(false);
    let cancelled = AtomicBool::new(false);
    let mut processed = seed;
    let mut slots: Vec<Option<(WorkItem, Result<T, ItemError>)>> =
        std::iter::repeat_with(|| None).take(items.len()).collect();
    let mut ok_count = 0;
    let mut error_count = 0;

    let stage = ctx.stage;
    let hooks = ctx.hooks;
    let mut results = stream::iter(pending)
        .map(|(index, item)| {
            let work = &work;
            let fatal = &fatal;
            let cancelled = &cancelled;
            async move {
                if fatal.load(Ordering::SeqCst) {
                    return (index, item, Step::Skipped);
                }
                if cancelled.load(Ordering::SeqCst) || hooks.is_cancelled() {
                    cancelled.store(true, Ordering::SeqCst);
                    return (index, item, Step::Skipped);
                }
                let outcome = work(item.clone()).await;
                (index, item, Step::Concluded(outcome))
            }
        })
        .buffer_unordered(in_flight.max(1));

    while let Some((index, item, step)) = results.next().await {
        let outcome = match step {
            Step::Skipped => {
                if fatal.load(Ordering::SeqCst) {
                    error_count += 1;
                }
                continue;
            }
            Step::Concluded(Err(err)) if err.is_session_fatal() => {
                if !fatal.swap(true, Ordering::SeqCst) {
                    hooks.line(format!("[{stage}] browser session lost at {}: {err}", item.identifier));
                }
                error_count += 1;
                continue;
            }
            Step::Concluded(outcome) => outcome,
        };

        match &outcome {
            Ok(_) => ok_count += 1,
            Err(err) => {
                error_count += 1;
                hooks.line(format!("[{stage}] {} failed: {err}", item.identifier));
            }
        }
        processed.insert(item.identifier.clone());
        if let Some(store) = ctx.store {
            if let Err(err) = store.save(stage, &processed) {
                engine_warn!("Checkpoint save failed after {}: {err}", item.identifier);
            }
        }
        tracker.item_done();
        slots[index] = Some((item, outcome));
    }
    drop(results);
    tracker.settle();

    let status = if fatal.load(Ordering::SeqCst) {
        StageStatus::Aborted
    } else if cancelled.load(Ordering::SeqCst) {
        hooks.line(format!("[{stage}] cancelled after {} items", ok_count + error_count));
        StageStatus::Cancelled
    } else {
        StageStatus::Completed
    };
    engine_info!("Stage {stage}: {ok_count} ok, {error_count} errors ({status:?})");

    Dispatched {
        outcomes: slots.into_iter().flatten().collect(),
        report: StageReport {
            stage,
            ok_count,
            error_count,
            status,
        },
    }
}
