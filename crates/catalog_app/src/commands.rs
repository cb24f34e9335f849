use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use catalog_core::{parse_work_items, select_range, PipelineStage, RunHooks, Summary, WorkItem};
use catalog_engine::{
    open_session, ChromiumFactory, DriverFactory, HttpDriverFactory, ImageCollector, ImageReport,
    Orchestrator, ReqwestDriver, RunOptions, Scheduler, SchedulerEvent,
};
use engine_logging::{engine_info, engine_warn, LogFacadeSink};
use tokio::runtime::Runtime;

use crate::settings::{AppSettings, DriverKind};

/// Reads the link list and keeps the inclusive `from..=to` identifier range.
pub fn load_items(
    settings: &AppSettings,
    links: Option<&Path>,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<Vec<WorkItem>> {
    let path = links.unwrap_or(&settings.links_file);
    let text =
        fs::read_to_string(path).with_context(|| format!("reading link list {path:?}"))?;
    let items = parse_work_items(&text).with_context(|| format!("parsing link list {path:?}"))?;
    let selected = select_range(&items, from, to);
    if selected.is_empty() {
        bail!("no work items between {from:?} and {to:?}");
    }
    engine_info!("{} of {} work items selected", selected.len(), items.len());
    Ok(selected)
}

pub fn driver_factory(settings: &AppSettings) -> Arc<dyn DriverFactory> {
    match settings.driver {
        DriverKind::Chromium => Arc::new(ChromiumFactory::new(settings.browser())),
        DriverKind::Http => Arc::new(HttpDriverFactory::new(settings.fetch())),
    }
}

/// Raises the returned flag on the first Ctrl-C; a second one exits.
pub fn watch_ctrl_c(runtime: &Runtime) -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let raised = flag.clone();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        engine_warn!("Interrupt received; finishing items in flight (Ctrl-C again to quit)");
        raised.store(true, Ordering::SeqCst);
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
    flag
}

/// Progress goes to the log in 10% steps, pipeline lines to the log facade.
pub fn run_hooks(cancel: Arc<AtomicBool>) -> RunHooks {
    let last_decile = AtomicU8::new(0);
    RunHooks::silent()
        .with_progress(move |percent| {
            let decile = percent / 10;
            if decile > last_decile.fetch_max(decile, Ordering::SeqCst) {
                engine_info!("Progress {percent}%");
            }
        })
        .with_cancel(move || cancel.load(Ordering::SeqCst))
        .with_log(Arc::new(LogFacadeSink))
}

/// Blocks until a one-shot task named `name` fires after `delay`. Returns
/// `false` when cancelled first.
pub fn wait_for_start(name: &str, delay: Duration, cancel: &AtomicBool) -> Result<bool> {
    let scheduler = Scheduler::start().context("starting scheduler")?;
    let task_id = scheduler.add(name, delay);
    engine_info!("{name} scheduled to start in {}s", delay.as_secs());
    let fired = loop {
        if cancel.load(Ordering::SeqCst) {
            scheduler.remove(task_id);
            break false;
        }
        if let Some(SchedulerEvent::Fired { task_id: id, .. }) =
            scheduler.recv_timeout(Duration::from_millis(250))
        {
            if id == task_id {
                break true;
            }
        }
    };
    scheduler.stop();
    Ok(fired)
}

pub fn run_pipeline(
    runtime: &Runtime,
    settings: &AppSettings,
    items: &[WorkItem],
    stages: &[PipelineStage],
    resume: bool,
    concurrent: bool,
    hooks: &RunHooks,
) -> Summary {
    let stages = if stages.is_empty() {
        PipelineStage::EXECUTABLE.to_vec()
    } else {
        stages.to_vec()
    };
    let orchestrator = Orchestrator::new(settings.pipeline(concurrent), driver_factory(settings));
    runtime.block_on(orchestrator.run(items, &stages, RunOptions { resume }, hooks))
}

pub async fn collect_images(
    settings: &AppSettings,
    items: &[WorkItem],
    concurrent: bool,
    hooks: &RunHooks,
) -> Result<ImageReport> {
    let downloader = ReqwestDriver::new(settings.fetch()).context("building HTTP client")?;
    let mut collector = ImageCollector::new(
        &settings.images.root,
        settings.images.filters()?,
        settings.images.suffix_book(),
        downloader,
    )
    .with_context(|| format!("preparing image folder {:?}", settings.images.root))?;
    engine_info!("{} images already on disk", collector.known_assets());

    let session = open_session(&settings.session(concurrent), driver_factory(settings))
        .await
        .context("opening browser session")?;
    let report = collector.collect(items, session.as_ref(), hooks).await;
    session.shutdown().await;
    Ok(report)
}
