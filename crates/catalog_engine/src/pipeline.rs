use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use catalog_core::{
    Checkpoint, PipelineStage, ProgressAggregator, ProgressFn, RunHooks, StageReport, StageStatus,
    Summary, WorkItem,
};
use engine_logging::{engine_info, engine_warn};

use crate::checkpoint::CheckpointStore;
use crate::competitors::CompetitorExecutor;
use crate::dispatch::StageContext;
use crate::export::{export_batches, ExportOptions};
use crate::session::{open_session, DriverFactory, SessionError, SessionSettings};
use crate::variants::VariantExecutor;

/// Where a run reads and writes, relative to one results root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn descriptions_dir(&self) -> PathBuf {
        self.root.join("descriptions")
    }

    pub fn json_dir(&self) -> PathBuf {
        self.root.join("json")
    }

    pub fn tables_dir(&self) -> PathBuf {
        self.root.join("xlsx")
    }

    pub fn product_table(&self) -> PathBuf {
        self.tables_dir().join("products.csv")
    }

    pub fn recap_table(&self) -> PathBuf {
        self.tables_dir().join("competitors_recap.csv")
    }

    pub fn checkpoint(&self) -> PathBuf {
        self.root.join("checkpoint.json")
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub layout: OutputLayout,
    pub session: SessionSettings,
    pub export: ExportOptions,
    pub attribute_name: String,
}

impl PipelineSettings {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            layout: OutputLayout::new(output_root),
            session: SessionSettings::default(),
            export: ExportOptions::default(),
            attribute_name: crate::variants::DEFAULT_ATTRIBUTE_NAME.to_string(),
        }
    }

    pub fn with_session(mut self, session: SessionSettings) -> Self {
        self.session = session;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Continue from the checkpoint when one exists.
    pub resume: bool,
}

/// Runs the selected stages in their fixed order over one WorkItem list.
pub struct Orchestrator {
    settings: PipelineSettings,
    factory: Arc<dyn DriverFactory>,
    store: CheckpointStore,
}

impl Orchestrator {
    pub fn new(settings: PipelineSettings, factory: Arc<dyn DriverFactory>) -> Self {
        let store = CheckpointStore::new(settings.layout.checkpoint());
        Self {
            settings,
            factory,
            store,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn checkpoint_store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Without `resume`, or without a usable checkpoint, every selected
    /// stage starts from scratch. A stage that ends cancelled or aborted
    /// stops the run; later stages are reported as skipped and the
    /// checkpoint is kept for the next resume.
    pub async fn run(
        &self,
        items: &[WorkItem],
        stages: &[PipelineStage],
        options: RunOptions,
        hooks: &RunHooks,
    ) -> Summary {
        let selected: Vec<PipelineStage> = PipelineStage::EXECUTABLE
            .into_iter()
            .filter(|s| stages.contains(s))
            .collect();
        let aggregator = ProgressAggregator::new(selected.len(), hooks.progress.clone());
        let checkpoint = self.starting_checkpoint(&selected, options, hooks);

        let mut summary = Summary::default();
        let mut halted = false;
        for (index, &stage) in selected.iter().enumerate() {
            let progress = aggregator.stage(index);
            if halted {
                summary.stages.push(StageReport::skipped(stage));
                continue;
            }
            if checkpoint.completed(stage) {
                hooks.line(format!("[{stage}] already completed, skipping"));
                progress(100);
                summary.stages.push(StageReport::skipped(stage));
                continue;
            }

            let seed = checkpoint.seed_for(stage);
            hooks.line(format!("[{stage}] started ({} already processed)", seed.len()));
            let report = match stage {
                PipelineStage::Variants | PipelineStage::Competitors => {
                    self.run_browser_stage(stage, items, seed, progress, hooks).await
                }
                PipelineStage::Export => self.run_export(progress, hooks),
                PipelineStage::Done => StageReport::skipped(stage),
            };
            hooks.line(format!("[{stage}] finished: {}", report.line()));

            if report.status == StageStatus::Completed {
                self.save(stage.next(), &BTreeSet::new());
            } else {
                halted = true;
            }
            summary.stages.push(report);
        }

        if !halted {
            if let Err(err) = self.store.clear() {
                engine_warn!("Checkpoint not cleared: {err}");
            }
        }
        aggregator.finish();
        engine_info!("Run finished\n{}", summary.report());
        summary
    }

    fn starting_checkpoint(
        &self,
        selected: &[PipelineStage],
        options: RunOptions,
        hooks: &RunHooks,
    ) -> Checkpoint {
        if options.resume {
            if let Some(checkpoint) = self.store.load() {
                hooks.line(format!(
                    "Resuming at {} ({} processed)",
                    checkpoint.stage,
                    checkpoint.processed_ids.len()
                ));
                return checkpoint;
            }
            hooks.line("No usable checkpoint, starting fresh");
        }
        let first = selected.first().copied().unwrap_or(PipelineStage::Done);
        self.save(first, &BTreeSet::new());
        Checkpoint::fresh(first)
    }

    fn save(&self, stage: PipelineStage, processed: &BTreeSet<String>) {
        if let Err(err) = self.store.save(stage, processed) {
            engine_warn!("Checkpoint save failed: {err}");
        }
    }

    async fn run_browser_stage(
        &self,
        stage: PipelineStage,
        items: &[WorkItem],
        seed: BTreeSet<String>,
        progress: ProgressFn,
        hooks: &RunHooks,
    ) -> StageReport {
        let session = match open_session(&self.settings.session, self.factory.clone()).await {
            Ok(session) => session,
            Err(err) => return unopened(stage, items, &seed, progress, hooks, err),
        };
        let ctx = StageContext::new(stage, hooks)
            .with_store(&self.store)
            .with_progress(progress);
        let layout = &self.settings.layout;
        let outcome = match stage {
            PipelineStage::Variants => {
                VariantExecutor::new(layout.product_table())
                    .with_attribute_name(self.settings.attribute_name.clone())
                    .execute(items, seed, session.as_ref(), &ctx)
                    .await
            }
            _ => {
                CompetitorExecutor::new(layout.descriptions_dir(), layout.recap_table())
                    .execute(items, seed, session.as_ref(), &ctx)
                    .await
            }
        };
        session.shutdown().await;
        outcome.report
    }

    fn run_export(&self, progress: ProgressFn, hooks: &RunHooks) -> StageReport {
        let layout = &self.settings.layout;
        match export_batches(
            &layout.descriptions_dir(),
            &layout.json_dir(),
            &self.settings.export,
            hooks,
            progress.clone(),
        ) {
            Ok(summary) => StageReport {
                stage: PipelineStage::Export,
                ok_count: summary.entry_count,
                error_count: summary.error_count,
                status: if summary.cancelled {
                    StageStatus::Cancelled
                } else {
                    StageStatus::Completed
                },
            },
            Err(err) => {
                hooks.line(format!("[export] failed: {err}"));
                progress(100);
                StageReport {
                    stage: PipelineStage::Export,
                    ok_count: 0,
                    error_count: 1,
                    status: StageStatus::Aborted,
                }
            }
        }
    }
}

/// The session never started: every pending item is an error and stays
/// unprocessed.
fn unopened(
    stage: PipelineStage,
    items: &[WorkItem],
    seed: &BTreeSet<String>,
    progress: ProgressFn,
    hooks: &RunHooks,
    err: SessionError,
) -> StageReport {
    hooks.line(format!("[{stage}] aborted: {err}"));
    progress(100);
    StageReport {
        stage,
        ok_count: 0,
        error_count: items.iter().filter(|i| !seed.contains(&i.identifier)).count(),
        status: StageStatus::Aborted,
    }
}
