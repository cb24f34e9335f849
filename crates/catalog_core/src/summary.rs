use crate::PipelineStage;

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Completed,
    /// Cancellation was observed; work already done was flushed.
    Cancelled,
    /// The browser session could not be started or restarted.
    Aborted,
    /// Finished by an earlier run, or never reached.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: PipelineStage,
    pub ok_count: usize,
    pub error_count: usize,
    pub status: StageStatus,
}

impl StageReport {
    pub fn skipped(stage: PipelineStage) -> Self {
        Self {
            stage,
            ok_count: 0,
            error_count: 0,
            status: StageStatus::Skipped,
        }
    }

    pub fn line(&self) -> String {
        let suffix = match self.status {
            StageStatus::Completed => "",
            StageStatus::Cancelled => " (cancelled)",
            StageStatus::Aborted => " (aborted)",
            StageStatus::Skipped => " (skipped)",
        };
        format!(
            "{}: {} ok, {} errors{}",
            self.stage, self.ok_count, self.error_count, suffix
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Summary {
    pub stages: Vec<StageReport>,
}

impl Summary {
    pub fn stage(&self, stage: PipelineStage) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    /// True when some stage stopped early (cancelled or aborted).
    pub fn interrupted(&self) -> bool {
        self.stages
            .iter()
            .any(|r| matches!(r.status, StageStatus::Cancelled | StageStatus::Aborted))
    }

    pub fn total_errors(&self) -> usize {
        self.stages.iter().map(|r| r.error_count).sum()
    }

    /// Combined human-readable report, one line per selected stage.
    pub fn report(&self) -> String {
        self.stages
            .iter()
            .map(StageReport::line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
