use std::collections::BTreeSet;
use std::fmt;

/// Pipeline position. Variants, competitors and export always run in this
/// order; `Done` marks a pipeline with nothing left to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineStage {
    Variants,
    Competitors,
    Export,
    Done,
}

impl PipelineStage {
    /// The three executable stages in their fixed order.
    pub const EXECUTABLE: [PipelineStage; 3] = [
        PipelineStage::Variants,
        PipelineStage::Competitors,
        PipelineStage::Export,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Variants => "variants",
            PipelineStage::Competitors => "competitors",
            PipelineStage::Export => "export",
            PipelineStage::Done => "done",
        }
    }

    pub fn parse(step: &str) -> Option<Self> {
        match step.trim() {
            "variants" => Some(PipelineStage::Variants),
            "competitors" => Some(PipelineStage::Competitors),
            "export" => Some(PipelineStage::Export),
            "done" => Some(PipelineStage::Done),
            _ => None,
        }
    }

    pub fn next(self) -> Self {
        match self {
            PipelineStage::Variants => PipelineStage::Competitors,
            PipelineStage::Competitors => PipelineStage::Export,
            PipelineStage::Export | PipelineStage::Done => PipelineStage::Done,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resume record: the stage in progress and the identifiers it has already
/// concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub stage: PipelineStage,
    pub processed_ids: BTreeSet<String>,
}

impl Checkpoint {
    pub fn fresh(stage: PipelineStage) -> Self {
        Self {
            stage,
            processed_ids: BTreeSet::new(),
        }
    }

    /// Whether `stage` was fully finished before this checkpoint was taken.
    pub fn completed(&self, stage: PipelineStage) -> bool {
        stage < self.stage
    }

    /// Identifiers to skip when `stage` is (re)entered.
    pub fn seed_for(&self, stage: PipelineStage) -> BTreeSet<String> {
        if stage == self.stage {
            self.processed_ids.clone()
        } else {
            BTreeSet::new()
        }
    }
}
