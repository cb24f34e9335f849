//! Catalog core: pure pipeline data model, progress accounting and run hooks.
mod hooks;
mod item;
mod progress;
mod result;
mod stage;
mod summary;

pub use hooks::{CancelFn, RunHooks};
pub use item::{parse_work_items, select_range, InputError, WorkItem};
pub use progress::{ProgressAggregator, ProgressFn, StageTracker};
pub use result::{ExtractionResult, ProductRow, RowKind};
pub use stage::{Checkpoint, PipelineStage};
pub use summary::{StageReport, StageStatus, Summary};
