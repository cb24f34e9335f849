//! Catalog engine: browser sessions, stage executors, outputs and resume.
mod browser;
mod checkpoint;
mod competitors;
mod decode;
mod dedup;
mod dispatch;
mod export;
mod fetch;
mod filename;
mod images;
mod links;
mod persist;
mod pipeline;
mod rules;
mod scheduler;
mod session;
mod types;
mod variants;

pub use browser::{BrowserSettings, ChromiumDriver, ChromiumFactory};
pub use checkpoint::CheckpointStore;
pub use competitors::{CompetitorDocument, CompetitorExecutor};
pub use decode::decode_page;
pub use dedup::{ContentDigest, Deduplicator};
pub use dispatch::{StageContext, StageOutcome};
pub use export::{export_batches, ExportEntry, ExportError, ExportOptions, ExportSummary};
pub use fetch::{FetchSettings, HttpDriverFactory, ReqwestDriver};
pub use filename::{
    artifact_filename, base_sku, clean_name, fold_ascii, folder_name, slugify, variation_sku,
};
pub use image::ImageFormat;
pub use images::{image_title, AssetOutcome, ImageCollector, ImageFilters, ImageReport, SuffixBook};
pub use links::{render_with_inline_links, InlineLink, RenderedFragment};
pub use persist::{ensure_output_dir, persist_new, write_file, AtomicFileWriter, PersistError};
pub use pipeline::{Orchestrator, OutputLayout, PipelineSettings, RunOptions};
pub use rules::{
    description_rules, element_text, gallery_images, page_title, parse_price, price_rules,
    product_name_rules, title_rules, variant_labels, Extractor, Rule, RuleChain,
};
pub use scheduler::{Scheduler, SchedulerError, SchedulerEvent, TaskId};
pub use session::{
    open_session, BrowserSession, DriverFactory, PageDriver, PooledSession, SequentialSession,
    SessionError, SessionMode, SessionSettings,
};
pub use types::{FailureKind, ItemError};
pub use variants::{read_product_table, write_product_table, VariantExecutor, DEFAULT_ATTRIBUTE_NAME};
