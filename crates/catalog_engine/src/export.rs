use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use catalog_core::{ProgressFn, RunHooks, StageTracker};
use engine_logging::{engine_info, engine_warn};
use regex::Regex;
use serde::Serialize;

use crate::persist::{ensure_output_dir, AtomicFileWriter, PersistError};

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").expect("static heading pattern"));
static BATCH_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^batch_(\d+)\.json$").expect("static batch pattern"));

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub batch_size: usize,
    /// Extension of the artifacts picked up from the source directory.
    pub artifact_extension: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            artifact_extension: "txt".to_string(),
        }
    }
}

/// One entry of a batch file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportEntry {
    pub id: u64,
    pub id_source: String,
    pub nom: String,
    pub h1: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub entry_count: usize,
    pub error_count: usize,
    pub batches: Vec<PathBuf>,
    pub cancelled: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Regroups every artifact of `source_dir` into `batch_<n>.json` files.
///
/// Artifacts are visited in filename order and numbered from 1; unreadable
/// ones are counted as errors and take no id. A run over the same artifacts
/// always produces the same batches, and batch files beyond the new count
/// are removed.
pub fn export_batches(
    source_dir: &Path,
    output_dir: &Path,
    options: &ExportOptions,
    hooks: &RunHooks,
    progress: ProgressFn,
) -> Result<ExportSummary, ExportError> {
    ensure_output_dir(output_dir)?;
    let artifacts = list_artifacts(source_dir, &options.artifact_extension)?;
    let tracker = StageTracker::new(artifacts.len(), progress);
    let writer = AtomicFileWriter::new(output_dir);
    let batch_size = options.batch_size.max(1);

    let mut summary = ExportSummary {
        entry_count: 0,
        error_count: 0,
        batches: Vec::new(),
        cancelled: false,
    };
    let mut pending: Vec<ExportEntry> = Vec::with_capacity(batch_size);
    for path in &artifacts {
        if hooks.is_cancelled() {
            summary.cancelled = true;
            break;
        }
        match read_entry(path, summary.entry_count as u64 + 1) {
            Ok(entry) => {
                summary.entry_count += 1;
                pending.push(entry);
                if pending.len() == batch_size {
                    summary.batches.push(flush(&writer, &summary, &mut pending)?);
                }
            }
            Err(err) => {
                summary.error_count += 1;
                hooks.line(format!("[export] {} unreadable: {err}", path.display()));
            }
        }
        tracker.item_done();
    }
    if !pending.is_empty() {
        summary.batches.push(flush(&writer, &summary, &mut pending)?);
    }
    tracker.settle();

    if !summary.cancelled {
        remove_stale_batches(output_dir, summary.batches.len());
    }
    engine_info!(
        "Export: {} entries in {} batches, {} errors",
        summary.entry_count,
        summary.batches.len(),
        summary.error_count
    );
    Ok(summary)
}

fn list_artifacts(source_dir: &Path, extension: &str) -> Result<Vec<PathBuf>, ExportError> {
    if !source_dir.exists() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<PathBuf> = fs::read_dir(source_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some(extension))
        .collect();
    paths.sort();
    Ok(paths)
}

fn read_entry(path: &Path, id: u64) -> Result<ExportEntry, std::io::Error> {
    let html = fs::read_to_string(path)?;
    let h1 = HEADING
        .captures(&html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    let name = |part: Option<&std::ffi::OsStr>| {
        part.map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    Ok(ExportEntry {
        id,
        id_source: name(path.file_stem()),
        nom: name(path.file_name()),
        h1,
        html: html.trim().to_string(),
    })
}

fn flush(
    writer: &AtomicFileWriter,
    summary: &ExportSummary,
    pending: &mut Vec<ExportEntry>,
) -> Result<PathBuf, ExportError> {
    let number = summary.batches.len() + 1;
    let json = serde_json::to_string_pretty(pending)?;
    let path = writer.write(&format!("batch_{number}.json"), json)?;
    pending.clear();
    Ok(path)
}

fn remove_stale_batches(output_dir: &Path, keep: usize) {
    let Ok(entries) = fs::read_dir(output_dir) else {
        return;
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(number) = BATCH_FILE
            .captures(&name)
            .and_then(|c| c[1].parse::<usize>().ok())
        else {
            continue;
        };
        if number > keep {
            if let Err(err) = fs::remove_file(entry.path()) {
                engine_warn!("Stale batch {name} not removed: {err}");
            }
        }
    }
}
