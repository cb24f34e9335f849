use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use catalog_core::{Checkpoint, PipelineStage};
use engine_logging::{engine_debug, engine_warn};
use serde::{Deserialize, Serialize};

use crate::persist::{write_file, PersistError};

/// On-disk shape: `{"step": "<stage>", "processed": ["A1", ...]}`.
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointRecord {
    step: String,
    #[serde(default)]
    processed: Vec<String>,
}

/// Durable resume record, rewritten atomically after every concluded item.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Absent, unreadable or malformed records all mean "no checkpoint".
    pub fn load(&self) -> Option<Checkpoint> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                engine_warn!("Checkpoint {} unreadable: {err}", self.path.display());
                return None;
            }
        };
        let record: CheckpointRecord = match serde_json::from_str(&text) {
            Ok(record) => record,
            Err(err) => {
                engine_warn!("Checkpoint {} is corrupt, ignoring: {err}", self.path.display());
                return None;
            }
        };
        let Some(stage) = PipelineStage::parse(&record.step) else {
            engine_warn!("Checkpoint names unknown step `{}`, ignoring", record.step);
            return None;
        };
        Some(Checkpoint {
            stage,
            processed_ids: record.processed.into_iter().collect(),
        })
    }

    pub fn save(&self, stage: PipelineStage, processed: &BTreeSet<String>) -> Result<(), PersistError> {
        let record = CheckpointRecord {
            step: stage.as_str().to_string(),
            processed: processed.iter().cloned().collect(),
        };
        let json = serde_json::to_string(&record)
            .map_err(|err| PersistError::Io(io::Error::other(err)))?;
        write_file(&self.path, json)?;
        engine_debug!("Checkpoint saved: {stage} ({} processed)", processed.len());
        Ok(())
    }

    pub fn clear(&self) -> Result<(), PersistError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
