use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use catalog_core::{ExtractionResult, RunHooks, WorkItem};
use engine_logging::{engine_info, engine_warn};
use scraper::Html;
use serde::Serialize;

use crate::dispatch::{dispatch_items, Dispatched, StageContext};
use crate::filename::artifact_filename;
use crate::persist::{write_file, AtomicFileWriter, PersistError};
use crate::rules::{description_rules, title_rules, RuleChain};
use crate::session::BrowserSession;
use crate::{ItemError, StageOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompetitorDocument {
    pub title: String,
    /// Description HTML with links already inlined.
    pub body: String,
}

impl CompetitorDocument {
    /// Artifact text: `<h1>{title}</h1>`, a blank line, then the body.
    pub fn render(&self) -> String {
        format!("<h1>{}</h1>\n\n{}", self.title, self.body)
    }
}

#[derive(Debug, Serialize)]
struct RecapRow<'a> {
    identifier: &'a str,
    url: &'a str,
    status: &'a str,
    filename: &'a str,
    title: &'a str,
    reason: &'a str,
}

/// Competitor pages into one text artifact each, plus a recap table.
pub struct CompetitorExecutor {
    artifacts: AtomicFileWriter,
    recap_path: PathBuf,
    title_rules: RuleChain<String>,
    description_rules: RuleChain<String>,
    /// Artifact filename to the identifier that last wrote it.
    claimed: Mutex<HashMap<String, String>>,
}

impl CompetitorExecutor {
    pub fn new(artifacts_dir: impl Into<PathBuf>, recap_path: impl Into<PathBuf>) -> Self {
        Self {
            artifacts: AtomicFileWriter::new(artifacts_dir),
            recap_path: recap_path.into(),
            title_rules: title_rules(),
            description_rules: description_rules(),
            claimed: Mutex::new(HashMap::new()),
        }
    }

    pub fn artifacts_dir(&self) -> &Path {
        self.artifacts.dir()
    }

    pub fn extract(&self, html: &str) -> Result<CompetitorDocument, ItemError> {
        let doc = Html::parse_document(html);
        let title = self
            .title_rules
            .first_match(&doc)
            .ok_or_else(|| ItemError::missing("title"))?;
        let body = self
            .description_rules
            .first_match(&doc)
            .ok_or_else(|| ItemError::missing("description"))?;
        Ok(CompetitorDocument { title, body })
    }

    fn store(
        &self,
        item: &WorkItem,
        document: &CompetitorDocument,
        hooks: &RunHooks,
    ) -> Result<ExtractionResult, ItemError> {
        let filename = artifact_filename(&document.title);
        let previous = match self.claimed.lock() {
            Ok(mut claimed) => claimed.insert(filename.clone(), item.identifier.clone()),
            Err(_) => None,
        };
        if let Some(previous) = previous.filter(|id| *id != item.identifier) {
            hooks.line(format!(
                "[competitors] {} replaces {filename} written for {previous}",
                item.identifier
            ));
        }
        self.artifacts.write(&filename, document.render())?;
        Ok(ExtractionResult::CompetitorDocument {
            identifier: item.identifier.clone(),
            filename,
            title: document.title.clone(),
        })
    }

    pub async fn execute(
        &self,
        items: &[WorkItem],
        seed: BTreeSet<String>,
        session: &dyn BrowserSession,
        ctx: &StageContext<'_>,
    ) -> StageOutcome {
        let Dispatched { outcomes, report } =
            dispatch_items(items, seed, session.max_in_flight(), ctx, |item| async move {
                let html = session.fetch_page_content(&item.source_url).await?;
                let document = self.extract(&html)?;
                self.store(&item, &document, ctx.hooks)
            })
            .await;

        let results: Vec<ExtractionResult> = outcomes
            .into_iter()
            .map(|(item, outcome)| match outcome {
                Ok(result) => result,
                Err(err) => ExtractionResult::failure(&item.identifier, err.to_string()),
            })
            .collect();

        match self.write_recap(items, &results) {
            Ok(path) => engine_info!("Competitor recap -> {}", path.display()),
            Err(err) => engine_warn!("Competitor recap not written: {err}"),
        }
        StageOutcome { report, results }
    }

    fn write_recap(&self, items: &[WorkItem], results: &[ExtractionResult]) -> Result<PathBuf, PersistError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for result in results {
            let url = items
                .iter()
                .find(|i| i.identifier == result.identifier())
                .map(|i| i.source_url.as_str())
                .unwrap_or_default();
            let row = match result {
                ExtractionResult::CompetitorDocument { identifier, filename, title } => RecapRow {
                    identifier,
                    url,
                    status: "ok",
                    filename,
                    title,
                    reason: "",
                },
                ExtractionResult::ExtractionFailure { identifier, reason } => RecapRow {
                    identifier,
                    url,
                    status: "error",
                    filename: "",
                    title: "",
                    reason,
                },
                _ => continue,
            };
            writer
                .serialize(row)
                .map_err(|err| PersistError::Io(std::io::Error::other(err)))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| PersistError::Io(std::io::Error::other(err.to_string())))?;
        write_file(&self.recap_path, bytes)
    }
}
