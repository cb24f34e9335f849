use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use catalog_core::{ExtractionResult, ProductRow, RowKind, StageStatus, WorkItem};
use engine_logging::{engine_info, engine_warn};
use scraper::Html;
use serde::{Deserialize, Serialize};

use crate::dispatch::{dispatch_items, Dispatched, StageContext};
use crate::filename::{base_sku, folder_name, variation_sku};
use crate::persist::{write_file, PersistError};
use crate::rules::{price_rules, product_name_rules, variant_labels, RuleChain};
use crate::session::BrowserSession;
use crate::{ItemError, StageOutcome};

pub const DEFAULT_ATTRIBUTE_NAME: &str = "Couleur";

/// CSV shape of one product table row.
#[derive(Debug, Serialize, Deserialize)]
struct TableRow {
    identifier: String,
    #[serde(rename = "type")]
    kind: String,
    sku: String,
    name: String,
    parent: String,
    attribute_name: String,
    attribute_values: String,
    attribute_default: String,
    price: String,
    folder: String,
}

impl From<&ProductRow> for TableRow {
    fn from(row: &ProductRow) -> Self {
        Self {
            identifier: row.identifier.clone(),
            kind: row.kind.as_str().to_string(),
            sku: row.sku.clone(),
            name: row.name.clone(),
            parent: row.parent.clone(),
            attribute_name: row.attribute_name.clone(),
            attribute_values: row.attribute_values.clone(),
            attribute_default: row.attribute_default.clone(),
            price: row.price.clone(),
            folder: row.folder.clone(),
        }
    }
}

impl TableRow {
    fn into_product_row(self) -> Option<ProductRow> {
        Some(ProductRow {
            kind: RowKind::parse(&self.kind)?,
            identifier: self.identifier,
            sku: self.sku,
            name: self.name,
            parent: self.parent,
            attribute_name: self.attribute_name,
            attribute_values: self.attribute_values,
            attribute_default: self.attribute_default,
            price: self.price,
            folder: self.folder,
        })
    }
}

/// Writes the product table atomically.
pub fn write_product_table(path: &Path, rows: &[ProductRow]) -> Result<PathBuf, PersistError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(TableRow::from(row))
            .map_err(|err| PersistError::Io(std::io::Error::other(err)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| PersistError::Io(std::io::Error::other(err.to_string())))?;
    write_file(path, bytes)
}

/// Reads a product table; a missing file is an empty table.
pub fn read_product_table(path: &Path) -> Result<Vec<ProductRow>, csv::Error> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize::<TableRow>() {
        match record?.into_product_row() {
            Some(row) => rows.push(row),
            None => engine_warn!("Skipping product row with unknown type in {}", path.display()),
        }
    }
    Ok(rows)
}

/// Product name, price and colour variants into one tabular row set.
pub struct VariantExecutor {
    table_path: PathBuf,
    attribute_name: String,
    name_rules: RuleChain<String>,
    price_rules: RuleChain<String>,
}

impl VariantExecutor {
    pub fn new(table_path: impl Into<PathBuf>) -> Self {
        Self {
            table_path: table_path.into(),
            attribute_name: DEFAULT_ATTRIBUTE_NAME.to_string(),
            name_rules: product_name_rules(),
            price_rules: price_rules(),
        }
    }

    pub fn with_attribute_name(mut self, name: impl Into<String>) -> Self {
        self.attribute_name = name.into();
        self
    }

    pub fn table_path(&self) -> &Path {
        &self.table_path
    }

    /// Pure extraction from rendered HTML.
    ///
    /// Zero or one swatch gives a simple product. Otherwise one variable
    /// parent without a price plus one unnamed variation per swatch, each
    /// carrying the product price.
    pub fn extract(&self, item: &WorkItem, html: &str) -> Result<ExtractionResult, ItemError> {
        let doc = Html::parse_document(html);
        let name = self
            .name_rules
            .first_match(&doc)
            .ok_or_else(|| ItemError::missing("product name"))?;
        let price = self.price_rules.first_match(&doc).unwrap_or_default();
        let labels = variant_labels(&doc);

        let sku = base_sku(&name);
        let folder = folder_name(&name);
        let row = |kind, sku: String, parent: String| ProductRow {
            identifier: item.identifier.clone(),
            kind,
            sku,
            name: name.clone(),
            parent,
            attribute_name: String::new(),
            attribute_values: String::new(),
            attribute_default: String::new(),
            price: price.clone(),
            folder: folder.clone(),
        };

        if labels.len() <= 1 {
            return Ok(ExtractionResult::SimpleProduct(row(RowKind::Simple, sku, String::new())));
        }

        let mut parent = row(RowKind::Variable, sku.clone(), String::new());
        parent.price = String::new();
        parent.attribute_name = self.attribute_name.clone();
        parent.attribute_values = labels.join(" | ");
        parent.attribute_default = labels[0].clone();
        let variations = labels
            .iter()
            .map(|label| {
                let mut variation = row(RowKind::Variation, variation_sku(&sku, label), sku.clone());
                variation.name = String::new();
                variation.attribute_name = self.attribute_name.clone();
                variation.attribute_values = label.clone();
                variation
            })
            .collect();
        Ok(ExtractionResult::VariableProduct { parent, variations })
    }

    /// Runs over `items`, skipping `seed`. The table always holds every row
    /// produced so far, in input order, rows from an earlier run included.
    pub async fn execute(
        &self,
        items: &[WorkItem],
        seed: BTreeSet<String>,
        session: &dyn BrowserSession,
        ctx: &StageContext<'_>,
    ) -> StageOutcome {
        let carried = self.carried_rows(&seed);
        let Dispatched { outcomes, mut report } =
            dispatch_items(items, seed, session.max_in_flight(), ctx, |item| async move {
                let html = session.fetch_page_content(&item.source_url).await?;
                self.extract(&item, &html)
            })
            .await;

        let mut by_id: HashMap<String, Vec<ProductRow>> = carried;
        let mut results = Vec::with_capacity(outcomes.len());
        for (item, outcome) in outcomes {
            let result = match outcome {
                Ok(result) => {
                    let rows = result.rows().into_iter().cloned().collect();
                    by_id.insert(item.identifier.clone(), rows);
                    result
                }
                Err(err) => ExtractionResult::failure(&item.identifier, err.to_string()),
            };
            results.push(result);
        }
        let rows: Vec<ProductRow> = items
            .iter()
            .filter_map(|item| by_id.remove(&item.identifier))
            .flatten()
            .collect();

        match write_product_table(&self.table_path, &rows) {
            Ok(path) => engine_info!("Product table: {} rows -> {}", rows.len(), path.display()),
            Err(err) => {
                ctx.hooks.line(format!("[variants] product table not written: {err}"));
                report.status = StageStatus::Aborted;
            }
        }
        StageOutcome { report, results }
    }

    fn carried_rows(&self, seed: &BTreeSet<String>) -> HashMap<String, Vec<ProductRow>> {
        let mut carried: HashMap<String, Vec<ProductRow>> = HashMap::new();
        if seed.is_empty() {
            return carried;
        }
        match read_product_table(&self.table_path) {
            Ok(rows) => {
                for row in rows.into_iter().filter(|r| seed.contains(&r.identifier)) {
                    carried.entry(row.identifier.clone()).or_default().push(row);
                }
            }
            Err(err) => engine_warn!("Earlier product table unreadable: {err}"),
        }
        carried
    }
}
