/// Tag written in the type column of the product table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Simple,
    Variable,
    Variation,
}

impl RowKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RowKind::Simple => "simple",
            RowKind::Variable => "variable",
            RowKind::Variation => "variation",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "simple" => Some(RowKind::Simple),
            "variable" => Some(RowKind::Variable),
            "variation" => Some(RowKind::Variation),
            _ => None,
        }
    }
}

/// One line of the product table: a (WorkItem, variant) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRow {
    pub identifier: String,
    pub kind: RowKind,
    pub sku: String,
    pub name: String,
    pub parent: String,
    pub attribute_name: String,
    pub attribute_values: String,
    pub attribute_default: String,
    pub price: String,
    pub folder: String,
}

/// Outcome of one WorkItem in one stage. Exactly one per item per stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionResult {
    SimpleProduct(ProductRow),
    VariableProduct {
        parent: ProductRow,
        variations: Vec<ProductRow>,
    },
    CompetitorDocument {
        identifier: String,
        filename: String,
        title: String,
    },
    ExtractionFailure {
        identifier: String,
        reason: String,
    },
}

impl ExtractionResult {
    pub fn failure(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        ExtractionResult::ExtractionFailure {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    pub fn identifier(&self) -> &str {
        match self {
            ExtractionResult::SimpleProduct(row) => &row.identifier,
            ExtractionResult::VariableProduct { parent, .. } => &parent.identifier,
            ExtractionResult::CompetitorDocument { identifier, .. }
            | ExtractionResult::ExtractionFailure { identifier, .. } => identifier,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ExtractionResult::ExtractionFailure { .. })
    }

    /// Table rows carried by a product result, parent first.
    pub fn rows(&self) -> Vec<&ProductRow> {
        match self {
            ExtractionResult::SimpleProduct(row) => vec![row],
            ExtractionResult::VariableProduct { parent, variations } => {
                std::iter::once(parent).chain(variations.iter()).collect()
            }
            _ => Vec::new(),
        }
    }
}
