use std::collections::BTreeMap;

/// One catalog entry processed by every selected stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    pub identifier: String,
    pub source_url: String,
}

impl WorkItem {
    pub fn new(identifier: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            source_url: source_url.into(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InputError {
    #[error("no `IDENTIFIER URL` pair found in input list")]
    Empty,
}

/// Parses a link list of `IDENTIFIER URL` lines.
///
/// Identifiers are upper-cased, a repeated identifier keeps its last URL, and
/// the result is ordered by the first number embedded in each identifier.
/// Identifiers without digits go last, ordered by name.
pub fn parse_work_items(text: &str) -> Result<Vec<WorkItem>, InputError> {
    let mut by_id: BTreeMap<String, String> = BTreeMap::new();
    for line in text.lines() {
        let Some((id, url)) = line.trim().split_once(char::is_whitespace) else {
            continue;
        };
        let url = url.trim();
        if id.is_empty() || url.is_empty() {
            continue;
        }
        by_id.insert(id.to_uppercase(), url.to_string());
    }
    if by_id.is_empty() {
        return Err(InputError::Empty);
    }

    let mut items: Vec<WorkItem> = by_id
        .into_iter()
        .map(|(identifier, source_url)| WorkItem {
            identifier,
            source_url,
        })
        .collect();
    items.sort_by(|a, b| {
        let ka = (leading_number(&a.identifier).is_none(), leading_number(&a.identifier));
        let kb = (leading_number(&b.identifier).is_none(), leading_number(&b.identifier));
        ka.cmp(&kb).then_with(|| a.identifier.cmp(&b.identifier))
    });
    Ok(items)
}

/// Inclusive slice between two identifiers. Unknown or absent bounds fall back
/// to the start/end of the list.
pub fn select_range(items: &[WorkItem], start: Option<&str>, end: Option<&str>) -> Vec<WorkItem> {
    if items.is_empty() {
        return Vec::new();
    }
    let position = |id: Option<&str>| {
        id.map(str::trim)
            .filter(|id| !id.is_empty())
            .and_then(|id| {
                let wanted = id.to_uppercase();
                items.iter().position(|item| item.identifier == wanted)
            })
    };
    let from = position(start).unwrap_or(0);
    let to = position(end).unwrap_or(items.len() - 1);
    if from > to {
        return Vec::new();
    }
    items[from..=to].to_vec()
}

fn leading_number(identifier: &str) -> Option<u64> {
    let digits: String = identifier
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}
