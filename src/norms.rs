//! Category norms loading and parsing
//!
//! The norms export is a flat spreadsheet. A numbered category header
//! ("12. A precious stone") is followed by one row per human response,
//! and a response spelled several ways continues on rows whose first
//! cell starts with a non-breaking space.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::error::{NormsError, Result};

/// Separator between the category number and the category name
pub const CATEGORY_SEPARATOR: &str = ". ";

/// First character of a row that continues the previous response
pub const CONTINUATION_MARKER: char = '\u{a0}';

/// Column title repeated under every category header by the export
pub const HEADER_ARTIFACT: &str = "Response";

/// Marks a response whose singular and plural are both accepted
pub const PLURAL_MARKER: &str = "(s)";

/// A single cell of the source table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    /// Interpret a raw CSV field (no trimming, so markers survive)
    ///
    /// Only finite numerals become numbers; "NaN" or "inf" stay text.
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            return Cell::Empty;
        }
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Cell::Number(value),
            _ => Cell::Text(raw.to_string()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for Cell {
    fn from(text: &str) -> Self {
        Cell::Text(text.to_string())
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

/// How a row contributes to the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowKind {
    /// Starts a new category with the given key
    Category(String),
    /// Starts a new response within the current category
    Response(String),
    /// Extra spelling of the current response, marker removed
    Continuation(String),
    /// Blank, numeric or header-artifact row
    Null,
}

/// Extract the category key from a header cell
///
/// Returns the text between the first and second `". "`, or `None` if
/// the cell is not a category header.
pub fn category_key(cell: &Cell) -> Option<&str> {
    cell.as_text()?.split(CATEGORY_SEPARATOR).nth(1)
}

/// Classify a row by its first cell
pub fn classify_row(row: &[Cell]) -> RowKind {
    let Some(first) = row.first() else {
        return RowKind::Null;
    };
    if let Some(key) = category_key(first) {
        return RowKind::Category(key.to_string());
    }
    match first {
        Cell::Text(text) if text == HEADER_ARTIFACT => RowKind::Null,
        Cell::Text(text) if text.starts_with(CONTINUATION_MARKER) => {
            RowKind::Continuation(text.replace(CONTINUATION_MARKER, ""))
        }
        Cell::Text(text) => RowKind::Response(text.clone()),
        Cell::Number(_) | Cell::Empty => RowKind::Null,
    }
}

/// One human-elicited exemplar for a category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseRecord {
    /// Remaining columns of the response's first row, keyed by column name
    pub statistics: IndexMap<String, Cell>,
    /// Alternate spellings used for matching; always contains the label
    pub variations: BTreeSet<String>,
}

impl ResponseRecord {
    pub fn new(label: &str, statistics: IndexMap<String, Cell>) -> Self {
        Self {
            statistics,
            variations: BTreeSet::from([label.to_string()]),
        }
    }
}

/// Responses of one category, in table order
pub type CategoryEntry = IndexMap<String, ResponseRecord>;

/// Add the singular and plural forms of every "(s)" variation
///
/// Applying this twice gives the same set as applying it once.
pub fn expand_plural_variations(variations: &mut BTreeSet<String>) {
    let derived: Vec<String> = variations
        .iter()
        .filter(|v| v.contains(PLURAL_MARKER))
        .flat_map(|v| [v.replace(PLURAL_MARKER, ""), v.replace(PLURAL_MARKER, "s")])
        .collect();
    variations.extend(derived);
}

/// Lower-case, trim, and drop a trailing "(s)"
pub fn normalize_category_key(key: &str) -> String {
    let lower = key.trim().to_lowercase();
    lower
        .strip_suffix(PLURAL_MARKER)
        .unwrap_or(&lower)
        .trim_end()
        .to_string()
}

/// Parsed norms: category → response → record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormsTable {
    categories: IndexMap<String, CategoryEntry>,
}

/// Scan position inside the table being built
struct Cursor {
    category: usize,
    response: Option<usize>,
}

/// Build a [`NormsTable`] from the rows of a norms export
///
/// `columns` names the table's columns; names from index 1 on become the
/// keys of each response's statistics. The first row must be a category
/// header.
pub fn parse_norms_table<S: AsRef<str>>(columns: &[S], rows: &[Vec<Cell>]) -> Result<NormsTable> {
    if rows.is_empty() {
        return Err(NormsError::Format {
            row: 0,
            reason: "table has no rows".to_string(),
        });
    }

    let mut table = NormsTable::default();
    let mut cursor: Option<Cursor> = None;

    for (n, row) in rows.iter().enumerate() {
        match classify_row(row) {
            RowKind::Category(key) => {
                debug!("row {}: category {:?}", n, key);
                let (index, previous) = table.categories.insert_full(key, CategoryEntry::new());
                if previous.is_some() {
                    warn!("row {}: category header repeated, earlier entry replaced", n);
                }
                cursor = Some(Cursor {
                    category: index,
                    response: None,
                });
            }
            RowKind::Null => {
                started(&mut cursor, n)?;
                trace!("row {}: null row", n);
            }
            RowKind::Response(label) => {
                let cursor = started(&mut cursor, n)?;
                let entry = &mut table.categories[cursor.category];
                let record = ResponseRecord::new(&label, row_statistics(columns, row));
                let (index, previous) = entry.insert_full(label, record);
                if previous.is_some() {
                    warn!("row {}: response repeated, earlier record replaced", n);
                }
                cursor.response = Some(index);
            }
            RowKind::Continuation(text) => {
                let cursor = started(&mut cursor, n)?;
                let Some(index) = cursor.response else {
                    return Err(NormsError::Format {
                        row: n,
                        reason: "continuation row before any response".to_string(),
                    });
                };
                table.categories[cursor.category][index]
                    .variations
                    .insert(text);
            }
        }
    }

    for entry in table.categories.values_mut() {
        for record in entry.values_mut() {
            expand_plural_variations(&mut record.variations);
        }
    }

    Ok(table)
}

fn started(cursor: &mut Option<Cursor>, row: usize) -> Result<&mut Cursor> {
    cursor.as_mut().ok_or_else(|| NormsError::Format {
        row,
        reason: "table does not begin with a category header".to_string(),
    })
}

fn row_statistics<S: AsRef<str>>(columns: &[S], row: &[Cell]) -> IndexMap<String, Cell> {
    let width = columns.len().max(row.len());
    (1..width)
        .map(|i| {
            let name = columns
                .get(i)
                .map_or_else(|| format!("column {i}"), |c| c.as_ref().to_string());
            let value = row.get(i).cloned().unwrap_or(Cell::Empty);
            (name, value)
        })
        .collect()
}

impl NormsTable {
    /// Load and parse a norms CSV export
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let table = Self::from_reader(file)?;
        info!(
            "Loaded {} categories from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parse CSV text whose first record holds the column names
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let columns: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(Cell::parse).collect());
        }

        parse_norms_table(&columns, &rows)
    }

    /// Number of categories
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Category keys in table order
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// Exact-key lookup
    pub fn get(&self, key: &str) -> Option<&CategoryEntry> {
        self.categories.get(key)
    }

    /// Look up a category by exact key, then by normalized key
    pub fn category(&self, name: &str) -> Result<&CategoryEntry> {
        if let Some(entry) = self.categories.get(name) {
            return Ok(entry);
        }
        let wanted = normalize_category_key(name);
        self.categories
            .iter()
            .find(|(key, _)| normalize_category_key(key) == wanted)
            .map(|(_, entry)| entry)
            .ok_or_else(|| NormsError::UnknownCategory(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CategoryEntry)> {
        self.categories.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Flatten a map plus per-key sub-maps into one map with normalized keys
///
/// Keys of `data` that have a sub-map contribute the sub-map's entries;
/// the remaining keys of `data` follow with their own values.
pub fn flatten_nested<V: Clone>(
    data: &IndexMap<String, V>,
    subdata: &IndexMap<String, IndexMap<String, V>>,
) -> IndexMap<String, V> {
    let nested = data
        .keys()
        .filter_map(|key| subdata.get(key))
        .flat_map(|sub| sub.iter());
    let direct = data.iter().filter(|(key, _)| !subdata.contains_key(*key));

    nested
        .chain(direct)
        .map(|(key, value)| (normalize_category_key(key), value.clone()))
        .collect()
}
