// ingest/columns.rs
// Tolerant column resolution over a detected header row

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use super::errors::{IngestError, IngestResult};
use super::normalize::cell_text;
use super::workbook::RawCell;

/// A single matching rule against a lower-cased header cell.
#[derive(Debug, Clone, Copy)]
pub enum ColumnPredicate {
    /// Header contains the needle.
    Contains(&'static str),
    /// Header contains the needle but none of the excluded substrings.
    /// Disambiguates singular columns from their plural near-duplicates
    /// (rating vs ratings).
    ContainsExcluding {
        needle: &'static str,
        exclude: &'static [&'static str],
    },
    /// Header matches the regex.
    Pattern(&'static Lazy<Regex>),
}

impl ColumnPredicate {
    fn matches(&self, header: &str) -> bool {
        match self {
            ColumnPredicate::Contains(needle) => header.contains(needle),
            ColumnPredicate::ContainsExcluding { needle, exclude } => {
                header.contains(needle) && !exclude.iter().any(|e| header.contains(e))
            }
            ColumnPredicate::Pattern(re) => re.is_match(header),
        }
    }
}

/// One target column: a stable label, whether it must exist, and the
/// ordered predicates that can locate it.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub label: &'static str,
    pub required: bool,
    pub predicates: &'static [ColumnPredicate],
}

/// Resolved label -> column index mapping for one sheet.
#[derive(Debug, Default)]
pub struct ResolvedColumns {
    map: HashMap<&'static str, usize>,
}

impl ResolvedColumns {
    pub fn get(&self, label: &str) -> Option<usize> {
        self.map.get(label).copied()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.map.contains_key(label)
    }
}

/// Resolve every target column against the header row, in declaration
/// order.
/// The first header cell satisfying any predicate wins. A missing
/// required column aborts the sheet with `MissingColumn`.
pub fn resolve_columns(
    header: &[RawCell],
    specs: &[ColumnSpec],
) -> IngestResult<ResolvedColumns> {
    let lowered: Vec<Option<String>> = header
        .iter()
        .map(|cell| cell_text(cell).map(|t| t.to_lowercase()))
        .collect();

    let mut resolved = ResolvedColumns::default();
    for spec in specs {
        let found = lowered.iter().enumerate().find_map(|(index, text)| {
            let text = text.as_deref()?;
            spec.predicates
                .iter()
                .any(|p| p.matches(text))
                .then_some(index)
        });

        match found {
            Some(index) => {
                resolved.map.insert(spec.label, index);
            }
            None if spec.required => {
                return Err(IngestError::MissingColumn(spec.label.to_string()));
            }
            None => {}
        }
    }

    Ok(resolved)
}
