use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::error::PipelineError;

// Outward + inward code, e.g. "BS1 4DJ", "BS16 9QX".
static POSTCODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z]{1,2}[0-9][A-Z0-9]? [0-9][ABD-HJLNP-UW-Z]{2}\b").unwrap()
});

/// Valid postcodes for the target region. Read once, never modified.
#[derive(Debug, Default)]
pub struct PostcodeLookup {
    codes: HashSet<String>,
}

impl PostcodeLookup {
    /// Load the `column` of a reference CSV (header row required).
    pub fn from_csv(path: &Path, column: &str) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open postcode list {:?}", path))?;
        let idx = reader
            .headers()?
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| PipelineError::MissingColumn {
                column: column.to_string(),
                path: path.to_path_buf(),
            })?;

        let mut codes = HashSet::new();
        for record in reader.records() {
            let record = record?;
            if let Some(code) = record.get(idx) {
                if !code.is_empty() {
                    codes.insert(code.to_string());
                }
            }
        }
        Ok(PostcodeLookup { codes })
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(code)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }
}

impl<S: Into<String>> FromIterator<S> for PostcodeLookup {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        PostcodeLookup {
            codes: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Every distinct postcode-shaped substring in `text`, sorted.
pub fn find_postcodes(text: &str) -> BTreeSet<&str> {
    POSTCODE_RE.find_iter(text).map(|m| m.as_str()).collect()
}

/// Finds the region's postcodes in page text.
pub struct PostcodeMatcher {
    lookup: PostcodeLookup,
    area_prefix: String,
}

impl PostcodeMatcher {
    pub fn new(lookup: PostcodeLookup, area_prefix: impl Into<String>) -> Self {
        PostcodeMatcher {
            lookup,
            area_prefix: area_prefix.into(),
        }
    }

    /// Region postcodes present in the lookup, or `None` when there are none.
    pub fn matches(&self, text: &str) -> Option<Vec<String>> {
        let found: Vec<String> = find_postcodes(text)
            .into_iter()
            .filter(|pc| pc.starts_with(self.area_prefix.as_str()))
            .filter(|pc| self.lookup.contains(pc))
            .map(str::to_string)
            .collect();
        if found.is_empty() {
            None
        } else {
            Some(found)
        }
    }
}

/// Bracketed list form written into the `postcodes` column: `['BS1 4DJ', 'BS8 1TH']`.
pub fn format_postcode_list(codes: &[String]) -> String {
    let quoted: Vec<String> = codes.iter().map(|c| format!("'{}'", c)).collect();
    format!("[{}]", quoted.join(", "))
}
