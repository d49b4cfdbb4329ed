use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::archive::{ArchiveReader, ArchiveRecord};
use crate::postcodes::{format_postcode_list, PostcodeMatcher};
use crate::settings::Settings;

/// Only text-extraction records carry page content.
const CONVERSION: &str = "conversion";

/// Decides which records are pages of interest.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    domain_marker: String,
    language: String,
}

impl RecordFilter {
    pub fn new(domain_marker: impl Into<String>, language: impl Into<String>) -> Self {
        RecordFilter {
            domain_marker: domain_marker.into(),
            language: language.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        RecordFilter::new(settings.domain_marker.clone(), settings.language.clone())
    }

    pub fn accepts(&self, record: &ArchiveRecord) -> bool {
        if record.record_type() != Some(CONVERSION) {
            return false;
        }
        let uri_ok = record
            .target_uri()
            .is_some_and(|uri| uri.contains(self.domain_marker.as_str()));
        uri_ok && record.language() == Some(self.language.as_str())
    }

    /// Website part of `uri`: cut after the domain suffix, scheme removed.
    /// `https://www.shop.co.uk/about/us` → `www.shop.co.uk`.
    pub fn website(&self, uri: &str) -> String {
        let suffix = self.domain_marker.trim_end_matches('/');
        let cut = match uri.find(self.domain_marker.as_str()) {
            Some(pos) => &uri[..pos + suffix.len()],
            None => uri,
        };
        cut.replace("https://", "").replace("http://", "")
    }
}

/// One output line of a segment CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRow {
    pub uri: String,
    pub website: String,
    pub postcodes: Vec<String>,
    pub cc_url: String,
    pub text: String,
}

impl MatchRow {
    fn write(&self, writer: &mut csv::Writer<File>) -> csv::Result<()> {
        writer.write_record([
            self.uri.as_str(),
            self.website.as_str(),
            format_postcode_list(&self.postcodes).as_str(),
            self.cc_url.as_str(),
            self.text.as_str(),
        ])
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ExtractStats {
    pub records: usize,
    pub candidates: usize,
    pub rows: usize,
}

/// Build the row for a record, or None when it is filtered out or has no region postcodes.
pub fn match_record(
    record: &ArchiveRecord,
    filter: &RecordFilter,
    matcher: &PostcodeMatcher,
    cc_url: &str,
) -> Option<MatchRow> {
    if !filter.accepts(record) {
        return None;
    }
    let uri = record.target_uri()?;
    let text = record.text();
    let postcodes = matcher.matches(&text)?;
    Some(MatchRow {
        uri: uri.to_string(),
        website: filter.website(uri),
        postcodes,
        cc_url: cc_url.to_string(),
        text: text.to_lowercase(),
    })
}

/// Stream `wet_file` and write matching pages to `csv_file` (truncated first, no header).
pub fn extract_segment(
    wet_file: &Path,
    csv_file: &Path,
    cc_url: &str,
    filter: &RecordFilter,
    matcher: &PostcodeMatcher,
) -> Result<ExtractStats> {
    let input = File::open(wet_file).with_context(|| format!("Failed to open {:?}", wet_file))?;
    let mut writer = csv::Writer::from_path(csv_file)
        .with_context(|| format!("Failed to create {:?}", csv_file))?;

    let mut stats = ExtractStats::default();
    for record in ArchiveReader::new(BufReader::new(input)) {
        let record = record.with_context(|| format!("Failed reading {:?}", wet_file))?;
        stats.records += 1;
        if !filter.accepts(&record) {
            continue;
        }
        stats.candidates += 1;
        if let Some(row) = match_record(&record, filter, matcher, cc_url) {
            row.write(&mut writer)?;
            stats.rows += 1;
        }
    }
    writer.flush()?;

    debug!(
        "{}: {} records, {} candidates, {} rows",
        wet_file.display(),
        stats.records,
        stats.candidates,
        stats.rows
    );
    Ok(stats)
}
