//! Landing-page aggregation over merged crawl datasets.
//!
//! Each `df<crawl>.csv` of a year is read in fixed-size chunks. Within a chunk,
//! postcodes are pooled per domain and only root landing pages are kept; across
//! chunks and files, repeated landing pages are folded into the first one seen.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use tracing::info;

use crate::merge::CRAWL_HEADER;

pub const LANDING_HEADER: [&str; 6] = [
    "url",
    "parent_url",
    "postcodes",
    "cc_url",
    "content",
    "postcodes.count",
];

/// A row of a merged crawl dataset, by position.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlRow {
    pub url: String,
    pub parent_url: String,
    pub postcodes: String,
    pub cc_url: String,
    pub content: String,
}

impl CrawlRow {
    fn from_record(record: &csv::StringRecord) -> Self {
        let field = |i: usize| record.get(i).unwrap_or_default().to_string();
        CrawlRow {
            url: field(0),
            parent_url: field(1),
            postcodes: field(2),
            cc_url: field(3),
            content: field(4),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LandingPageRecord {
    pub url: String,
    pub parent_url: String,
    /// Sorted, no duplicates.
    pub postcodes: Vec<String>,
    pub cc_url: String,
    pub content: String,
}

impl LandingPageRecord {
    pub fn count(&self) -> usize {
        self.postcodes.len()
    }

    fn absorb(&mut self, other: LandingPageRecord) {
        let merged = self
            .postcodes
            .drain(..)
            .chain(other.postcodes)
            .sorted()
            .dedup()
            .collect();
        self.postcodes = merged;
    }
}

/// Host of a url without scheme or `www.`: `https://www.a.co.uk/x` → `a.co.uk`.
pub fn domain_of(url: &str) -> String {
    url.split("//")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or("")
        .trim_start_matches("www.")
        .to_string()
}

/// `"['BS8 1TH', 'BS1 4DJ'],['BS1 4DJ']"` → `["BS1 4DJ", "BS8 1TH"]`.
pub fn clean_postcodes(raw: &str) -> Vec<String> {
    let stripped: String = raw.chars().filter(|c| !matches!(c, '[' | ']' | '\'')).collect();
    stripped
        .replace(", ", ",")
        .split(',')
        .map(str::trim)
        .filter(|pc| !pc.is_empty())
        .map(str::to_string)
        .sorted()
        .dedup()
        .collect()
}

/// Pool postcodes per domain, keep landing pages, first row per url wins.
pub fn process_chunk(rows: Vec<CrawlRow>, landing_suffix: &str) -> Vec<LandingPageRecord> {
    let mut pooled: HashMap<String, Vec<&str>> = HashMap::new();
    let domains: Vec<String> = rows.iter().map(|r| domain_of(&r.url)).collect();
    for (row, domain) in rows.iter().zip(&domains) {
        pooled.entry(domain.clone()).or_default().push(&row.postcodes);
    }
    let pooled: HashMap<String, String> = pooled
        .into_iter()
        .map(|(domain, parts)| (domain, parts.join(",")))
        .collect();

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (row, domain) in rows.iter().zip(&domains) {
        if !row.url.ends_with(landing_suffix) || !seen.insert(row.url.clone()) {
            continue;
        }
        out.push(LandingPageRecord {
            url: row.url.clone(),
            parent_url: row.parent_url.clone(),
            postcodes: clean_postcodes(&pooled[domain]),
            cc_url: row.cc_url.clone(),
            content: row.content.clone(),
        });
    }
    out
}

/// Accumulates landing pages over many chunks, one record per url.
pub struct LandingPageAggregator {
    landing_suffix: String,
    chunk_size: usize,
    records: Vec<LandingPageRecord>,
    by_url: HashMap<String, usize>,
}

impl LandingPageAggregator {
    pub fn new(landing_suffix: impl Into<String>, chunk_size: usize) -> Self {
        LandingPageAggregator {
            landing_suffix: landing_suffix.into(),
            chunk_size: chunk_size.max(1),
            records: Vec::new(),
            by_url: HashMap::new(),
        }
    }

    pub fn add_chunk(&mut self, rows: Vec<CrawlRow>) {
        for record in process_chunk(rows, &self.landing_suffix) {
            match self.by_url.get(&record.url) {
                Some(&idx) => self.records[idx].absorb(record),
                None => {
                    self.by_url.insert(record.url.clone(), self.records.len());
                    self.records.push(record);
                }
            }
        }
    }

    /// Feed a merged crawl CSV through in chunks. Returns the number of rows read.
    pub fn add_file(&mut self, path: &Path) -> Result<usize> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .with_context(|| format!("Failed to open {:?}", path))?;

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner().template("{spinner} {msg} [{elapsed_precise}]")?,
        );

        let mut chunk = Vec::with_capacity(self.chunk_size);
        let mut total = 0;
        for record in reader.records() {
            let record = record.with_context(|| format!("Failed reading {:?}", path))?;
            if record.iter().eq(CRAWL_HEADER) {
                continue;
            }
            chunk.push(CrawlRow::from_record(&record));
            total += 1;
            if chunk.len() == self.chunk_size {
                self.add_chunk(std::mem::take(&mut chunk));
                pb.set_message(format!("{} rows", total));
                pb.tick();
            }
        }
        if !chunk.is_empty() {
            self.add_chunk(chunk);
        }
        pb.finish_and_clear();
        Ok(total)
    }

    pub fn records(&self) -> &[LandingPageRecord] {
        &self.records
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {:?}", path))?;
        writer.write_record(LANDING_HEADER)?;
        for r in &self.records {
            writer.write_record([
                r.url.as_str(),
                r.parent_url.as_str(),
                r.postcodes.join(",").as_str(),
                r.cc_url.as_str(),
                r.content.as_str(),
                r.count().to_string().as_str(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Build `landing_pages_cleaned_<year>.csv` from every `df<year>*.csv` in `database_dir`.
/// Returns None, after logging, when there is nothing to read.
pub fn aggregate_year(
    database_dir: &Path,
    year: &str,
    output_dir: Option<&Path>,
    chunk_size: usize,
    landing_suffix: &str,
) -> Result<Option<PathBuf>> {
    let pattern = database_dir.join(format!("df{}*.csv", year));
    let pattern = pattern.to_string_lossy();
    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .with_context(|| format!("Bad pattern {}", pattern))?
        .collect::<Result<_, _>>()?;
    files.sort();

    if files.is_empty() {
        info!("No files found for year {} in {}", year, database_dir.display());
        return Ok(None);
    }

    let mut agg = LandingPageAggregator::new(landing_suffix, chunk_size);
    for file in &files {
        info!("Processing {}...", file.display());
        let rows = agg.add_file(file)?;
        info!(
            "{}: {} rows, {} landing pages so far",
            file.display(),
            rows,
            agg.records().len()
        );
    }

    let out_dir = output_dir.unwrap_or(database_dir);
    fs::create_dir_all(out_dir).with_context(|| format!("Failed to create {:?}", out_dir))?;
    let output = out_dir.join(format!("landing_pages_cleaned_{}.csv", year));
    agg.write_csv(&output)?;
    info!("Saved merged output to: {}", output.display());
    Ok(Some(output))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(url: &str, postcodes: &str) -> CrawlRow {
        CrawlRow {
            url: url.to_string(),
            parent_url: domain_of(url),
            postcodes: postcodes.to_string(),
            cc_url: "cc".to_string(),
            content: format!("page {}", url),
        }
    }

    fn write_crawl(path: &Path, rows: &[CrawlRow]) {
        let mut w = csv::Writer::from_path(path).unwrap();
        w.write_record(CRAWL_HEADER).unwrap();
        for r in rows {
            w.write_record([&r.url, &r.parent_url, &r.postcodes, &r.cc_url, &r.content])
                .unwrap();
        }
        w.flush().unwrap();
    }

    #[test]
    fn domains() {
        assert_eq!(domain_of("https://www.shop.co.uk/"), "shop.co.uk");
        assert_eq!(domain_of("http://shop.co.uk/a/b"), "shop.co.uk");
        assert_eq!(domain_of("shop.co.uk/a"), "shop.co.uk");
    }

    #[test]
    fn cleaning_strips_list_syntax() {
        assert_eq!(
            clean_postcodes("['BS8 1TH', 'BS1 4DJ'],['BS1 4DJ']"),
            vec!["BS1 4DJ", "BS8 1TH"]
        );
        assert!(clean_postcodes("[]").is_empty());
    }

    #[test]
    fn chunk_pools_domain_postcodes_onto_landing_page() {
        let rows = vec![
            row("https://www.a.co.uk/", "['BS1 4DJ']"),
            row("https://a.co.uk/contact", "['BS8 1TH', 'BS1 4DJ']"),
            row("https://b.co.uk/about", "['BS6 5QA']"),
            row("https://www.a.co.uk/", "['BS6 5QA']"),
        ];
        let out = process_chunk(rows, ".co.uk/");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].url, "https://www.a.co.uk/");
        assert_eq!(out[0].postcodes, vec!["BS1 4DJ", "BS6 5QA", "BS8 1TH"]);
        assert_eq!(out[0].content, "page https://www.a.co.uk/");
    }

    #[test]
    fn non_landing_urls_are_dropped() {
        let rows = vec![
            row("https://a.co.uk/x/", "['BS1 4DJ']"),
            row("https://a.com/", "['BS1 4DJ']"),
            row("https://a.co.uk/?q=1", "['BS1 4DJ']"),
        ];
        // Only a root path ends in ".co.uk/"
        assert!(process_chunk(rows, ".co.uk/").is_empty());
    }

    #[test]
    fn repeated_url_across_chunks_unions_postcodes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("df202350.csv");
        write_crawl(
            &path,
            &[
                row("https://www.a.co.uk/", "['BS1 4DJ']"),
                row("https://www.a.co.uk/shop", "['BS8 1TH']"),
                row("https://www.a.co.uk/", "['BS6 5QA', 'BS1 4DJ']"),
                row("https://c.co.uk/", "['BS16 1QX']"),
            ],
        );

        let mut agg = LandingPageAggregator::new(".co.uk/", 2);
        assert_eq!(agg.add_file(&path).unwrap(), 4);

        let records = agg.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].url, "https://www.a.co.uk/");
        assert_eq!(records[0].postcodes, vec!["BS1 4DJ", "BS6 5QA", "BS8 1TH"]);
        assert_eq!(records[0].count(), 3);
        assert_eq!(records[1].url, "https://c.co.uk/");
        assert_eq!(records[1].count(), 1);
    }

    #[test]
    fn year_output_has_count_column() {
        let dir = tempfile::tempdir().unwrap();
        write_crawl(
            &dir.path().join("df202350.csv"),
            &[row("https://www.a.co.uk/", "['BS1 4DJ', 'BS8 1TH']")],
        );
        write_crawl(
            &dir.path().join("df202340.csv"),
            &[row("https://www.a.co.uk/", "['BS6 5QA']"), row("https://d.co.uk/", "['BS1 4DJ']")],
        );
        write_crawl(
            &dir.path().join("df202250.csv"),
            &[row("https://old.co.uk/", "['BS1 4DJ']")],
        );
        let out_dir = dir.path().join("processed");

        let output = aggregate_year(dir.path(), "2023", Some(&out_dir), 50_000, ".co.uk/")
            .unwrap()
            .unwrap();
        assert_eq!(output, out_dir.join("landing_pages_cleaned_2023.csv"));

        let mut reader = csv::Reader::from_path(&output).unwrap();
        let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(header, LANDING_HEADER);
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        // df202340 sorts first
        assert_eq!(&rows[0][0], "https://www.a.co.uk/");
        assert_eq!(&rows[0][2], "BS1 4DJ,BS6 5QA,BS8 1TH");
        assert_eq!(&rows[0][5], "3");
        assert_eq!(&rows[1][0], "https://d.co.uk/");
    }

    #[test]
    fn missing_year_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = aggregate_year(dir.path(), "2019", None, 10, ".co.uk/").unwrap();
        assert!(out.is_none());
        assert!(!dir.path().join("landing_pages_cleaned_2019.csv").exists());
    }
}
