use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::error::PipelineError;

/// Column names of a merged crawl dataset.
pub const CRAWL_HEADER: [&str; 5] = ["url", "parent_url", "postcodes", "cc_url", "content"];

#[derive(Debug)]
pub struct MergeSummary {
    pub output: PathBuf,
    pub files: usize,
    pub rows: usize,
}

/// Segment CSVs of `crawl` in `dir`, in segment order.
pub fn segment_csvs(crawl: &str, dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = dir.join(format!("crawldata{}segment*.csv", crawl));
    let pattern = pattern.to_string_lossy().into_owned();
    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .with_context(|| format!("Bad pattern {}", pattern))?
        .collect::<Result<_, _>>()?;
    files.sort();
    if files.is_empty() {
        return Err(PipelineError::NoSegmentCsvs { pattern }.into());
    }
    Ok(files)
}

/// Concatenate every segment CSV of `crawl` into `df<crawl>.csv`, then delete them.
///
/// The merged file is written under a temporary name, synced and renamed into
/// place, and the directory entry is synced before any source is removed. If
/// the run dies before the rename all sources are still there and the merge
/// can simply be repeated.
pub fn merge_crawl(crawl: &str, dir: &Path) -> Result<MergeSummary> {
    let files = segment_csvs(crawl, dir)?;
    let output = dir.join(format!("df{}.csv", crawl));
    let partial = dir.join(format!("df{}.csv.partial", crawl));

    info!("Merging {} files...", files.len());
    let mut writer = csv::Writer::from_path(&partial)
        .with_context(|| format!("Failed to create {:?}", partial))?;
    writer.write_record(CRAWL_HEADER)?;

    let mut rows = 0;
    for file in &files {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(file)
            .with_context(|| format!("Failed to open {:?}", file))?;
        for record in reader.byte_records() {
            let record = record.with_context(|| format!("Failed reading {:?}", file))?;
            writer.write_byte_record(&record)?;
            rows += 1;
        }
    }

    let inner: File = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush {:?}: {}", partial, e.error()))?;
    inner.sync_all()?;
    drop(inner);
    fs::rename(&partial, &output)
        .with_context(|| format!("Failed to move {:?} to {:?}", partial, output))?;
    File::open(dir)
        .and_then(|d| d.sync_all())
        .with_context(|| format!("Failed to sync {:?}", dir))?;
    info!("Saved merged csv to {}", output.display());

    info!("Deleting segment csvs");
    for file in &files {
        fs::remove_file(file).with_context(|| format!("Failed to remove {:?}", file))?;
    }

    Ok(MergeSummary {
        output,
        files: files.len(),
        rows,
    })
}
