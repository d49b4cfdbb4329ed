use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::archive::{fetch_segment, ArchiveFetcher};
use crate::error::PipelineError;
use crate::extract::{extract_segment, ExtractStats, RecordFilter};
use crate::merge::merge_crawl;
use crate::paths::{count_lines, crawl_from_name, open_paths_list, segment_filename};
use crate::postcodes::PostcodeMatcher;

/// What happened to one line of a wet.paths list.
#[derive(Debug, PartialEq)]
pub enum SegmentOutcome {
    /// No 5-digit segment number in the path.
    MalformedPath,
    /// The segment CSV is already on disk.
    AlreadyProcessed(PathBuf),
    Extracted { csv: PathBuf, stats: ExtractStats },
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CrawlSummary {
    pub extracted: usize,
    pub already_processed: usize,
    pub malformed: usize,
    pub rows: usize,
}

impl CrawlSummary {
    fn record(&mut self, outcome: &SegmentOutcome) {
        match outcome {
            SegmentOutcome::MalformedPath => self.malformed += 1,
            SegmentOutcome::AlreadyProcessed(_) => self.already_processed += 1,
            SegmentOutcome::Extracted { stats, .. } => {
                self.extracted += 1;
                self.rows += stats.rows;
            }
        }
    }
}

/// Runs fetch → extract → cleanup for segments, one at a time.
pub struct SegmentProcessor<'a> {
    fetcher: &'a dyn ArchiveFetcher,
    matcher: &'a PostcodeMatcher,
    filter: RecordFilter,
    server: String,
    output_dir: PathBuf,
}

impl<'a> SegmentProcessor<'a> {
    pub fn new(
        fetcher: &'a dyn ArchiveFetcher,
        matcher: &'a PostcodeMatcher,
        filter: RecordFilter,
        server: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        SegmentProcessor {
            fetcher,
            matcher,
            filter,
            server: server.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Process one remote segment path. An existing CSV means the segment is done.
    pub fn process_segment(&self, crawl: &str, wet_path: &str) -> Result<SegmentOutcome> {
        let Some(name) = segment_filename(wet_path, crawl) else {
            debug!("Skipping unrecognised path {:?}", wet_path);
            return Ok(SegmentOutcome::MalformedPath);
        };
        let wet_file = self.output_dir.join(name);
        let csv_file = wet_file.with_extension("csv");
        if csv_file.exists() {
            debug!("Already processed: {}", csv_file.display());
            return Ok(SegmentOutcome::AlreadyProcessed(csv_file));
        }

        let cc_url = format!("{}{}", self.server, wet_path);
        fetch_segment(self.fetcher, &cc_url, &wet_file)?;

        let stats = match extract_segment(&wet_file, &csv_file, &cc_url, &self.filter, self.matcher)
        {
            Ok(stats) => stats,
            Err(e) => {
                // A half-written CSV would look processed on the next run.
                for leftover in [&csv_file, &wet_file] {
                    if let Err(rm) = fs::remove_file(leftover) {
                        if rm.kind() != std::io::ErrorKind::NotFound {
                            warn!("Failed to remove {}: {}", leftover.display(), rm);
                        }
                    }
                }
                return Err(e);
            }
        };

        fs::remove_file(&wet_file)
            .with_context(|| format!("Failed to remove {:?}", wet_file))?;
        Ok(SegmentOutcome::Extracted { csv: csv_file, stats })
    }

    /// Walk every path of a wet.paths list in order.
    pub fn process_crawl(&self, crawl: &str, paths_file: &Path) -> Result<CrawlSummary> {
        let total = count_lines(paths_file)?;
        info!("Reading {} wet paths from {}", total, paths_file.display());

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
                .progress_chars("=> "),
        );

        let mut summary = CrawlSummary::default();
        for line in open_paths_list(paths_file)?.lines() {
            let line = line?;
            let wet_path = line.trim();
            let outcome = self.process_segment(crawl, wet_path)?;
            if let SegmentOutcome::Extracted { csv, stats } = &outcome {
                info!("{}: {} rows", csv.display(), stats.rows);
            }
            summary.record(&outcome);
            pb.inc(1);
        }
        pb.finish_and_clear();

        info!(
            "Crawl {}: {} extracted, {} already done, {} skipped, {} rows",
            crawl, summary.extracted, summary.already_processed, summary.malformed, summary.rows
        );
        Ok(summary)
    }

    /// Process and merge every `<year>*wet.paths` list in `paths_dir`.
    pub fn process_year(&self, year: &str, paths_dir: &Path) -> Result<Vec<(String, CrawlSummary)>> {
        let pattern = paths_dir.join(format!("{}*wet.paths", year));
        let pattern = pattern.to_string_lossy();
        let mut lists: Vec<PathBuf> = glob::glob(&pattern)
            .with_context(|| format!("Bad pattern {}", pattern))?
            .collect::<Result<_, _>>()?;
        lists.sort();

        info!("Starting extraction of wet paths for {}: {} files", year, lists.len());
        let mut done = Vec::new();
        for list in lists {
            let name = list.file_name().unwrap_or_default().to_string_lossy();
            let Some(crawl) = crawl_from_name(year, &name) else {
                warn!("No crawl id in {}, skipping", list.display());
                continue;
            };
            let summary = self.process_crawl(&crawl, &list)?;
            merge_crawl(&crawl, &self.output_dir)?;
            done.push((crawl, summary));
        }
        Ok(done)
    }
}

/// Reject a list whose length does not split evenly into `chunks`.
pub fn check_chunks(paths_file: &Path, chunks: usize) -> Result<usize> {
    let lines = count_lines(paths_file)?;
    if chunks == 0 || lines % chunks != 0 {
        return Err(PipelineError::UnevenChunks { lines, chunks }.into());
    }
    Ok(lines)
}
