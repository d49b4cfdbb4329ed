mod archive;
mod error;
mod extract;
mod landing;
mod logging;
mod merge;
mod paths;
mod postcodes;
mod segment;
mod settings;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use archive::HttpFetcher;
use extract::RecordFilter;
use logging::RunLog;
use postcodes::{PostcodeLookup, PostcodeMatcher};
use segment::{check_chunks, SegmentProcessor};
use settings::Settings;

#[derive(Parser)]
#[command(
    name = "wet_postcodes",
    about = "Find regional UK postcodes in Common Crawl WET segments"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and extract every segment of one wet.paths list, then merge the crawl
    Run {
        /// File (plain or .gz) listing the segment paths
        #[arg(long, default_value = "wet.paths")]
        wet_file: PathBuf,
        /// Directory where segments are downloaded and processed
        #[arg(long, default_value = "outputs/")]
        outputs_dir: PathBuf,
        /// The list length must be divisible by this
        #[arg(long, default_value_t = 1)]
        num_chunks: usize,
        /// Server segment paths are appended to (default from settings)
        #[arg(long)]
        server: Option<String>,
        /// Crawl number, year + two digits (e.g. 202350)
        #[arg(long, default_value = "202350")]
        crawl: String,
        /// Reference CSV of valid postcodes
        #[arg(long, default_value = "BristolPostcodeLookup.csv")]
        postcode_list: PathBuf,
    },
    /// Run every <year>*wet.paths list in a directory, merging each crawl
    Year {
        /// Year of the crawls to download
        #[arg(long)]
        year: u16,
        /// Directory holding lists named like 202350_wet.paths
        #[arg(long, default_value = "wet_paths/")]
        wet_paths_dir: PathBuf,
        #[arg(long, default_value = "outputs/")]
        outputs_dir: PathBuf,
        #[arg(long)]
        server: Option<String>,
        #[arg(long, default_value = "BristolPostcodeLookup.csv")]
        postcode_list: PathBuf,
    },
    /// Merge the segment CSVs of one crawl into df<crawl>.csv
    Merge {
        #[arg(long)]
        crawl: String,
        #[arg(long, default_value = "outputs/")]
        outputs_dir: PathBuf,
    },
    /// Build the cleaned landing-page dataset of a year from its df<crawl>.csv files
    LandingPages {
        #[arg(long, default_value_t = 2021)]
        year: u16,
        /// Rows read per chunk
        #[arg(long, default_value_t = 50_000)]
        chunksize: usize,
        /// Directory holding the merged crawl CSVs
        #[arg(long, default_value = "rdsf_internet_archive/CC-filtering/")]
        database_path: PathBuf,
        #[arg(long, default_value = "processed_ccs/")]
        output_path: PathBuf,
    },
}

fn load_matcher(postcode_list: &Path, settings: &Settings) -> Result<PostcodeMatcher> {
    let lookup = PostcodeLookup::from_csv(postcode_list, &settings.lookup_column)?;
    info!(
        "Loaded {} postcodes from {}",
        lookup.len(),
        postcode_list.display()
    );
    Ok(PostcodeMatcher::new(lookup, settings.area_prefix.clone()))
}

/// Per-run log under `<dir>/logs`.
fn start_log(dir: &Path) -> Result<RunLog> {
    let log = RunLog::start(Some(dir.join("logs").as_path()))?;
    if let Some(path) = log.path() {
        info!("Logging to {}", path.display());
    }
    Ok(log)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            wet_file,
            outputs_dir,
            num_chunks,
            server,
            crawl,
            postcode_list,
        } => {
            let log = start_log(&outputs_dir)?;
            let settings = Settings::load()?;
            info!(settings = ?settings, "---Reading wet paths---");

            check_chunks(&wet_file, num_chunks)?;
            let matcher = load_matcher(&postcode_list, &settings)?;
            let fetcher = HttpFetcher::new()?;
            let server = server.unwrap_or_else(|| settings.server.clone());
            let processor = SegmentProcessor::new(
                &fetcher,
                &matcher,
                RecordFilter::from_settings(&settings),
                server,
                &outputs_dir,
            );

            processor.process_crawl(&crawl, &wet_file)?;
            info!("Finished downloading and extracting wet files");
            let merged = merge::merge_crawl(&crawl, processor.output_dir())?;
            info!("{} rows from {} segments", merged.rows, merged.files);
            log.finish();
        }
        Commands::Year {
            year,
            wet_paths_dir,
            outputs_dir,
            server,
            postcode_list,
        } => {
            let log = start_log(&outputs_dir)?;
            let settings = Settings::load()?;
            info!(settings = ?settings, "---Starting year {}---", year);

            let matcher = load_matcher(&postcode_list, &settings)?;
            let fetcher = HttpFetcher::new()?;
            let server = server.unwrap_or_else(|| settings.server.clone());
            let processor = SegmentProcessor::new(
                &fetcher,
                &matcher,
                RecordFilter::from_settings(&settings),
                server,
                &outputs_dir,
            );

            let crawls = processor.process_year(&year.to_string(), &wet_paths_dir)?;
            for (crawl, summary) in &crawls {
                info!("{}: {} rows", crawl, summary.rows);
            }
            log.finish();
        }
        Commands::Merge { crawl, outputs_dir } => {
            let log = start_log(&outputs_dir)?;
            let merged = merge::merge_crawl(&crawl, &outputs_dir)?;
            info!(
                "{} rows from {} segments in {}",
                merged.rows,
                merged.files,
                merged.output.display()
            );
            log.finish();
        }
        Commands::LandingPages {
            year,
            chunksize,
            database_path,
            output_path,
        } => {
            let log = start_log(&output_path)?;
            let settings = Settings::load()?;
            info!(
                year,
                chunksize,
                database_path = %database_path.display(),
                output_path = %output_path.display(),
                "Aggregating landing pages"
            );

            landing::aggregate_year(
                &database_path,
                &year.to_string(),
                Some(output_path.as_path()),
                chunksize,
                &settings.landing_suffix(),
            )?;
            log.finish();
        }
    }

    Ok(())
}
