use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use tracing::{debug, info};

/// Retrieves a remote file to a local path.
pub trait ArchiveFetcher {
    /// Download `url` to `dest`, returning the number of bytes written.
    fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Plain HTTP GET, no auth and no retries.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        // Segments are large; no request timeout.
        let client = reqwest::blocking::Client::builder()
            .timeout(None)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(HttpFetcher { client })
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("GET {} failed", url))?
            .error_for_status()
            .with_context(|| format!("GET {} returned an error status", url))?;

        let mut out = BufWriter::new(
            File::create(dest).with_context(|| format!("Failed to create {:?}", dest))?,
        );
        let bytes = response
            .copy_to(&mut out)
            .with_context(|| format!("Failed to stream {} to {:?}", url, dest))?;
        out.flush()?;
        Ok(bytes)
    }
}

/// Gunzip `gz` into `out`, then delete `gz`. WET files are multi-member gzip.
pub fn decompress_gzip(gz: &Path, out: &Path) -> Result<u64> {
    let input = File::open(gz).with_context(|| format!("Failed to open {:?}", gz))?;
    let mut decoder = MultiGzDecoder::new(input);
    let mut output =
        BufWriter::new(File::create(out).with_context(|| format!("Failed to create {:?}", out))?);
    let bytes = io::copy(&mut decoder, &mut output)
        .with_context(|| format!("Failed to decompress {:?}", gz))?;
    output.flush()?;
    fs::remove_file(gz).with_context(|| format!("Failed to remove {:?}", gz))?;
    Ok(bytes)
}

/// Download a segment next to `wet_file` as `<wet_file>.gz` and decompress it in place.
pub fn fetch_segment(fetcher: &dyn ArchiveFetcher, url: &str, wet_file: &Path) -> Result<()> {
    let mut gz = wet_file.as_os_str().to_owned();
    gz.push(".gz");
    let gz = PathBuf::from(gz);

    info!("Downloading {}", url);
    let downloaded = fetcher.download(url, &gz)?;
    let unpacked = decompress_gzip(&gz, wet_file)?;
    debug!(
        "{}: {} bytes compressed, {} bytes decompressed",
        wet_file.display(),
        downloaded,
        unpacked
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn decompress_removes_intermediate() {
        let dir = tempfile::tempdir().unwrap();
        let gz = dir.path().join("seg.wet.gz");
        let out = dir.path().join("seg.wet");
        fs::write(&gz, gzip(b"hello wet")).unwrap();

        assert_eq!(decompress_gzip(&gz, &out).unwrap(), 9);
        assert_eq!(fs::read(&out).unwrap(), b"hello wet");
        assert!(!gz.exists());
    }

    #[test]
    fn decompress_reads_every_member() {
        let dir = tempfile::tempdir().unwrap();
        let gz = dir.path().join("seg.wet.gz");
        let out = dir.path().join("seg.wet");
        let mut data = gzip(b"first record ");
        data.extend(gzip(b"second record"));
        fs::write(&gz, data).unwrap();

        decompress_gzip(&gz, &out).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "first record second record");
    }

    #[test]
    fn decompress_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let gz = dir.path().join("seg.wet.gz");
        fs::write(&gz, b"not gzip at all").unwrap();
        assert!(decompress_gzip(&gz, &dir.path().join("seg.wet")).is_err());
    }
}
