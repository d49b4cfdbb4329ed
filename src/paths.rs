//! Naming rules for segment files and helpers for reading wet.paths lists.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use regex::Regex;

static SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{5})\.warc\.wet\.gz").unwrap());

/// Local `.wet` filename for a remote segment path, e.g.
/// `.../CC-MAIN-...-00001.warc.wet.gz` + `202350` → `crawldata202350segment00001.wet`.
/// Returns None when the path carries no 5-digit segment number.
pub fn segment_filename(wet_path: &str, crawl: &str) -> Option<String> {
    let caps = SEGMENT_RE.captures(wet_path)?;
    Some(format!("crawldata{}segment{}.wet", crawl, &caps[1]))
}

/// Crawl id (`<year>` + two digits) embedded in a paths-list filename.
pub fn crawl_from_name(year: &str, name: &str) -> Option<String> {
    let re = Regex::new(&format!(r"{}\d{{2}}", regex::escape(year))).ok()?;
    re.find(name).map(|m| m.as_str().to_string())
}

/// Open a wet.paths list, transparently gunzipping `.gz` lists.
pub fn open_paths_list(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let is_gz = path.to_string_lossy().contains(".gz");
    if is_gz {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

pub fn count_lines(path: &Path) -> Result<usize> {
    let mut count = 0;
    for line in open_paths_list(path)?.lines() {
        line?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn builds_segment_filename() {
        let path = "crawl-data/CC-MAIN-2023-50/segments/1700679099281.67/wet/CC-MAIN-20231128083443-20231128113443-00001.warc.wet.gz";
        assert_eq!(
            segment_filename(path, "202350").as_deref(),
            Some("crawldata202350segment00001.wet")
        );
        assert_eq!(
            segment_filename("crawl-data/CC-MAIN-2023/x/00001.warc.wet.gz", "202350").as_deref(),
            Some("crawldata202350segment00001.wet")
        );
    }

    #[test]
    fn rejects_paths_without_segment_number() {
        assert_eq!(segment_filename("crawl-data/CC-MAIN-2023/x/0001.warc.wet.gz", "202350"), None);
        assert_eq!(segment_filename("crawl-data/x/00001.warc.gz", "202350"), None);
        assert_eq!(segment_filename("", "202350"), None);
    }

    #[test]
    fn finds_crawl_in_name() {
        assert_eq!(
            crawl_from_name("2023", "wet_paths/202350_wet.paths").as_deref(),
            Some("202350")
        );
        assert_eq!(crawl_from_name("2023", "wet_paths/2023_wet.paths"), None);
    }

    #[test]
    fn counts_plain_and_gzip_lists() {
        let dir = tempfile::tempdir().unwrap();
        let body = "a/00001.warc.wet.gz\na/00002.warc.wet.gz\na/00003.warc.wet.gz\n";

        let plain = dir.path().join("wet.paths");
        std::fs::write(&plain, body).unwrap();
        assert_eq!(count_lines(&plain).unwrap(), 3);

        let gz = dir.path().join("wet.paths.gz");
        let mut enc = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        enc.write_all(body.as_bytes()).unwrap();
        enc.finish().unwrap();
        assert_eq!(count_lines(&gz).unwrap(), 3);
    }
}
