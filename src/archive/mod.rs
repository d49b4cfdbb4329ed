pub mod fetch;
pub mod warc;

pub use fetch::{fetch_segment, ArchiveFetcher, HttpFetcher};
pub use warc::{ArchiveReader, ArchiveRecord};
