use std::io::{BufRead, Read};

use anyhow::Result;

use crate::error::PipelineError;

/// One record of a WET file. Header names compare case-insensitively.
#[derive(Debug, Clone)]
pub struct ArchiveRecord {
    headers: Vec<(String, String)>,
    pub payload: Vec<u8>,
}

impl ArchiveRecord {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn record_type(&self) -> Option<&str> {
        self.header("WARC-Type")
    }

    pub fn target_uri(&self) -> Option<&str> {
        self.header("WARC-Target-URI")
    }

    pub fn language(&self) -> Option<&str> {
        self.header("WARC-Identified-Content-Language")
    }

    /// Payload as UTF-8 with undecodable bytes dropped.
    pub fn text(&self) -> String {
        self.payload.utf8_chunks().map(|chunk| chunk.valid()).collect()
    }
}

/// Streams records out of a decompressed WET file:
/// `WARC/1.0` line, `Name: value` headers, blank line, `Content-Length` bytes.
pub struct ArchiveReader<R> {
    inner: R,
    offset: u64,
    done: bool,
}

impl<R: BufRead> ArchiveReader<R> {
    pub fn new(inner: R) -> Self {
        ArchiveReader {
            inner,
            offset: 0,
            done: false,
        }
    }

    /// Reads one line without its terminator. Returns false at EOF.
    fn read_line(&mut self, buf: &mut Vec<u8>) -> std::io::Result<bool> {
        buf.clear();
        let n = self.inner.read_until(b'\n', buf)?;
        if n == 0 {
            return Ok(false);
        }
        self.offset += n as u64;
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        Ok(true)
    }

    fn malformed(&mut self, offset: u64, reason: &str) -> anyhow::Error {
        self.done = true;
        PipelineError::MalformedArchive {
            offset,
            reason: reason.to_string(),
        }
        .into()
    }

    pub fn next_record(&mut self) -> Result<Option<ArchiveRecord>> {
        if self.done {
            return Ok(None);
        }
        let mut line = Vec::new();

        // Records are separated by blank lines
        loop {
            let start = self.offset;
            if !self.read_line(&mut line)? {
                self.done = true;
                return Ok(None);
            }
            if line.is_empty() {
                continue;
            }
            if !line.starts_with(b"WARC/") {
                return Err(self.malformed(start, "expected WARC version line"));
            }
            break;
        }

        let mut headers: Vec<(String, String)> = Vec::new();
        loop {
            let start = self.offset;
            if !self.read_line(&mut line)? {
                return Err(self.malformed(start, "unexpected end of headers"));
            }
            if line.is_empty() {
                break;
            }
            let text = String::from_utf8_lossy(&line);
            if text.starts_with([' ', '\t']) {
                // folded continuation of the previous header
                match headers.last_mut() {
                    Some((_, value)) => {
                        value.push(' ');
                        value.push_str(text.trim());
                    }
                    None => return Err(self.malformed(start, "continuation before any header")),
                }
                continue;
            }
            match text.split_once(':') {
                Some((name, value)) => {
                    headers.push((name.trim().to_string(), value.trim().to_string()))
                }
                None => return Err(self.malformed(start, "header line without ':'")),
            }
        }

        let start = self.offset;
        let length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
            .and_then(|(_, v)| v.parse::<u64>().ok());
        let Some(length) = length else {
            return Err(self.malformed(start, "missing or invalid Content-Length"));
        };

        // Grows with the bytes actually read, not the declared length.
        let mut payload = Vec::new();
        let read = (&mut self.inner).take(length).read_to_end(&mut payload)?;
        self.offset += read as u64;
        if (read as u64) < length {
            return Err(self.malformed(start, "truncated payload"));
        }

        Ok(Some(ArchiveRecord { headers, payload }))
    }
}

impl<R: BufRead> Iterator for ArchiveReader<R> {
    type Item = Result<ArchiveRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Serialise one record the way Common Crawl lays out WET files.
#[cfg(test)]
pub fn write_record(out: &mut Vec<u8>, headers: &[(&str, &str)], body: &str) {
    out.extend_from_slice(b"WARC/1.0\r\n");
    for (k, v) in headers {
        out.extend_from_slice(format!("{}: {}\r\n", k, v).as_bytes());
    }
    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    out.extend_from_slice(body.as_bytes());
    out.extend_from_slice(b"\r\n\r\n");
}
