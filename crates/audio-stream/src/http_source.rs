//! HTTP range-request data source.
//!
//! Fetches fixed-size byte blocks on demand and keeps the most recent block in memory,
//! so decoders can sniff and seek a remote file without downloading it up front.

use std::io::{self, Read, Seek, SeekFrom};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use ureq::http::StatusCode;

use crate::source::{DataSource, DataSourceFactory};

/// Fetches slower than this are logged.
const SLOW_FETCH: Duration = Duration::from_millis(250);

/// Configuration for HTTP range fetching.
#[derive(Clone, Debug)]
pub struct HttpRangeConfig {
    /// Bytes per fetched block.
    pub block_size: usize,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HttpRangeConfig {
    fn default() -> Self {
        Self {
            block_size: 512 * 1024,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Opens `http://` and `https://` URIs as [`HttpRangeSource`]s.
#[derive(Clone, Debug, Default)]
pub struct HttpDataSourceFactory {
    pub config: HttpRangeConfig,
}

impl DataSourceFactory for HttpDataSourceFactory {
    fn can_open(&self, uri: &str) -> bool {
        uri.starts_with("http://") || uri.starts_with("https://")
    }

    fn open(&self, uri: &str) -> Result<Box<dyn DataSource>> {
        let mut source = HttpRangeSource::new(uri.to_string(), self.config.clone());
        // unreachable hosts fail here, at open time
        source
            .total_len()
            .with_context(|| format!("http length check {uri}"))?;
        Ok(Box::new(source))
    }
}

/// Bytes fetched from the server, anchored at their offset in the resource.
#[derive(Debug, Default)]
struct Block {
    start: u64,
    data: Vec<u8>,
}

impl Block {
    /// Cached bytes from `pos` to the end of the block, if `pos` falls inside it.
    fn tail_from(&self, pos: u64) -> Option<&[u8]> {
        let offset = usize::try_from(pos.checked_sub(self.start)?).ok()?;
        self.data.get(offset..).filter(|tail| !tail.is_empty())
    }
}

/// Body of one range request plus the resource length the headers reported.
struct RangeReply {
    body: Vec<u8>,
    total: Option<u64>,
}

/// Seekable reader over an HTTP resource, one cached block at a time.
pub struct HttpRangeSource {
    url: String,
    config: HttpRangeConfig,
    pos: u64,
    len: Option<u64>,
    block: Block,
}

impl HttpRangeSource {
    pub fn new(url: String, config: HttpRangeConfig) -> Self {
        Self {
            url,
            config,
            pos: 0,
            len: None,
            block: Block::default(),
        }
    }

    /// Resource length, learned from a one-byte range request the first time.
    fn total_len(&mut self) -> io::Result<u64> {
        if let Some(len) = self.len {
            return Ok(len);
        }
        let reply = self.request(0, 0)?;
        let len = reply
            .total
            .ok_or_else(|| io::Error::other("content length unavailable"))?;
        self.block = Block {
            start: 0,
            data: reply.body,
        };
        self.len = Some(len);
        Ok(len)
    }

    fn request(&self, first: u64, last: u64) -> io::Result<RangeReply> {
        let range = format!("bytes={first}-{last}");
        let started = Instant::now();
        let resp = ureq::get(&self.url)
            .config()
            .timeout_per_call(Some(self.config.timeout))
            .build()
            .header("Range", &range)
            .call()
            .map_err(|e| io::Error::other(format!("http range request failed: {e}")))?;

        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        let total = reported_total(
            resp.status(),
            header("Content-Range").as_deref(),
            header("Content-Length").as_deref(),
        );

        let mut body = Vec::new();
        resp.into_body()
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| io::Error::other(format!("http read failed: {e}")))?;

        let took = started.elapsed();
        if took > SLOW_FETCH {
            tracing::warn!(
                took_ms = took.as_millis() as u64,
                bytes = body.len(),
                range = range.as_str(),
                "http range fetch slow"
            );
        }
        Ok(RangeReply { body, total })
    }

    /// Replace the cached block with the one that starts at the read position.
    fn load_block(&mut self) -> io::Result<()> {
        let (first, last) = block_range(self.pos, self.config.block_size, self.len);
        let reply = self.request(first, last)?;
        if reply.total.is_some() {
            self.len = reply.total;
        }
        self.block = Block {
            start: first,
            data: reply.body,
        };
        Ok(())
    }
}

impl Read for HttpRangeSource {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() || self.len.is_some_and(|len| self.pos >= len) {
            return Ok(0);
        }
        if self.block.tail_from(self.pos).is_none() {
            self.load_block()?;
        }
        let Some(tail) = self.block.tail_from(self.pos) else {
            return Ok(0);
        };

        let n = tail.len().min(out.len());
        out[..n].copy_from_slice(&tail[..n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for HttpRangeSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = match pos {
            SeekFrom::Start(x) => x,
            SeekFrom::Current(d) => self.pos.saturating_add_signed(d),
            SeekFrom::End(d) => self.total_len()?.saturating_add_signed(d),
        };
        Ok(self.pos)
    }
}

impl DataSource for HttpRangeSource {
    fn uri(&self) -> &str {
        &self.url
    }

    fn byte_len(&self) -> Option<u64> {
        self.len
    }
}

/// Inclusive byte range of the block read from `pos`, cut at the last byte when the
/// length is known.
fn block_range(pos: u64, block_size: usize, len: Option<u64>) -> (u64, u64) {
    let mut last = pos.saturating_add(block_size.max(1) as u64 - 1);
    if let Some(len) = len.filter(|&l| l > 0) {
        last = last.min(len - 1);
    }
    (pos, last)
}

/// Resource length from a range reply: the `Content-Range` total for 206, the body
/// length for a plain 200, nothing otherwise.
fn reported_total(
    status: StatusCode,
    content_range: Option<&str>,
    content_length: Option<&str>,
) -> Option<u64> {
    let content_length = content_length.and_then(|v| v.parse::<u64>().ok());
    match status {
        StatusCode::PARTIAL_CONTENT => content_range
            .and_then(|v| v.split_once('/'))
            .and_then(|(_, total)| total.parse::<u64>().ok())
            .or(content_length),
        StatusCode::OK => content_length,
        _ => None,
    }
}
