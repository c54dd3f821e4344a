//! Byte-addressable data sources and the local file backend.
//!
//! A [`DataSource`] is what a decoder reads from. Factories resolve URIs into sources;
//! the [`Registry`](crate::registry::Registry) asks each factory in turn.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Opened media bytes plus what is known about them.
pub trait DataSource: Read + Seek + Send + Sync {
    /// URI this source was opened from.
    fn uri(&self) -> &str;

    fn is_seekable(&self) -> bool {
        true
    }

    /// Total length in bytes, when known.
    fn byte_len(&self) -> Option<u64> {
        None
    }

    /// File extension (lowercase, without the dot), used as a format hint.
    fn extension(&self) -> Option<String> {
        extension_of(self.uri())
    }
}

/// Resolves URIs into [`DataSource`]s.
pub trait DataSourceFactory: Send + Sync {
    /// Whether this factory understands the URI's transport.
    fn can_open(&self, uri: &str) -> bool;

    fn open(&self, uri: &str) -> Result<Box<dyn DataSource>>;
}

/// Extension of the last path segment of `uri`, ignoring any query string.
pub fn extension_of(uri: &str) -> Option<String> {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Opens plain filesystem paths and `file://` URIs.
#[derive(Clone, Debug, Default)]
pub struct FileDataSourceFactory;

impl FileDataSourceFactory {
    fn path_for(uri: &str) -> Option<PathBuf> {
        if let Some(rest) = uri.strip_prefix("file://") {
            return Some(PathBuf::from(rest));
        }
        if uri.contains("://") {
            return None;
        }
        Some(PathBuf::from(uri))
    }
}

impl DataSourceFactory for FileDataSourceFactory {
    fn can_open(&self, uri: &str) -> bool {
        Self::path_for(uri).is_some()
    }

    fn open(&self, uri: &str) -> Result<Box<dyn DataSource>> {
        let path = Self::path_for(uri)
            .with_context(|| format!("not a file uri: {uri}"))?;
        Ok(Box::new(FileDataSource::open(uri, &path)?))
    }
}

/// A local file.
#[derive(Debug)]
pub struct FileDataSource {
    uri: String,
    file: File,
    len: u64,
}

impl FileDataSource {
    pub fn open(uri: &str, path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {:?}", path))?;
        let len = file
            .metadata()
            .with_context(|| format!("stat {:?}", path))?
            .len();
        Ok(Self {
            uri: uri.to_string(),
            file,
            len,
        })
    }
}

impl Read for FileDataSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for FileDataSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl DataSource for FileDataSource {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.len)
    }
}
