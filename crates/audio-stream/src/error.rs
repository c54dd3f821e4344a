/// Errors reported by [`DynamicStream`](crate::stream::DynamicStream).
///
/// End of stream is not an error: it is signalled by `pull()` returning `None`.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// No data source could be opened for the URI.
    #[error("failed to open {uri}: {reason}")]
    Open { uri: String, reason: String },

    /// The data source opened but no decoder claimed its content.
    #[error("no decoder for {uri}: {reason}")]
    NoDecoder { uri: String, reason: String },

    /// The operation needs an open stream.
    #[error("stream is not open")]
    NotOpen,

    /// The decoder cannot seek (for example a live, non-seekable source).
    #[error("seeking is not supported by this source")]
    SeekUnsupported,

    /// The decoder tried to seek and failed.
    #[error("seek failed: {0}")]
    SeekFailed(String),
}

/// Seek failure as reported by a [`Decoder`](crate::decoder::Decoder).
#[derive(Debug, thiserror::Error)]
pub enum SeekError {
    #[error("source is not seekable")]
    Unsupported,
    #[error("{0}")]
    Failed(String),
}

impl From<SeekError> for StreamError {
    fn from(e: SeekError) -> Self {
        match e {
            SeekError::Unsupported => StreamError::SeekUnsupported,
            SeekError::Failed(reason) => StreamError::SeekFailed(reason),
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
