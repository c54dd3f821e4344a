//! Capability registry: data sources, decoders, and DSP stages.
//!
//! Streams consult the registry when opening a URI and when building their DSP chain.
//! Factories are tried in registration order and the first one that claims the input
//! wins.

use crate::decoder::{Decoder, DecoderFactory};
use crate::dsp::{Dsp, DspFactory};
use crate::error::StreamError;
use crate::http_source::HttpDataSourceFactory;
use crate::source::{DataSource, DataSourceFactory, FileDataSourceFactory};
use crate::symphonia_decoder::SymphoniaDecoderFactory;

#[derive(Default)]
pub struct Registry {
    data_sources: Vec<Box<dyn DataSourceFactory>>,
    decoders: Vec<Box<dyn DecoderFactory>>,
    dsps: Vec<Box<dyn DspFactory>>,
}

impl Registry {
    /// An empty registry; nothing can be opened until factories are added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Local files, HTTP(S), and Symphonia decoding. No DSP stages.
    pub fn with_defaults() -> Self {
        Self::new()
            .with_data_source(FileDataSourceFactory)
            .with_data_source(HttpDataSourceFactory::default())
            .with_decoder(SymphoniaDecoderFactory)
    }

    pub fn with_data_source(mut self, factory: impl DataSourceFactory + 'static) -> Self {
        self.data_sources.push(Box::new(factory));
        self
    }

    pub fn with_decoder(mut self, factory: impl DecoderFactory + 'static) -> Self {
        self.decoders.push(Box::new(factory));
        self
    }

    /// Append a DSP stage; stages run in the order they are added.
    pub fn with_dsp(mut self, factory: impl DspFactory + 'static) -> Self {
        self.dsps.push(Box::new(factory));
        self
    }

    /// Open `uri` with the first data-source factory that understands it.
    pub fn open_uri(&self, uri: &str) -> Result<Box<dyn DataSource>, StreamError> {
        let factory = self
            .data_sources
            .iter()
            .find(|f| f.can_open(uri))
            .ok_or_else(|| StreamError::Open {
                uri: uri.to_string(),
                reason: "unsupported transport".to_string(),
            })?;

        factory.open(uri).map_err(|e| StreamError::Open {
            uri: uri.to_string(),
            reason: format!("{e:#}"),
        })
    }

    /// Hand `source` to the first decoder factory that claims it.
    ///
    /// The claiming factory takes ownership of the source; if it then fails to parse the
    /// content no other factory is tried.
    pub fn decoder_for(&self, source: Box<dyn DataSource>) -> Result<Box<dyn Decoder>, StreamError> {
        let uri = source.uri().to_string();
        let factory = self
            .decoders
            .iter()
            .find(|f| f.can_handle(source.as_ref()))
            .ok_or_else(|| StreamError::NoDecoder {
                uri: uri.clone(),
                reason: "no decoder claimed the content".to_string(),
            })?;

        tracing::debug!(uri = %uri, decoder = factory.name(), "decoder selected");
        factory.open(source).map_err(|e| StreamError::NoDecoder {
            uri,
            reason: format!("{}: {e:#}", factory.name()),
        })
    }

    /// Instantiate every registered DSP stage, in order.
    pub fn create_dsps(&self) -> Vec<Box<dyn Dsp>> {
        self.dsps.iter().map(|f| f.create()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::GainFactory;

    #[test]
    fn unknown_scheme_is_open_failure() {
        let registry = Registry::with_defaults();
        let err = registry.open_uri("smb://share/a.flac").err().unwrap();
        assert!(matches!(err, StreamError::Open { .. }));
    }

    #[test]
    fn empty_registry_opens_nothing() {
        let err = Registry::new().open_uri("/tmp/a.flac").err().unwrap();
        assert!(matches!(err, StreamError::Open { .. }));
    }

    #[test]
    fn dsps_are_created_in_order() {
        let registry = Registry::new()
            .with_dsp(GainFactory { db: -6.0 })
            .with_dsp(GainFactory { db: 0.0 });
        let dsps = registry.create_dsps();
        assert_eq!(dsps.len(), 2);
        assert_eq!(dsps[0].name(), "gain");
    }
}
