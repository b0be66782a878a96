//! Ingest endpoint descriptor seam.

use crate::errors::ScError;

use async_trait::async_trait;
use common::secret::SecretString;

/// Transport protocol of the ingest endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestProtocol {
    Rtmp,
    Srt,
}

/// Where the stream is pushed. The URL carries the stream key.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: SecretString,
    pub protocol: IngestProtocol,
}

impl Endpoint {
    #[must_use]
    pub fn new(url: impl Into<String>, protocol: IngestProtocol) -> Self {
        Self {
            url: SecretString::from(url.into()),
            protocol,
        }
    }

    /// Only SRT-class transports support an adaptive bitrate regulator.
    #[must_use]
    pub fn supports_bitrate_regulation(&self) -> bool {
        self.protocol == IngestProtocol::Srt
    }
}

/// Externally configured source of the current ingest endpoint.
#[async_trait]
pub trait EndpointSource: Send + Sync {
    /// Resolve the endpoint to connect to.
    ///
    /// # Errors
    ///
    /// Returns `ScError::Configuration` if no endpoint is configured.
    async fn current(&self) -> Result<Endpoint, ScError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_srt_supports_regulation() {
        assert!(Endpoint::new("srt://ingest:9000", IngestProtocol::Srt).supports_bitrate_regulation());
        assert!(!Endpoint::new("rtmp://ingest/live", IngestProtocol::Rtmp)
            .supports_bitrate_regulation());
    }

    #[test]
    fn test_endpoint_debug_hides_stream_key() {
        let endpoint = Endpoint::new("rtmp://ingest/live/sk_live_123", IngestProtocol::Rtmp);
        assert!(!format!("{endpoint:?}").contains("sk_live_123"));
    }
}
