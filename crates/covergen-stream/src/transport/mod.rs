//! Transport seam used to open the streamed generation response.
//!
//! The client never builds requests on the wire itself; it hands the
//! validated `GenerationRequest` to a `Transport` and consumes the byte
//! stream it returns.
use std::pin::Pin;

use crate::errors::TransportError;
use crate::request::GenerationRequest;

mod http;

pub use http::HttpTransport;

/// Chunked response body as delivered by the transport.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Send + 'static>>;

/// Contract implemented by anything that can open a generation stream.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request and returns the streamed body on success.
    ///
    /// Connection failures and non-success statuses are returned here, before
    /// any bytes are read.
    async fn open(&self, request: &GenerationRequest) -> Result<ByteStream, TransportError>;
}
