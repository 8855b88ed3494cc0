use futures::StreamExt as _;
use tracing::debug;

use crate::config::ClientConfig;
use crate::errors::{ClientError, TransportError};
use crate::request::GenerationRequest;

use super::{ByteStream, Transport};

/// HTTP transport posting the request as JSON and streaming the response body.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Creates a transport from client configuration.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &GenerationRequest) -> Result<ByteStream, TransportError> {
        debug!(
            endpoint = %self.endpoint,
            session_id = %request.session_id,
            urls = request.context_snippets.len(),
            has_file = request.filename.is_some(),
            "posting generation request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::connect(format!("request to {} failed: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::status(status.as_u16(), body));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::read(e.to_string())));
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_default_config() {
        let transport = HttpTransport::new(&ClientConfig::default()).expect("transport");
        assert!(transport.endpoint.ends_with("/api/genrate-cover-letter"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_connect_error() {
        let config = ClientConfig::new("http://127.0.0.1:9/stream")
            .timeout(std::time::Duration::from_secs(2));
        let transport = HttpTransport::new(&config).expect("transport");
        let request = GenerationRequest::new(uuid::Uuid::new_v4(), "Build me a shop");
        let err = match transport.open(&request).await {
            Ok(_) => panic!("port 9 should refuse connections"),
            Err(err) => err,
        };
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
