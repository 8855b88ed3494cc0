use std::sync::Arc;

use crate::config::ClientConfig;
use crate::decoder::RecordDecoder;
use crate::errors::ClientError;
use crate::session::{Session, SessionConfig};
use crate::transport::{HttpTransport, Transport};

pub(crate) struct ClientInner {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) config: ClientConfig,
}

impl ClientInner {
    pub(crate) fn decoder(&self) -> RecordDecoder {
        RecordDecoder::new(self.config.delimiter, self.config.data_prefix.clone())
    }
}

/// Entry point for creating sessions and starting generations.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

impl Client {
    /// Starts a builder for configuring the transport and settings.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Builds an HTTP client from `COVERGEN_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::builder().config(ClientConfig::from_env()?).build()
    }

    /// Creates a session: the per-user context that owns at most one
    /// in-flight generation.
    pub fn session(&self, config: SessionConfig) -> Session {
        Session::new(self.inner.clone(), config)
    }

    /// Configuration the client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

/// Builder for `Client`.
#[derive(Default)]
pub struct ClientBuilder {
    config: Option<ClientConfig>,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Sets the client configuration. Defaults apply when omitted.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Uses a custom transport instead of the HTTP one built from config.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validates the configuration and builds the client.
    pub fn build(self) -> Result<Client, ClientError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&config)?),
        };
        Ok(Client {
            inner: Arc::new(ClientInner { transport, config }),
        })
    }
}
