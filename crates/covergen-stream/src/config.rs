use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::ClientError;

const DEFAULT_ENDPOINT: &str = "http://localhost:8000/api/genrate-cover-letter";
const DEFAULT_DATA_PREFIX: &str = "data:";

/// How records are separated in the response body.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordDelimiter {
    /// A single line feed (`\n`). A trailing `\r` on the record is ignored.
    Newline,
    /// An empty line (`\n\n` or `\r\n\r\n`), as emitted by SSE servers.
    #[default]
    BlankLine,
}

impl FromStr for RecordDelimiter {
    type Err = ClientError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "newline" | "line" | "lf" => Ok(Self::Newline),
            "blank-line" | "blank_line" | "blankline" | "blank" => Ok(Self::BlankLine),
            other => Err(ClientError::Config(format!(
                "unknown record delimiter `{other}` (expected `newline` or `blank-line`)"
            ))),
        }
    }
}

impl fmt::Display for RecordDelimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Newline => f.write_str("newline"),
            Self::BlankLine => f.write_str("blank-line"),
        }
    }
}

/// Configuration for the generation client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Streaming endpoint that accepts the generation request.
    pub endpoint: String,
    /// HTTP timeout applied by the transport.
    pub timeout: Duration,
    /// Record separator used by the stream decoder.
    pub delimiter: RecordDelimiter,
    /// Line prefix marking payload lines inside a record.
    pub data_prefix: String,
    /// Bounded event buffer between the run task and the consumer.
    pub stream_buffer_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(300),
            delimiter: RecordDelimiter::default(),
            data_prefix: DEFAULT_DATA_PREFIX.to_string(),
            stream_buffer_capacity: 128,
        }
    }
}

impl ClientConfig {
    /// Creates a config for the given endpoint with default settings.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Builds a config from environment variables, falling back to defaults.
    ///
    /// - `COVERGEN_ENDPOINT`
    /// - `COVERGEN_TIMEOUT_SECS`
    /// - `COVERGEN_RECORD_DELIMITER` (`newline` or `blank-line`)
    /// - `COVERGEN_DATA_PREFIX`
    pub fn from_env() -> Result<Self, ClientError> {
        let mut config = Self::default();
        if let Some(endpoint) = env_non_empty("COVERGEN_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(raw) = env_non_empty("COVERGEN_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|_| {
                ClientError::Config(format!("COVERGEN_TIMEOUT_SECS is not a number: {raw}"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = env_non_empty("COVERGEN_RECORD_DELIMITER") {
            config.delimiter = raw.parse()?;
        }
        if let Some(prefix) = env_non_empty("COVERGEN_DATA_PREFIX") {
            config.data_prefix = prefix;
        }
        Ok(config)
    }

    /// Overrides the endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Overrides the HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the record delimiter.
    pub fn delimiter(mut self, delimiter: RecordDelimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Overrides the payload line prefix.
    pub fn data_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.data_prefix = prefix.into();
        self
    }

    /// Overrides the event channel capacity.
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.endpoint.trim().is_empty() {
            return Err(ClientError::Config("endpoint must not be empty".into()));
        }
        if self.data_prefix.is_empty() {
            return Err(ClientError::Config("data prefix must not be empty".into()));
        }
        if self.stream_buffer_capacity == 0 {
            return Err(ClientError::Config(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
