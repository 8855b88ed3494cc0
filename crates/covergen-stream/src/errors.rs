/// Errors raised while opening or reading the generation response stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent (DNS, connect, TLS, ...).
    #[error("connection failed: {message}")]
    Connect { message: String },
    /// The server answered with a non-success status code.
    #[error("server responded with status {status}: {body}")]
    Status { status: u16, body: String },
    /// Reading the streamed body failed after the response started.
    #[error("stream read failed: {message}")]
    Read { message: String },
    /// The per-run timeout elapsed before a terminal event arrived.
    #[error("generation timed out after {millis}ms")]
    Timeout { millis: u64 },
}

impl TransportError {
    /// Creates a connection error.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Creates a mid-stream read error.
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read {
            message: message.into(),
        }
    }

    /// Creates a non-success status error.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }
}

/// Top-level error type for the public client API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid user input to the request builder.
    #[error("validation error: {0}")]
    Validation(String),
    /// Transport failure, before or during streaming.
    #[error(transparent)]
    Transport(TransportError),
    /// The server sent an `error` event; the message is passed through verbatim.
    #[error("server error: {0}")]
    Server(String),
    /// The run was aborted by the caller.
    #[error("cancelled")]
    Cancelled,
    /// Stream ended early or an internal invariant was violated.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

impl From<TransportError> for ClientError {
    fn from(value: TransportError) -> Self {
        ClientError::Transport(value)
    }
}

/// Terminal failure carried by `GenerationEvent::Failed`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum RunFailure {
    /// Network or HTTP failure.
    #[error("transport failure: {message}")]
    Transport { message: String },
    /// Server-signaled error event.
    #[error("{message}")]
    Server { message: String },
}

impl RunFailure {
    /// Human-readable message suitable for display to the user.
    pub fn message(&self) -> &str {
        match self {
            Self::Transport { message } | Self::Server { message } => message,
        }
    }
}

impl From<&TransportError> for RunFailure {
    fn from(err: &TransportError) -> Self {
        RunFailure::Transport {
            message: err.to_string(),
        }
    }
}

pub(crate) fn client_error_from_failure(failure: &RunFailure, transport: Option<TransportError>) -> ClientError {
    match (failure, transport) {
        (_, Some(err)) => ClientError::Transport(err),
        (RunFailure::Server { message }, None) => ClientError::Server(message.clone()),
        (RunFailure::Transport { message }, None) => {
            ClientError::Transport(TransportError::read(message.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_failure_maps_to_server_error_verbatim() {
        let failure = RunFailure::Server {
            message: "quota exceeded".into(),
        };
        assert_eq!(
            client_error_from_failure(&failure, None),
            ClientError::Server("quota exceeded".into())
        );
        assert_eq!(failure.to_string(), "quota exceeded");
    }

    #[test]
    fn transport_error_is_preferred_when_available() {
        let err = TransportError::status(502, "bad gateway");
        let failure = RunFailure::from(&err);
        assert!(failure.message().contains("502"));
        assert_eq!(
            client_error_from_failure(&failure, Some(err.clone())),
            ClientError::Transport(err)
        );
    }

    #[test]
    fn sub_second_timeout_reports_milliseconds() {
        let err = TransportError::Timeout { millis: 250 };
        assert_eq!(err.to_string(), "generation timed out after 250ms");
    }
}
