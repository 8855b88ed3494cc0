use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::client::ClientInner;
use crate::run::{AbortHandle, GenerationBuilder};

/// Configuration used to create a `Session`.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Human-readable session name, used in logs.
    pub name: String,
    /// Reuse an existing session id (for example one the server already
    /// knows); a fresh one is generated otherwise.
    pub session_id: Option<uuid::Uuid>,
}

impl SessionConfig {
    /// Creates a named session config.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            session_id: None,
        }
    }

    /// Pins the session id.
    pub fn with_id(mut self, session_id: uuid::Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// Per-session context.
///
/// Holds the session id sent with every request and the abort handle of the
/// run currently in flight. Starting a new generation aborts the previous
/// one, so a session never has two live streams.
#[derive(Clone)]
pub struct Session {
    pub(crate) client: Arc<ClientInner>,
    pub(crate) session_id: uuid::Uuid,
    pub(crate) config: SessionConfig,
    pub(crate) active: Arc<Mutex<Option<AbortHandle>>>,
}

impl Session {
    pub(crate) fn new(client: Arc<ClientInner>, config: SessionConfig) -> Self {
        let session_id = config.session_id.unwrap_or_else(uuid::Uuid::new_v4);
        Self {
            client,
            session_id,
            config,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Session id sent with every request.
    pub fn id(&self) -> uuid::Uuid {
        self.session_id
    }

    /// Session name from its config.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Starts building a generation request for the given client text.
    pub fn generate(&self, client_text: impl Into<String>) -> GenerationBuilder {
        GenerationBuilder::new(self.clone(), client_text.into())
    }

    /// Aborts the in-flight run, if any.
    pub fn cancel_active(&self) {
        if let Some(handle) = self.take_active() {
            debug!(session_id = %self.session_id, "cancelling active generation");
            handle.abort();
        }
    }

    /// Registers a new run, aborting the one it replaces.
    pub(crate) fn replace_active(&self, handle: AbortHandle) {
        let previous = match self.active.lock() {
            Ok(mut slot) => slot.replace(handle),
            Err(poisoned) => poisoned.into_inner().replace(handle),
        };
        if let Some(previous) = previous {
            debug!(session = %self.config.name, "aborting previous generation before starting a new one");
            previous.abort();
        }
    }

    fn take_active(&self) -> Option<AbortHandle> {
        match self.active.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}
