use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt as _;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::accumulator::{Accumulator, GeneratedLetter, Step};
use crate::decoder::{RecordDecoder, record_stream};
use crate::errors::{ClientError, RunFailure, TransportError, client_error_from_failure};
use crate::event::Payload;
use crate::request::{GenerationRequest, MAX_ATTACHMENT_BYTES};
use crate::session::Session;
use crate::stream::GenerationEvent;
use crate::transport::Transport;

/// Handle used to cancel a running generation.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// The run stops at its next suspension point. The event channel closes
    /// without a terminal event and `finish()` returns `ClientError::Cancelled`.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Builder for one generation request.
pub struct GenerationBuilder {
    session: Session,
    request: GenerationRequest,
    timeout: Option<Duration>,
    attachment_len: Option<usize>,
}

impl GenerationBuilder {
    pub(crate) fn new(session: Session, client_text: String) -> Self {
        let request = GenerationRequest::new(session.session_id, client_text);
        Self {
            session,
            request,
            timeout: None,
            attachment_len: None,
        }
    }

    /// Adds a reference URL.
    pub fn context_url(mut self, url: impl Into<String>) -> Self {
        self.request.context_snippets.push(url.into());
        self
    }

    /// Adds several reference URLs.
    pub fn context_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request
            .context_snippets
            .extend(urls.into_iter().map(Into::into));
        self
    }

    /// Adds a selected category tag.
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.request.selected_categories.push(category.into());
        self
    }

    /// Sets the tone hint sent to the server.
    pub fn generation_mode(mut self, mode: impl Into<String>) -> Self {
        self.request.generation_mode = Some(mode.into());
        self
    }

    /// Attaches a file; its bytes are sent base64-encoded.
    ///
    /// Files over [`MAX_ATTACHMENT_BYTES`] are rejected by `start_stream`.
    pub fn attach_file(mut self, filename: impl Into<String>, contents: &[u8]) -> Self {
        self.attachment_len = Some(contents.len());
        if contents.len() <= MAX_ATTACHMENT_BYTES {
            self.request.attach(filename, contents);
        }
        self
    }

    /// Bounds the whole run. Expiry is reported as a transport failure.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the request that will be sent.
    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }

    /// Validates the request and starts streaming.
    ///
    /// Any generation already running on the same session is aborted first.
    pub async fn start_stream(self) -> Result<GenerationStream, ClientError> {
        self.validate()?;
        let client = self.session.client.clone();

        let (tx, rx) = mpsc::channel(client.config.stream_buffer_capacity);
        let (final_tx, final_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = watch::channel(false);
        let abort_handle = AbortHandle { tx: abort_tx };
        self.session.replace_active(abort_handle.clone());

        let run_id = uuid::Uuid::new_v4();
        let session_id = self.session.session_id;
        debug!(%run_id, %session_id, session = %self.session.config.name, "starting generation");

        let context = RunContext {
            run_id,
            session_id,
            transport: client.transport.clone(),
            decoder: client.decoder(),
            request: self.request,
            timeout: self.timeout,
        };
        tokio::spawn(run_task(context, tx, final_tx, abort_rx));

        Ok(GenerationStream {
            run_id,
            session_id,
            rx,
            final_rx,
            abort_handle,
            saw_terminal: false,
        })
    }

    /// Runs to completion and returns the finalized letter.
    pub async fn collect(self) -> Result<GeneratedLetter, ClientError> {
        self.start_stream().await?.finish().await
    }

    fn validate(&self) -> Result<(), ClientError> {
        if self.request.client_text.trim().is_empty() {
            return Err(ClientError::Validation(
                "client text must not be empty".into(),
            ));
        }
        for url in &self.request.context_snippets {
            if url.trim().is_empty() {
                return Err(ClientError::Validation(
                    "context URLs must not be empty".into(),
                ));
            }
            if let Err(err) = reqwest::Url::parse(url.trim()) {
                return Err(ClientError::Validation(format!(
                    "invalid context URL `{url}`: {err}"
                )));
            }
        }
        if let Some(len) = self.attachment_len
            && len > MAX_ATTACHMENT_BYTES
        {
            return Err(ClientError::Validation(format!(
                "attachment is {len} bytes; the limit is {MAX_ATTACHMENT_BYTES}"
            )));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ClientError::Validation(
                "timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Streaming handle returned by `GenerationBuilder::start_stream`.
pub struct GenerationStream {
    run_id: uuid::Uuid,
    session_id: uuid::Uuid,
    rx: mpsc::Receiver<GenerationEvent>,
    final_rx: oneshot::Receiver<Result<GeneratedLetter, ClientError>>,
    abort_handle: AbortHandle,
    saw_terminal: bool,
}

impl GenerationStream {
    /// Identifier of this run, as carried by every event.
    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    /// Session the run belongs to.
    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    /// Returns a handle that can cancel the run.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for the next event. Returns `None` once the channel is closed.
    pub async fn next_event(&mut self) -> Option<GenerationEvent> {
        let event = self.rx.recv().await;
        if event.as_ref().is_some_and(GenerationEvent::is_terminal) {
            self.saw_terminal = true;
        }
        event
    }

    /// Drains remaining events and returns the run result.
    pub async fn finish(mut self) -> Result<GeneratedLetter, ClientError> {
        while !self.saw_terminal {
            match self.rx.recv().await {
                Some(event) if event.is_terminal() => self.saw_terminal = true,
                Some(_) => {}
                None => break,
            }
        }

        match self.final_rx.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::protocol_msg(format!(
                "run task ended without final result (run_id={})",
                self.run_id
            ))),
        }
    }
}

struct RunContext {
    run_id: uuid::Uuid,
    session_id: uuid::Uuid,
    transport: Arc<dyn Transport>,
    decoder: RecordDecoder,
    request: GenerationRequest,
    timeout: Option<Duration>,
}

enum RunOutcome {
    Completed(GeneratedLetter),
    Failed(RunFailure, Option<TransportError>),
    Cancelled,
    /// The transport closed before a terminal event arrived.
    Ended,
    ReceiverDropped,
}

async fn run_task(
    context: RunContext,
    tx: mpsc::Sender<GenerationEvent>,
    final_tx: oneshot::Sender<Result<GeneratedLetter, ClientError>>,
    mut abort_rx: watch::Receiver<bool>,
) {
    let run_id = context.run_id;
    if !send_event(
        &tx,
        GenerationEvent::Started {
            run_id,
            session_id: context.session_id,
        },
    )
    .await
    {
        let _ = final_tx.send(Err(ClientError::protocol_msg(
            "event receiver dropped before Started",
        )));
        return;
    }

    let outcome = tokio::select! {
        _ = wait_for_abort(&mut abort_rx) => RunOutcome::Cancelled,
        outcome = drive_with_timeout(&context, &tx) => outcome,
    };

    match outcome {
        RunOutcome::Completed(result) => {
            debug!(%run_id, paragraphs = result.letter.paragraphs.len(), "generation completed");
            let sent = send_event(
                &tx,
                GenerationEvent::Completed {
                    run_id,
                    result: result.clone(),
                },
            )
            .await;
            let _ = final_tx.send(if sent {
                Ok(result)
            } else {
                Err(ClientError::protocol_msg(
                    "event receiver dropped before completion",
                ))
            });
        }
        RunOutcome::Failed(failure, transport) => {
            warn!(%run_id, error = %failure, "generation failed");
            let _ = send_event(
                &tx,
                GenerationEvent::Failed {
                    run_id,
                    error: failure.clone(),
                },
            )
            .await;
            let _ = final_tx.send(Err(client_error_from_failure(&failure, transport)));
        }
        RunOutcome::Cancelled => {
            debug!(%run_id, "generation cancelled");
            let _ = final_tx.send(Err(ClientError::Cancelled));
        }
        RunOutcome::Ended => {
            warn!(%run_id, "stream closed before a terminal event");
            let _ = final_tx.send(Err(ClientError::protocol_msg(
                "stream ended before completion",
            )));
        }
        RunOutcome::ReceiverDropped => {
            let _ = final_tx.send(Err(ClientError::protocol_msg(
                "event receiver dropped during generation",
            )));
        }
    }
}

async fn drive_with_timeout(context: &RunContext, tx: &mpsc::Sender<GenerationEvent>) -> RunOutcome {
    let Some(limit) = context.timeout else {
        return drive(context, tx).await;
    };
    match tokio::time::timeout(limit, drive(context, tx)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            let err = TransportError::Timeout {
                millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            };
            RunOutcome::Failed(RunFailure::from(&err), Some(err))
        }
    }
}

async fn drive(context: &RunContext, tx: &mpsc::Sender<GenerationEvent>) -> RunOutcome {
    let run_id = context.run_id;
    let bytes = match context.transport.open(&context.request).await {
        Ok(bytes) => bytes,
        Err(err) => return RunOutcome::Failed(RunFailure::from(&err), Some(err)),
    };

    let mut records = Box::pin(record_stream(bytes, context.decoder.clone()));
    let mut accumulator = Accumulator::new();
    while let Some(next) = records.next().await {
        let record = match next {
            Ok(record) => record,
            Err(err) => return RunOutcome::Failed(RunFailure::from(&err), Some(err)),
        };
        let event = match accumulator.apply(Payload::parse(&record.data)) {
            Step::Continue => continue,
            Step::Progress { percent, message } => GenerationEvent::Progress {
                run_id,
                percent,
                message,
            },
            Step::Usage(usage) => GenerationEvent::Usage { run_id, usage },
            Step::Completed(result) => return RunOutcome::Completed(result),
            Step::Failed { message } => {
                return RunOutcome::Failed(RunFailure::Server { message }, None);
            }
        };
        if !send_event(tx, event).await {
            return RunOutcome::ReceiverDropped;
        }
    }

    RunOutcome::Ended
}

/// Resolves once cancellation is requested. Never resolves if every abort
/// handle is dropped without aborting.
async fn wait_for_abort(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}

async fn send_event(tx: &mpsc::Sender<GenerationEvent>, event: GenerationEvent) -> bool {
    tx.send(event).await.is_ok()
}
