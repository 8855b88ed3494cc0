//! Streaming client for the cover letter generator.
//!
//! The server answers a generation request with a pseudo-SSE body: records
//! separated by a blank line, each carrying one or more `data:` lines with a
//! JSON event. This crate decodes that body incrementally, folds the events
//! into a final letter plus structured analysis, and cleans the letter up.
//!
//! # Builder-first usage
//!
//! ```no_run
//! use covergen_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = Client::from_env()?;
//! let session = client.session(SessionConfig::named("cli"));
//!
//! let mut stream = session
//!     .generate("We need a WooCommerce store for handmade soap.")
//!     .context_url("https://example.com")
//!     .category("ecommerce")
//!     .start_stream()
//!     .await?;
//!
//! while let Some(event) = stream.next_event().await {
//!     if let GenerationEvent::Progress { percent, message, .. } = event {
//!         eprintln!("{percent}% {message}");
//!     }
//! }
//! let letter = stream.finish().await?;
//! println!("{}", letter.letter.text);
//! # Ok(())
//! # }
//! ```
//!
//! Callers that already hold the body can skip the async layer and use
//! [`Interpreter`] directly.

/// Folds decoded payloads into the state of one run.
pub mod accumulator;
/// Structured job analysis and legacy-shape migration.
pub mod analysis;
/// Final letter cleanup pipeline.
pub mod cleanup;
/// Client entry point and builder.
pub mod client;
/// Client configuration.
pub mod config;
/// Incremental record decoder.
pub mod decoder;
/// Public error types.
pub mod errors;
/// Typed events and payload parsing.
pub mod event;
/// Process-wide logging setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Outbound request payload.
pub mod request;
/// Generation builder, streaming handle and cancellation handle.
pub mod run;
/// Session context.
pub mod session;
/// Events exposed to consumers of a run.
pub mod stream;
/// Transport seam and the HTTP implementation.
pub mod transport;

pub use accumulator::{Accumulator, GeneratedLetter, Interpreter, Step};
pub use analysis::{Analysis, Section};
pub use cleanup::{CleanLetter, Paragraph, clean_letter};
pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, RecordDelimiter};
pub use decoder::{Record, RecordDecoder, record_stream};
pub use errors::{ClientError, RunFailure, TransportError};
pub use event::{Event, Payload, TokenUsage};
pub use request::{GenerationRequest, MAX_ATTACHMENT_BYTES};
pub use run::{AbortHandle, GenerationBuilder, GenerationStream};
pub use session::{Session, SessionConfig};
pub use stream::GenerationEvent;
pub use transport::{ByteStream, HttpTransport, Transport};
