//! Common imports for typical client usage.
pub use crate::{
    AbortHandle, Analysis, Client, ClientConfig, ClientError, GeneratedLetter, GenerationEvent,
    GenerationStream, RecordDelimiter, Section, Session, SessionConfig, TokenUsage,
};
