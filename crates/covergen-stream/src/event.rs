use serde_json::Value;
use tracing::warn;

use crate::analysis::Analysis;

/// Progress message used when the server omits one.
pub const DEFAULT_PROGRESS_MESSAGE: &str = "Processing...";
/// Error message used when an `error` event carries none.
pub const DEFAULT_ERROR_MESSAGE: &str = "Unknown error";

const INPUT_KEYS: &[&str] = &["input_tokens", "input", "inputTokens"];
const OUTPUT_KEYS: &[&str] = &["output_tokens", "output", "outputTokens"];
const TOTAL_KEYS: &[&str] = &["total_tokens", "total", "totalTokens"];

/// Token accounting reported by the server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl TokenUsage {
    /// Normalizes a `usage` event, reading the nested `usage` object when the
    /// server wraps the counts.
    pub fn from_event(value: &Value) -> Self {
        let source = match value.get("usage") {
            Some(nested @ Value::Object(_)) => nested,
            _ => value,
        };
        let input = first_present(source, INPUT_KEYS).map_or(0, to_count);
        let output = first_present(source, OUTPUT_KEYS).map_or(0, to_count);
        let total = first_present(source, TOTAL_KEYS)
            .map_or_else(|| input.saturating_add(output), to_count);
        Self {
            input,
            output,
            total,
        }
    }
}

/// Typed event decoded from one record payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// `token` / `partial` / `partial_gen`: incremental text.
    Token { content: String },
    /// `progress`: percent already clamped to `0..=100`.
    Progress { percent: u8, message: String },
    /// `structured_data` / `analysis_done`. `None` when the payload was
    /// missing or malformed.
    Analysis(Option<Analysis>),
    /// `cover_letter_done`: authoritative final text. `None` when the event
    /// carried no text.
    CoverLetterDone { content: Option<String> },
    /// `done` / `finished`.
    Done,
    /// `error`.
    Error { message: String },
    /// `usage`.
    Usage(TokenUsage),
    /// Any other kind, ignored.
    Unknown { kind: String },
}

impl Event {
    /// Normalizes a parsed JSON payload into a typed event.
    pub fn from_value(value: &Value) -> Self {
        let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
        match kind {
            "token" | "partial" | "partial_gen" => Event::Token {
                content: first_non_empty_str(value, &["content", "token"])
                    .unwrap_or_default()
                    .to_string(),
            },
            "progress" => Event::Progress {
                percent: clamp_percent(value.get("percent")),
                message: first_non_empty_str(value, &["message"])
                    .unwrap_or(DEFAULT_PROGRESS_MESSAGE)
                    .to_string(),
            },
            "structured_data" | "analysis_done" => {
                let Some(raw) = first_present(value, &["data", "analysis"]) else {
                    warn!(kind, "analysis event without data");
                    return Event::Analysis(None);
                };
                match Analysis::from_value(raw) {
                    Ok(analysis) => Event::Analysis(Some(analysis)),
                    Err(err) => {
                        warn!(kind, error = %err, "dropping malformed analysis payload");
                        Event::Analysis(None)
                    }
                }
            }
            "cover_letter_done" => Event::CoverLetterDone {
                content: value
                    .get("content")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned),
            },
            "done" | "finished" => Event::Done,
            "error" => Event::Error {
                message: first_non_empty_str(value, &["message"])
                    .unwrap_or(DEFAULT_ERROR_MESSAGE)
                    .to_string(),
            },
            "usage" => Event::Usage(TokenUsage::from_event(value)),
            other => Event::Unknown {
                kind: other.to_string(),
            },
        }
    }

    /// Whether no further events are interpreted after this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Done | Event::Error { .. })
    }

    /// Short name for logging.
    pub fn kind(&self) -> &str {
        match self {
            Event::Token { .. } => "token",
            Event::Progress { .. } => "progress",
            Event::Analysis(_) => "analysis",
            Event::CoverLetterDone { .. } => "cover_letter_done",
            Event::Done => "done",
            Event::Error { .. } => "error",
            Event::Usage(_) => "usage",
            Event::Unknown { kind } => kind,
        }
    }
}

/// Result of interpreting one record payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// The payload was JSON and was normalized into an event.
    Event(Event),
    /// The payload was not JSON; it is literal letter text.
    Text(String),
}

impl Payload {
    /// Parses a record payload, falling back to literal text.
    pub fn parse(data: &str) -> Self {
        match serde_json::from_str::<Value>(data) {
            Ok(value) => Payload::Event(Event::from_value(&value)),
            Err(_) => Payload::Text(data.to_string()),
        }
    }
}

fn first_present<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find(|v| !v.is_null())
}

fn first_non_empty_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn to_count(value: &Value) -> u64 {
    match value {
        Value::Number(n) if n.is_u64() => n.as_u64().unwrap_or_default(),
        other => as_number(other)
            .filter(|n| n.is_finite() && *n > 0.0)
            .map_or(0, |n| n.round() as u64),
    }
}

fn clamp_percent(value: Option<&Value>) -> u8 {
    let Some(percent) = value.and_then(as_number).filter(|n| !n.is_nan()) else {
        return 0;
    };
    percent.clamp(0.0, 100.0).round() as u8
}
