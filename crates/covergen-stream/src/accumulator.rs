use tracing::debug;

use crate::analysis::Analysis;
use crate::cleanup::{CleanLetter, clean_letter};
use crate::decoder::RecordDecoder;
use crate::event::{Event, Payload, TokenUsage};

/// Finalized result of a successful generation.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeneratedLetter {
    /// Last structured analysis received, if any.
    pub analysis: Option<Analysis>,
    /// Cleaned letter in canonical form.
    pub letter: CleanLetter,
    /// Buffered text exactly as accumulated, before cleanup.
    pub raw_text: String,
    /// Last usage report received before completion.
    pub usage: Option<TokenUsage>,
}

/// Outcome of applying one payload to the accumulator.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// State may have changed; nothing to report.
    Continue,
    Progress { percent: u8, message: String },
    Usage(TokenUsage),
    /// Terminal success.
    Completed(GeneratedLetter),
    /// Terminal failure; no result is produced.
    Failed { message: String },
}

impl Step {
    /// True for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Step::Completed(_) | Step::Failed { .. })
    }
}

/// Folds payloads into the state of one generation run.
///
/// A fresh accumulator is created per run. Once a terminal event has been
/// applied every later payload is ignored.
#[derive(Debug, Default)]
pub struct Accumulator {
    text: String,
    analysis: Option<Analysis>,
    progress: u8,
    usage: Option<TokenUsage>,
    terminal: bool,
}

impl Accumulator {
    /// Creates an empty accumulator for a new run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one payload and reports what the consumer should see.
    pub fn apply(&mut self, payload: Payload) -> Step {
        if self.terminal {
            debug!("ignoring payload after terminal event");
            return Step::Continue;
        }
        let event = match payload {
            Payload::Text(text) => {
                self.text.push_str(&text);
                return Step::Continue;
            }
            Payload::Event(event) => event,
        };
        match event {
            Event::Token { content } => {
                self.text.push_str(&content);
                Step::Continue
            }
            Event::Progress { percent, message } => {
                self.progress = percent;
                Step::Progress { percent, message }
            }
            Event::Analysis(Some(analysis)) => {
                self.analysis = Some(analysis);
                Step::Continue
            }
            Event::Analysis(None) => Step::Continue,
            Event::CoverLetterDone { content: Some(content) } => {
                self.text = content;
                Step::Continue
            }
            Event::CoverLetterDone { content: None } => {
                debug!("cover_letter_done without content; keeping buffered text");
                Step::Continue
            }
            Event::Done => {
                self.terminal = true;
                Step::Completed(self.finalize())
            }
            Event::Error { message } => {
                self.terminal = true;
                Step::Failed { message }
            }
            Event::Usage(usage) => {
                self.usage = Some(usage);
                Step::Usage(usage)
            }
            Event::Unknown { kind } => {
                debug!(kind = %kind, "ignoring unknown event kind");
                Step::Continue
            }
        }
    }

    /// Letter text accumulated so far, before cleanup.
    pub fn buffered_text(&self) -> &str {
        &self.text
    }

    /// Latest analysis received, if any.
    pub fn analysis(&self) -> Option<&Analysis> {
        self.analysis.as_ref()
    }

    /// Last reported progress percent.
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Last token usage report, if any.
    pub fn usage(&self) -> Option<TokenUsage> {
        self.usage
    }

    /// Whether a `done` or `error` event has been applied.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    fn finalize(&mut self) -> GeneratedLetter {
        let raw_text = std::mem::take(&mut self.text);
        GeneratedLetter {
            analysis: self.analysis.take(),
            letter: clean_letter(&raw_text),
            raw_text,
            usage: self.usage,
        }
    }
}

/// Synchronous decoder plus accumulator for callers that already hold the
/// response chunks.
#[derive(Debug, Default)]
pub struct Interpreter {
    decoder: RecordDecoder,
    accumulator: Accumulator,
}

impl Interpreter {
    /// Creates an interpreter around a configured decoder.
    pub fn new(decoder: RecordDecoder) -> Self {
        Self {
            decoder,
            accumulator: Accumulator::new(),
        }
    }

    /// Feeds one chunk and returns the reportable steps it produced.
    ///
    /// Processing stops at the first terminal step; records after it are
    /// never interpreted.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Step> {
        let mut steps = Vec::new();
        if self.accumulator.is_terminal() {
            return steps;
        }
        for record in self.decoder.push_chunk(chunk) {
            let step = self.accumulator.apply(Payload::parse(&record.data));
            let terminal = step.is_terminal();
            if step != Step::Continue {
                steps.push(step);
            }
            if terminal {
                break;
            }
        }
        steps
    }

    /// Ends the stream, discarding any undelimited leftover.
    ///
    /// Returns the number of discarded bytes.
    pub fn finish(&mut self) -> usize {
        self.decoder.finish()
    }

    /// State accumulated so far.
    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: serde_json::Value) -> Payload {
        Payload::Event(Event::from_value(&value))
    }

    #[test]
    fn tokens_accumulate_in_arrival_order() {
        let mut acc = Accumulator::new();
        for content in ["A", "B", "C"] {
            assert_eq!(acc.apply(event(json!({"type": "token", "content": content}))), Step::Continue);
        }
        assert_eq!(acc.buffered_text(), "ABC");
    }

    #[test]
    fn cover_letter_done_replaces_buffered_tokens() {
        let mut acc = Accumulator::new();
        for content in ["A", "B", "C"] {
            acc.apply(event(json!({"type": "token", "content": content})));
        }
        acc.apply(event(json!({"type": "cover_letter_done", "content": "FINAL"})));
        let Step::Completed(result) = acc.apply(event(json!({"type": "done"}))) else {
            panic!("expected completion");
        };
        assert_eq!(result.raw_text, "FINAL");
        assert_eq!(result.letter.text, "FINAL");
    }

    #[test]
    fn cover_letter_done_without_content_keeps_tokens() {
        let mut acc = Accumulator::new();
        acc.apply(event(json!({"type": "token", "content": "kept"})));
        acc.apply(event(json!({"type": "cover_letter_done"})));
        assert_eq!(acc.buffered_text(), "kept");
    }

    #[test]
    fn non_json_payload_is_appended_verbatim() {
        let mut acc = Accumulator::new();
        acc.apply(event(json!({"type": "token", "content": "Dear "})));
        acc.apply(Payload::parse("team,"));
        assert_eq!(acc.buffered_text(), "Dear team,");
    }

    #[test]
    fn analysis_is_last_writer_wins_and_survives_malformed_updates() {
        let mut acc = Accumulator::new();
        acc.apply(event(json!({"type": "structured_data", "data": {"greeting": "first"}})));
        acc.apply(event(json!({"type": "analysis_done", "analysis": {"greeting": "second"}})));
        acc.apply(event(json!({"type": "analysis_done", "analysis": "{oops"})));
        assert_eq!(
            acc.analysis().and_then(|a| a.greeting.as_deref()),
            Some("second")
        );
    }

    #[test]
    fn progress_and_usage_are_reported() {
        let mut acc = Accumulator::new();
        assert_eq!(
            acc.apply(event(json!({"type": "progress", "percent": 150, "message": "Almost"}))),
            Step::Progress {
                percent: 100,
                message: "Almost".into()
            }
        );
        assert_eq!(acc.progress(), 100);
        assert_eq!(
            acc.apply(event(json!({"type": "usage", "input_tokens": 10, "output_tokens": 5}))),
            Step::Usage(TokenUsage {
                input: 10,
                output: 5,
                total: 15
            })
        );
        let Step::Completed(result) = acc.apply(event(json!({"type": "finished"}))) else {
            panic!("expected completion");
        };
        assert_eq!(result.usage.map(|u| u.total), Some(15));
    }

    #[test]
    fn error_halts_processing_without_result() {
        let mut acc = Accumulator::new();
        acc.apply(event(json!({"type": "token", "content": "partial"})));
        assert_eq!(
            acc.apply(event(json!({"type": "error", "message": "model overloaded"}))),
            Step::Failed {
                message: "model overloaded".into()
            }
        );
        assert_eq!(acc.apply(event(json!({"type": "token", "content": "more"}))), Step::Continue);
        assert_eq!(acc.apply(event(json!({"type": "done"}))), Step::Continue);
        assert_eq!(acc.buffered_text(), "partial");
    }

    #[test]
    fn unknown_kinds_are_ignored() {
        let mut acc = Accumulator::new();
        assert_eq!(acc.apply(event(json!({"type": "heartbeat"}))), Step::Continue);
        assert!(!acc.is_terminal());
    }

    #[test]
    fn interpreter_runs_a_full_stream() {
        let body = concat!(
            "data: {\"type\":\"progress\",\"percent\":10,\"message\":\"Analyzing...\"}\n\n",
            "data: {\"type\":\"token\",\"content\":\"Hello,\\n\\n\"}\n\n",
            "data: {\"type\":\"token\",\"content\":\"I can help.\\n\\n=====\\n{\\\"a\\\":1}\"}\n\n",
            "data: {\"type\":\"analysis_done\",\"analysis\":{\"job_summary\":\"Sure, I can help you\"}}\n\n",
            "data: {\"type\":\"done\"}\n\n",
            "data: {\"type\":\"usage\",\"input_tokens\":1,\"output_tokens\":2}\n\n",
        );
        let mut interpreter = Interpreter::default();
        let mut steps = Vec::new();
        for chunk in body.as_bytes().chunks(7) {
            steps.extend(interpreter.feed(chunk));
        }
        assert_eq!(steps.len(), 2);
        assert!(matches!(&steps[0], Step::Progress { percent: 10, .. }));
        let Step::Completed(result) = &steps[1] else {
            panic!("expected completion, got {:?}", steps[1]);
        };
        assert_eq!(result.letter.text, "Hello,\n\nI can help.");
        assert_eq!(
            result.analysis.as_ref().and_then(|a| a.job_summary.as_deref()),
            Some("Sure, I can help you")
        );
        assert!(result.usage.is_none());
        assert!(interpreter.feed(b"data: {\"type\":\"token\"}\n\n").is_empty());
    }

    #[test]
    fn interpreter_stops_at_error_within_one_chunk() {
        let mut interpreter = Interpreter::default();
        let steps = interpreter.feed(
            b"data: {\"type\":\"error\",\"message\":\"boom\"}\n\ndata: {\"type\":\"done\"}\n\n",
        );
        assert_eq!(
            steps,
            vec![Step::Failed {
                message: "boom".into()
            }]
        );
    }

    #[test]
    fn interpreter_discards_undelimited_tail() {
        let mut interpreter = Interpreter::default();
        assert!(interpreter.feed(b"data: {\"type\":\"done\"}").is_empty());
        assert_eq!(interpreter.finish(), "data: {\"type\":\"done\"}".len());
        assert!(!interpreter.accumulator().is_terminal());
    }
}
