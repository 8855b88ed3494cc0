use std::collections::VecDeque;

use futures::StreamExt as _;
use futures::stream;
use tracing::debug;

use crate::config::RecordDelimiter;
use crate::errors::TransportError;
use crate::transport::ByteStream;

/// One delimiter-terminated unit of the response body, reduced to its payload.
///
/// `data` is the newline-joined concatenation of every prefixed line in the
/// record, with the prefix stripped and each value trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub data: String,
}

/// Incremental record decoder.
///
/// Bytes are buffered undecoded and only turned into text once a whole record
/// has been delimited, so chunks that end inside a multi-byte character are
/// never decoded on their own.
#[derive(Debug, Clone)]
pub struct RecordDecoder {
    buf: Vec<u8>,
    /// Prefix of `buf` already searched for a delimiter.
    scanned: usize,
    delimiter: RecordDelimiter,
    prefix: String,
}

impl Default for RecordDecoder {
    fn default() -> Self {
        Self::new(RecordDelimiter::default(), "data:")
    }
}

impl RecordDecoder {
    /// Creates a decoder splitting on `delimiter` and keeping lines that
    /// start with `prefix`.
    pub fn new(delimiter: RecordDelimiter, prefix: impl Into<String>) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            delimiter,
            prefix: prefix.into(),
        }
    }

    /// Appends a chunk and returns every record completed by it.
    ///
    /// A trailing partial record stays buffered for the next call.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<Record> {
        self.buf.extend_from_slice(chunk);
        let mut records = Vec::new();
        // A delimiter can straddle the previous end of the buffer by up to
        // three bytes.
        let mut start = self.scanned.saturating_sub(3);
        while let Some((idx, delim_len)) = find_record_delimiter(&self.buf, start, self.delimiter) {
            let record_bytes: Vec<u8> = self.buf.drain(..idx + delim_len).take(idx).collect();
            if let Some(record) = parse_record(&record_bytes, &self.prefix) {
                records.push(record);
            }
            start = 0;
        }
        self.scanned = self.buf.len();
        records
    }

    /// Number of buffered bytes not yet resolved into a record.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Ends the stream. Undelimited leftover bytes are dropped, never emitted.
    ///
    /// Returns how many bytes were discarded.
    pub fn finish(&mut self) -> usize {
        let dropped = self.buf.len();
        if dropped > 0 {
            debug!(dropped_bytes = dropped, "discarding undelimited trailing record");
        }
        self.buf.clear();
        self.scanned = 0;
        dropped
    }
}

fn find_record_delimiter(
    buf: &[u8],
    start: usize,
    delimiter: RecordDelimiter,
) -> Option<(usize, usize)> {
    let start = start.min(buf.len());
    match delimiter {
        RecordDelimiter::Newline => buf[start..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|i| (start + i, 1)),
        RecordDelimiter::BlankLine => {
            let mut i = start;
            while i + 1 < buf.len() {
                if buf[i] == b'\n' && buf[i + 1] == b'\n' {
                    return Some((i, 2));
                }
                if i + 3 < buf.len()
                    && buf[i] == b'\r'
                    && buf[i + 1] == b'\n'
                    && buf[i + 2] == b'\r'
                    && buf[i + 3] == b'\n'
                {
                    return Some((i, 4));
                }
                i += 1;
            }
            None
        }
    }
}

fn parse_record(bytes: &[u8], prefix: &str) -> Option<Record> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    let data_lines: Vec<&str> = text
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter_map(|line| line.strip_prefix(prefix))
        .map(str::trim)
        .collect();
    if data_lines.is_empty() {
        return None;
    }
    Some(Record {
        data: data_lines.join("\n"),
    })
}

/// Adapts a byte stream into a stream of complete records.
///
/// Reading the next chunk is the only suspension point. When the byte stream
/// ends, any undelimited leftover is discarded and the record stream ends.
pub fn record_stream(
    bytes: ByteStream,
    decoder: RecordDecoder,
) -> impl futures::Stream<Item = Result<Record, TransportError>> + Send {
    struct State {
        bytes: ByteStream,
        decoder: RecordDecoder,
        pending: VecDeque<Record>,
        done: bool,
    }

    stream::try_unfold(
        State {
            bytes,
            decoder,
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(record) = state.pending.pop_front() {
                    return Ok(Some((record, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        state.pending.extend(state.decoder.push_chunk(&chunk));
                    }
                    Some(Err(err)) => return Err(err),
                    None => {
                        state.decoder.finish();
                        state.done = true;
                    }
                }
            }
        },
    )
}
