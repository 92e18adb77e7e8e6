//! Generic line-buffered stream decoding.
//!
//! Both wire framings used by LLM backends are variations of the same
//! shape: a byte stream carrying delimiter-separated frames, each frame
//! optionally wrapped in a prefix, with the end of the response signalled
//! either by a sentinel payload (SSE `data: [DONE]`) or by a done flag
//! inside the payload itself (JSON Lines `"done": true`). [`decode_stream`]
//! implements the shared mechanics once — buffering, UTF-8 reassembly
//! across chunk boundaries, frame splitting, sentinel handling, aggregate
//! tracking — and delegates payload interpretation to an adapter-supplied
//! extractor.
//!
//! Malformed frames are logged and skipped, never fatal: one bad line in
//! an otherwise healthy stream must not cost the caller the rest of the
//! response. If the byte stream ends without an explicit terminator the
//! decoder emits the terminal event itself, so consumers always see
//! exactly one event with `is_complete = true`.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::error::RelayError;
use crate::stream::{CompletionStream, StreamEvent};

/// Maximum size for buffers before we abort the stream.
const MAX_BUF: usize = 16 * 1024 * 1024; // 16 MiB

/// Wire framing of a streaming response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSyntax {
    /// Byte sequence separating frames.
    pub delimiter: &'static str,
    /// Prefix identifying the payload line inside a frame. Frames
    /// without it (comments, keepalives) are ignored.
    pub prefix: Option<&'static str>,
    /// Payload that marks end-of-stream instead of carrying data.
    pub sentinel: Option<&'static str>,
}

impl FrameSyntax {
    /// JSON Lines: one JSON object per `\n`-terminated line, no prefix,
    /// termination signalled inside the payload.
    pub const fn json_lines() -> Self {
        Self {
            delimiter: "\n",
            prefix: None,
            sentinel: None,
        }
    }

    /// Server-sent events: `\n\n`-separated blocks, payload on the
    /// `data: ` line, `[DONE]` terminates the stream.
    pub const fn sse() -> Self {
        Self {
            delimiter: "\n\n",
            prefix: Some("data: "),
            sentinel: Some("[DONE]"),
        }
    }
}

/// What an extractor found in one frame payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// An incremental text delta.
    Delta(String),
    /// The payload marked the response finished.
    Done {
        /// A last text fragment carried alongside the done flag.
        content: Option<String>,
        /// Output token count reported by the backend.
        token_count: Option<u64>,
    },
    /// Nothing of interest (keepalive, empty delta).
    Empty,
    /// The payload could not be interpreted. Logged and skipped.
    Malformed(String),
}

/// Decodes a raw byte stream into a [`CompletionStream`].
///
/// `extract` is called once per complete frame payload (prefix already
/// stripped, sentinel already handled) and classifies it as a [`Frame`].
/// The decoder owns aggregation: every delta is appended to a running
/// aggregate, and the terminal event carries the full aggregate.
///
/// Frames arriving after the stream has finished are discarded. A
/// transport error surfaces as one `Err` item and ends decoding.
pub fn decode_stream<S, E, X>(input: S, syntax: FrameSyntax, extract: X) -> CompletionStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display,
    X: FnMut(&str) -> Frame + Send + 'static,
{
    let state = DecodeState {
        input: Box::pin(input),
        syntax,
        extract,
        buffer: String::new(),
        utf8_buf: Vec::new(),
        aggregate: String::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            match state.input.next().await {
                Some(Ok(bytes)) => state.ingest(&bytes),
                Some(Err(e)) => {
                    state.finished = true;
                    state.pending.push_back(Err(RelayError::Http {
                        status: None,
                        message: format!("stream read error: {e}"),
                        retryable: true,
                    }));
                }
                None => {
                    if state.finished && state.pending.is_empty() {
                        return None;
                    }
                    state.finish_at_eof();
                    if state.pending.is_empty() {
                        return None;
                    }
                }
            }
        }
    }))
}

struct DecodeState<S, X> {
    input: Pin<Box<S>>,
    syntax: FrameSyntax,
    extract: X,
    buffer: String,
    utf8_buf: Vec<u8>,
    aggregate: String,
    pending: VecDeque<Result<StreamEvent, RelayError>>,
    finished: bool,
}

impl<S, X> DecodeState<S, X>
where
    X: FnMut(&str) -> Frame,
{
    /// Appends a chunk, reassembling UTF-8 split across chunk
    /// boundaries, then drains every complete frame from the buffer.
    fn ingest(&mut self, bytes: &[u8]) {
        if self.finished {
            // Late data after the terminal event is discarded.
            return;
        }

        self.utf8_buf.extend_from_slice(bytes);
        if self.utf8_buf.len() > MAX_BUF || self.buffer.len() > MAX_BUF {
            self.utf8_buf.clear();
            self.buffer.clear();
            self.finished = true;
            self.pending.push_back(Err(RelayError::ResponseFormat {
                message: "stream buffer exceeded 16 MiB".into(),
                raw: String::new(),
            }));
            return;
        }

        match std::str::from_utf8(&self.utf8_buf) {
            Ok(text) => {
                self.buffer.push_str(text);
                self.utf8_buf.clear();
            }
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                if valid_up_to > 0 {
                    // SAFETY: `from_utf8` validated bytes up to this
                    // index are valid UTF-8.
                    let valid =
                        unsafe { std::str::from_utf8_unchecked(&self.utf8_buf[..valid_up_to]) };
                    self.buffer.push_str(valid);
                }
                if let Some(error_len) = e.error_len() {
                    // Skip past permanently invalid bytes.
                    self.utf8_buf.drain(..valid_up_to + error_len);
                } else {
                    // Incomplete sequence at the tail; keep it for the
                    // next chunk.
                    self.utf8_buf.drain(..valid_up_to);
                }
            }
        }

        while let Some(pos) = self.buffer.find(self.syntax.delimiter) {
            let frame: String = self.buffer[..pos].into();
            self.buffer.drain(..pos + self.syntax.delimiter.len());
            self.handle_frame(&frame);
            if self.finished {
                self.buffer.clear();
                break;
            }
        }
    }

    /// Interprets one complete frame.
    fn handle_frame(&mut self, frame: &str) {
        let Some(payload) = extract_payload(frame, self.syntax.prefix) else {
            return;
        };

        if self.syntax.sentinel == Some(payload) {
            self.finish(None);
            return;
        }

        match (self.extract)(payload) {
            Frame::Delta(text) => {
                if !text.is_empty() {
                    self.aggregate.push_str(&text);
                    self.pending.push_back(Ok(StreamEvent::delta(text)));
                }
            }
            Frame::Done {
                content,
                token_count,
            } => {
                if let Some(text) = content {
                    if !text.is_empty() {
                        self.aggregate.push_str(&text);
                        self.pending.push_back(Ok(StreamEvent::delta(text)));
                    }
                }
                self.finish(token_count);
            }
            Frame::Empty => {}
            Frame::Malformed(message) => {
                tracing::warn!(error = %message, "skipping malformed stream frame");
            }
        }
    }

    /// Emits the terminal event carrying the full aggregate.
    fn finish(&mut self, token_count: Option<u64>) {
        self.finished = true;
        let content = std::mem::take(&mut self.aggregate);
        self.pending
            .push_back(Ok(StreamEvent::complete(content, token_count)));
    }

    /// Handles the byte stream ending without an explicit terminator:
    /// any unterminated trailing frame is processed, then the terminal
    /// event is emitted implicitly.
    fn finish_at_eof(&mut self) {
        if self.finished {
            return;
        }
        if !self.buffer.is_empty() {
            let trailing = std::mem::take(&mut self.buffer);
            self.handle_frame(trailing.trim_end_matches('\r'));
        }
        if !self.finished {
            self.finish(None);
        }
    }
}

/// Pulls the payload out of a frame: strips the prefix line for SSE,
/// trims the line ending for JSON Lines. `None` means the frame carries
/// no payload at all.
fn extract_payload<'a>(frame: &'a str, prefix: Option<&str>) -> Option<&'a str> {
    match prefix {
        Some(prefix) => frame
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .find_map(|line| line.strip_prefix(prefix)),
        None => {
            let line = frame.trim_end_matches('\r');
            (!line.is_empty()).then_some(line)
        }
    }
}
