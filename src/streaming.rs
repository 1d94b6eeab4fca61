//! Incremental decoding of the completion event stream.
//!
//! The completion endpoint answers with server-sent events, one JSON frame
//! per `data:` line, closed by a `[DONE]` marker:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"hello"}}]}
//! data: {"choices":[{"delta":{"content":" world"}}]}
//! data: [DONE]
//! ```
//!
//! A request the service rejects may instead produce a bare error envelope:
//!
//! ```text
//! {"error":{"code":"model_not_supported","message":"...","param":"model","type":"invalid_request_error"}}
//! ```
//!
//! [`StreamDecoder`] is a line-driven state machine:
//!
//! ```text
//!              ┌──── error envelope ────▶ ErrorDetected
//!  Scanning ───┤
//!              └──── [DONE] ───────────▶ Done
//! ```
//!
//! Every content-bearing line yields a progress event carrying the whole
//! reply so far. Once reading stops, for whatever reason, exactly one final
//! event with `done = true` follows. Lines that are not valid JSON are
//! skipped rather than failing the turn.

use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::events::StreamEvent;

pub const DATA_PREFIX: &str = "data:";
pub const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Scanning,
    ErrorDetected,
    Done,
}

#[derive(Deserialize)]
struct ChunkFrame {
    #[serde(default)]
    choices: Vec<ChoiceFrame>,
}

#[derive(Deserialize)]
struct ChoiceFrame {
    #[serde(default)]
    delta: Option<DeltaFrame>,
}

#[derive(Deserialize)]
struct DeltaFrame {
    #[serde(default)]
    content: Option<String>,
}

/// Structured error the service sends in place of a stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    pub message: String,
    #[serde(default)]
    pub param: Option<serde_json::Value>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// Remove a leading `data:` (and one following space). Other input is
/// returned unchanged.
pub fn strip_data_prefix(line: &str) -> &str {
    match line.strip_prefix(DATA_PREFIX) {
        Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
        None => line,
    }
}

/// Parse `line` as an error envelope, with or without the data prefix.
pub fn parse_error_envelope(line: &str) -> Option<ErrorEnvelope> {
    let candidate = strip_data_prefix(line);
    if !candidate.starts_with('{') || !candidate.contains("\"error\"") {
        return None;
    }
    serde_json::from_str(candidate).ok()
}

/// Line-driven decoder for one completion response.
#[derive(Debug)]
pub struct StreamDecoder {
    reply: String,
    state: DecoderState,
    interrupted: Option<String>,
    progress_events: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            reply: String::new(),
            state: DecoderState::Scanning,
            interrupted: None,
            progress_events: 0,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Reply accumulated so far
    pub fn reply(&self) -> &str {
        &self.reply
    }

    pub fn progress_events(&self) -> usize {
        self.progress_events
    }

    /// No further lines are consumed once this is true.
    pub fn is_finished(&self) -> bool {
        self.state != DecoderState::Scanning || self.interrupted.is_some()
    }

    /// Consume one line. Returns a progress event when the line carried
    /// content.
    pub fn push_line(&mut self, raw: &str) -> Option<StreamEvent> {
        if self.is_finished() {
            return None;
        }

        let line = raw.trim();

        if let Some(envelope) = parse_error_envelope(line) {
            warn!(
                code = ?envelope.error.code,
                kind = ?envelope.error.kind,
                message = %envelope.error.message,
                "Completion endpoint returned an error"
            );
            self.reply = envelope.error.message;
            self.state = DecoderState::ErrorDetected;
            return None;
        }

        if line.starts_with(DONE_MARKER) {
            debug!("Received [DONE] marker");
            self.state = DecoderState::Done;
            return None;
        }

        if !line.starts_with(DATA_PREFIX) {
            return None;
        }

        let data = strip_data_prefix(line).trim_start();
        if data == DONE_MARKER {
            debug!("Received data: [DONE]");
            self.state = DecoderState::Done;
            return None;
        }

        let frame: ChunkFrame = match serde_json::from_str(data) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, data = %data, "Skipping malformed frame");
                return None;
            }
        };

        let content = frame
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty())?;

        trace!(delta = %content, "Received content delta");
        self.reply.push_str(&content);
        self.progress_events += 1;
        Some(StreamEvent::progress(self.reply.clone()))
    }

    /// Stop decoding because the body could not be read any further.
    pub fn interrupt(&mut self, reason: impl Into<String>) {
        if !self.is_finished() {
            self.interrupted = Some(reason.into());
        }
    }

    /// The final event: accumulated reply (or error text) with `done = true`.
    pub fn finish(self) -> StreamEvent {
        match (self.state, self.interrupted) {
            (DecoderState::ErrorDetected, _) => StreamEvent::finished(self.reply, true),
            (_, Some(reason)) if self.reply.is_empty() => StreamEvent::finished(reason, true),
            (_, Some(_)) => StreamEvent::finished(self.reply, true),
            _ => StreamEvent::finished(self.reply, false),
        }
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode an already split sequence of lines, returning the final reply.
pub fn decode_lines<I, S, F>(lines: I, mut on_event: F) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: FnMut(StreamEvent),
{
    let mut decoder = StreamDecoder::new();

    for line in lines {
        if let Some(event) = decoder.push_line(line.as_ref()) {
            on_event(event);
        }
        if decoder.is_finished() {
            break;
        }
    }

    emit_final(decoder, &mut on_event)
}

/// Decode a response body delivered as byte chunks.
///
/// Chunks may split lines, and UTF-8 sequences, anywhere; lines are cut on
/// raw bytes before conversion. A read error or a silence longer than
/// `read_timeout` ends the decode with an error-flagged final event.
pub async fn decode_stream<S, B, E, F>(
    stream: S,
    read_timeout: Option<Duration>,
    mut on_event: F,
) -> String
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
    F: FnMut(StreamEvent),
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = StreamDecoder::new();
    let mut buffer: Vec<u8> = Vec::new();

    'read: loop {
        let next = match read_timeout {
            Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(timeout_secs = limit.as_secs(), "Stream read timed out");
                    decoder.interrupt(format!(
                        "no data received for {} seconds",
                        limit.as_secs()
                    ));
                    break;
                }
            },
            None => stream.next().await,
        };

        match next {
            None => break,
            Some(Err(e)) => {
                warn!(error = %e, "Stream read failed");
                decoder.interrupt(format!("stream interrupted: {}", e));
                break;
            }
            Some(Ok(chunk)) => {
                buffer.extend_from_slice(chunk.as_ref());

                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    if let Some(event) = decoder.push_line(&String::from_utf8_lossy(&line)) {
                        on_event(event);
                    }
                    if decoder.is_finished() {
                        break 'read;
                    }
                }
            }
        }
    }

    // Body ended without a trailing newline.
    if !decoder.is_finished() && !buffer.is_empty() {
        if let Some(event) = decoder.push_line(&String::from_utf8_lossy(&buffer)) {
            on_event(event);
        }
    }

    emit_final(decoder, &mut on_event)
}

fn emit_final<F>(decoder: StreamDecoder, on_event: &mut F) -> String
where
    F: FnMut(StreamEvent),
{
    debug!(
        state = ?decoder.state(),
        progress_events = decoder.progress_events(),
        reply_len = decoder.reply().len(),
        "Stream decode finished"
    );
    let event = decoder.finish();
    let reply = event.text.clone();
    on_event(event);
    reply
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(content: &str) -> String {
        format!(
            "data: {}",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    fn collect(input: &str) -> (String, Vec<StreamEvent>) {
        let mut events = Vec::new();
        let reply = decode_lines(input.lines(), |event| events.push(event));
        (reply, events)
    }

    #[test]
    fn test_strip_data_prefix() {
        assert_eq!(
            strip_data_prefix(r#"data: {"choices":[{"delta":{"content":"hello"}}]}"#),
            r#"{"choices":[{"delta":{"content":"hello"}}]}"#
        );
        assert_eq!(
            strip_data_prefix(r#"{"choices":[{"delta":{"content":"hello"}}]}"#),
            r#"{"choices":[{"delta":{"content":"hello"}}]}"#
        );
        assert_eq!(strip_data_prefix("data:X"), "X");
        assert_eq!(strip_data_prefix("foo"), "foo");
        assert_eq!(strip_data_prefix(""), "");
    }

    #[test]
    fn test_decode_full_reply_with_noise() {
        let input = r#"
		data: {"choices":[{"delta":{"content":"hello"}}]}
		data: {"choices":[{"delta":{"content":" "}}]}
		data: {"choices":[{"delta":{"content":"from"}}]}
		\n
		data: {"choices":[{"delta":{"content":" "}}]}
		data: {"choices":[{"delta":{"content":"here."}}]}
		data: {"choices":[{"delta":{"content":"\n"}}]}
		data: {"choices":[{"delta":{"content":"Bye!"}}]}

		[DONE]
		"#;

        let (reply, events) = collect(input);

        assert_eq!(reply, "hello from here.\nBye!");
        assert_eq!(events.len(), 8);
        assert!(events[..7].iter().all(|e| !e.done && !e.is_error));
        assert_eq!(events[7], StreamEvent::finished("hello from here.\nBye!", false));
    }

    #[test]
    fn test_done_marker_stops_reading() {
        let input = r#"
		data: {"choices":[{"delta":{"content":"hello"}}]}
		[DONE]
		data: {"choices":[{"delta":{"content":" "}}]}
		data: {"choices":[{"delta":{"content":"from"}}]}
		"#;

        let (reply, events) = collect(input);

        assert_eq!(reply, "hello");
        assert_eq!(events.len(), 2);
        assert!(events[1].done);
    }

    #[test]
    fn test_empty_input_emits_only_final_event() {
        let (reply, events) = collect("");
        assert_eq!(reply, "");
        assert_eq!(events, vec![StreamEvent::finished("", false)]);
    }

    #[test]
    fn test_running_concatenation_without_space_after_prefix() {
        let lines = [
            r#"data:{"choices":[{"delta":{"content":"hello"}}]}"#,
            r#"data:{"choices":[{"delta":{"content":" "}}]}"#,
            r#"data:{"choices":[{"delta":{"content":"world"}}]}"#,
            "data: [DONE]",
        ];
        let mut events = Vec::new();

        let reply = decode_lines(lines, |event| events.push(event));

        assert_eq!(reply, "hello world");
        let texts: Vec<&str> = events.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, ["hello", "hello ", "hello world", "hello world"]);
        assert_eq!(events.iter().filter(|e| e.done).count(), 1);
        assert!(events.last().unwrap().done);
    }

    #[test]
    fn test_error_envelope_short_circuits() {
        let input = [
            frame("partial"),
            r#"{"error":{"code":"model_not_supported","message":"The requested model is not supported.","param":"model","type":"invalid_request_error"}}"#.to_string(),
            frame("ignored"),
            "[DONE]".to_string(),
        ];
        let mut events = Vec::new();

        let reply = decode_lines(&input, |event| events.push(event));

        assert_eq!(reply, "The requested model is not supported.");
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            StreamEvent::finished("The requested model is not supported.", true)
        );
    }

    #[test]
    fn test_error_envelope_behind_data_prefix() {
        let envelope = parse_error_envelope(
            r#"data: {"error":{"code":null,"message":"quota exceeded","param":null,"type":"rate_limit"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.error.message, "quota exceeded");
        assert_eq!(envelope.error.kind.as_deref(), Some("rate_limit"));

        assert!(parse_error_envelope(&frame("error")).is_none());
    }

    #[test]
    fn test_malformed_and_null_frames_are_skipped() {
        let input = [
            frame("a"),
            "data: {not json".to_string(),
            r#"data: {"choices":[{"delta":{"content":null,"role":"assistant"}}]}"#.to_string(),
            r#"data: {"choices":[]}"#.to_string(),
            ": keep-alive".to_string(),
            frame("b"),
        ];
        let mut events = Vec::new();

        let reply = decode_lines(&input, |event| events.push(event));

        assert_eq!(reply, "ab");
        assert_eq!(events.len(), 3);
        assert!(!events[2].is_error);
    }

    #[test]
    fn test_empty_delta_yields_no_progress() {
        let mut decoder = StreamDecoder::new();
        assert_eq!(decoder.push_line(&frame("he")), Some(StreamEvent::progress("he")));

        assert!(decoder.push_line(&frame("")).is_none());
        assert_eq!(decoder.progress_events(), 1);
        assert_eq!(decoder.reply(), "he");

        assert_eq!(decoder.push_line(&frame("y")), Some(StreamEvent::progress("hey")));
    }

    #[test]
    fn test_no_lines_consumed_after_done() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder.push_line("[DONE]").is_none());
        assert_eq!(decoder.state(), DecoderState::Done);
        assert!(decoder.push_line(&frame("late")).is_none());
        assert_eq!(decoder.reply(), "");
    }

    #[tokio::test]
    async fn test_decode_stream_reassembles_split_chunks() {
        let body = format!("{}\n\n{}\n{}\ndata: [DONE]\n", frame("héllo"), frame(", "), frame("wörld"));
        let bytes = body.into_bytes();
        // Cut inside the first multi-byte character and inside later frames.
        let cut_a = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(bytes[..cut_a].to_vec()),
            Ok(bytes[cut_a..cut_a + 20].to_vec()),
            Ok(bytes[cut_a + 20..].to_vec()),
        ];

        let mut events = Vec::new();
        let reply = decode_stream(futures::stream::iter(chunks), None, |e| events.push(e)).await;

        assert_eq!(reply, "héllo, wörld");
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].text, "héllo");
        assert!(events[3].done && !events[3].is_error);
    }

    #[tokio::test]
    async fn test_decode_stream_flushes_trailing_line() {
        let chunks: Vec<Result<String, std::io::Error>> = vec![Ok(frame("tail"))];

        let mut events = Vec::new();
        let reply = decode_stream(futures::stream::iter(chunks), None, |e| events.push(e)).await;

        assert_eq!(reply, "tail");
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_decode_stream_read_error_flags_final_event() {
        let chunks: Vec<Result<String, std::io::Error>> = vec![
            Ok(format!("{}\n", frame("partial"))),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(format!("{}\n", frame("never"))),
        ];

        let mut events = Vec::new();
        let reply = decode_stream(futures::stream::iter(chunks), None, |e| events.push(e)).await;

        assert_eq!(reply, "partial");
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], StreamEvent::finished("partial", true));
    }

    #[tokio::test]
    async fn test_decode_stream_idle_timeout() {
        let stream = futures::stream::pending::<Result<Vec<u8>, std::io::Error>>();

        let mut events = Vec::new();
        let reply = decode_stream(stream, Some(Duration::from_millis(20)), |e| events.push(e)).await;

        assert!(reply.contains("no data received"));
        assert_eq!(events.len(), 1);
        assert!(events[0].done && events[0].is_error);
    }
}
