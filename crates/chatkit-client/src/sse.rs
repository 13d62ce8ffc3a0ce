//! Incremental decoder for the newline-delimited `data: <json>` protocol.
//!
//! Chunks arrive with arbitrary boundaries, including mid-line and inside a
//! multi-byte UTF-8 character. The decoder buffers raw bytes and only decodes
//! complete lines: a `\n` byte can never split a UTF-8 scalar, so per-line
//! decoding yields the same events for any re-chunking of the same stream.

use serde_json::Value;
use tracing::debug;

use crate::events::MessageMeta;

const DATA_PREFIX: &str = "data: ";

/// One decoded unit of the wire protocol, before dispatch.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum WireEvent {
    /// Incremental answer text from a `message` event.
    Delta { answer: String, meta: MessageMeta },
    /// Recovered parse failure: a chunk boundary fell inside a JSON value.
    /// Carries the ids of the last successfully parsed event so the consumer
    /// keeps its bearings.
    Partial { meta: MessageMeta },
    /// `agent_thought` payload, verbatim.
    Thought(Value),
    /// `message_end` payload, verbatim.
    MessageEnd(Value),
    /// Terminal in-stream application error: a status-400-shaped payload or
    /// one with no event tag inside an otherwise successful response.
    Error {
        message: String,
        code: Option<String>,
    },
}

/// Stream cursor for one session: pending bytes plus the ids of the last
/// successfully parsed event.
#[derive(Debug, Default)]
pub(crate) struct StreamDecoder {
    buf: Vec<u8>,
    last_meta: MessageMeta,
}

impl StreamDecoder {
    /// Appends a chunk and returns the events decoded from every line it
    /// completed. The trailing unterminated fragment stays buffered.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<WireEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(idx) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=idx).collect();
            if let Some(event) = self.decode_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }
        events
    }

    /// End-of-stream flush. The producer may omit the final newline; stream
    /// end acts as the line terminator for whatever is still buffered.
    pub fn finish(&mut self) -> Option<WireEvent> {
        if self.buf.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buf);
        self.decode_line(&line)
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<WireEvent> {
        let text = String::from_utf8_lossy(line);
        let text = text.trim_end_matches('\r');
        // Non-data lines (blank keep-alives, other SSE fields) carry nothing.
        let data = text.strip_prefix(DATA_PREFIX)?;
        let value: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(_) => {
                debug!(len = data.len(), "unparseable stream line, emitting partial");
                return Some(WireEvent::Partial {
                    meta: MessageMeta {
                        conversation_id: self.last_meta.conversation_id.clone(),
                        task_id: None,
                        message_id: self.last_meta.message_id.clone(),
                    },
                });
            }
        };

        let meta = MessageMeta {
            conversation_id: string_field(&value, "conversation_id"),
            task_id: string_field(&value, "task_id"),
            message_id: string_field(&value, "id"),
        };
        self.last_meta = meta.clone();

        let Some(event) = value.get("event").and_then(Value::as_str) else {
            // A payload without an event tag is the protocol's in-stream
            // error shape, as is an explicit client-error status.
            return Some(error_event(&value));
        };
        if value.get("status").and_then(Value::as_i64) == Some(400) {
            return Some(error_event(&value));
        }

        match event {
            "message" => {
                let answer = value
                    .get("answer")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Some(WireEvent::Delta { answer, meta })
            }
            "agent_thought" => Some(WireEvent::Thought(value)),
            "message_end" => Some(WireEvent::MessageEnd(value)),
            // Unknown tags are ignored so new server events don't break us.
            _ => None,
        }
    }
}

fn error_event(value: &Value) -> WireEvent {
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown stream error")
        .to_string();
    let code = value
        .get("code")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned);
    WireEvent::Error { message, code }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(ToOwned::to_owned)
}

/// Converts literal `\uXXXX` escape sequences back to characters.
///
/// Answer text may arrive double-encoded. Runs of adjacent escapes are
/// decoded together as UTF-16 so surrogate pairs come out as the single
/// character they encode; an unpaired surrogate becomes U+FFFD.
pub fn decode_unicode_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("\\u") {
        let (head, tail) = rest.split_at(pos);
        out.push_str(head);

        let mut units: Vec<u16> = Vec::new();
        let mut cursor = tail;
        while let Some(stripped) = cursor.strip_prefix("\\u") {
            let Some(hex) = stripped.get(..4) else { break };
            if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                break;
            }
            match u16::from_str_radix(hex, 16) {
                Ok(unit) => units.push(unit),
                Err(_) => break,
            }
            cursor = &stripped[4..];
        }

        if units.is_empty() {
            // `\u` without four hex digits is left verbatim.
            out.push_str("\\u");
            rest = &tail[2..];
        } else {
            for decoded in char::decode_utf16(units) {
                out.push(decoded.unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            rest = cursor;
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut StreamDecoder, bytes: &[u8]) -> Vec<WireEvent> {
        let mut events = decoder.push_chunk(bytes);
        events.extend(decoder.finish());
        events
    }

    #[test]
    fn decodes_message_thought_and_end_events() {
        let mut decoder = StreamDecoder::default();
        let input = concat!(
            "data: {\"event\":\"message\",\"answer\":\"hi\",\"conversation_id\":\"c1\",\"task_id\":\"t1\",\"id\":\"m1\"}\n",
            "data: {\"event\":\"agent_thought\",\"thought\":\"looking\"}\n",
            "data: {\"event\":\"message_end\",\"metadata\":{}}\n",
        );
        let events = decoder.push_chunk(input.as_bytes());
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            WireEvent::Delta {
                answer: "hi".into(),
                meta: MessageMeta {
                    conversation_id: Some("c1".into()),
                    task_id: Some("t1".into()),
                    message_id: Some("m1".into()),
                },
            }
        );
        assert!(matches!(events[1], WireEvent::Thought(_)));
        assert!(matches!(events[2], WireEvent::MessageEnd(_)));
    }

    #[test]
    fn non_data_lines_produce_no_events() {
        let mut decoder = StreamDecoder::default();
        let events = decoder.push_chunk(b"\n: keep-alive\nevent: ping\n");
        assert!(events.is_empty());
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn unknown_event_tags_are_ignored() {
        let mut decoder = StreamDecoder::default();
        let events = decoder.push_chunk(b"data: {\"event\":\"tts_chunk\",\"audio\":\"...\"}\n");
        assert!(events.is_empty());
    }

    #[test]
    fn status_400_payload_is_a_terminal_error() {
        let mut decoder = StreamDecoder::default();
        let events = decoder
            .push_chunk(b"data: {\"status\":400,\"message\":\"bad input\",\"code\":\"E1\"}\n");
        assert_eq!(
            events,
            vec![WireEvent::Error {
                message: "bad input".into(),
                code: Some("E1".into()),
            }]
        );
    }

    #[test]
    fn payload_without_event_tag_is_a_terminal_error() {
        let mut decoder = StreamDecoder::default();
        let events = decoder.push_chunk(b"data: {\"message\":\"nope\"}\n");
        assert_eq!(
            events,
            vec![WireEvent::Error {
                message: "nope".into(),
                code: None,
            }]
        );
    }

    #[test]
    fn parse_failure_emits_partial_with_last_known_ids() {
        let mut decoder = StreamDecoder::default();
        let good = b"data: {\"event\":\"message\",\"answer\":\"a\",\"conversation_id\":\"c1\",\"id\":\"m1\"}\n";
        decoder.push_chunk(good);
        let events = decoder.push_chunk(b"data: {\"event\":\"mess\n");
        assert_eq!(
            events,
            vec![WireEvent::Partial {
                meta: MessageMeta {
                    conversation_id: Some("c1".into()),
                    task_id: None,
                    message_id: Some("m1".into()),
                },
            }]
        );
    }

    #[test]
    fn chunk_boundaries_do_not_change_the_event_sequence() {
        let input = concat!(
            "data: {\"event\":\"message\",\"answer\":\"héllo\",\"conversation_id\":\"c1\",\"id\":\"m1\"}\n",
            ": keep-alive\n",
            "data: {\"event\":\"message\",\"answer\":\"wörld\",\"conversation_id\":\"c1\",\"id\":\"m1\"}\n",
            "data: {\"event\":\"message_end\",\"metadata\":{}}\n",
        )
        .as_bytes();

        let mut whole = StreamDecoder::default();
        let expected = decode_all(&mut whole, input);
        assert_eq!(expected.len(), 3);

        // Every chunk size splits somewhere interesting, including inside
        // the two-byte UTF-8 characters and mid-JSON.
        for size in 1..=7 {
            let mut decoder = StreamDecoder::default();
            let mut events = Vec::new();
            for chunk in input.chunks(size) {
                events.extend(decoder.push_chunk(chunk));
            }
            events.extend(decoder.finish());
            assert_eq!(events, expected, "chunk size {size}");
        }
    }

    #[test]
    fn stream_end_terminates_an_unterminated_final_line() {
        let mut decoder = StreamDecoder::default();
        let events =
            decoder.push_chunk(b"data: {\"event\":\"message\",\"answer\":\"tail\",\"id\":\"m9\"}");
        assert!(events.is_empty());
        let flushed = decoder.finish().expect("flushed event");
        assert!(matches!(flushed, WireEvent::Delta { ref answer, .. } if answer == "tail"));
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn unicode_escapes_round_trip() {
        assert_eq!(decode_unicode_escapes("\\u4f60\\u597d"), "你好");
        assert_eq!(decode_unicode_escapes("plain"), "plain");
        assert_eq!(decode_unicode_escapes("a\\u0062c"), "abc");
        // Surrogate pair for U+1F600.
        assert_eq!(decode_unicode_escapes("\\ud83d\\ude00"), "😀");
        // Malformed escapes are left verbatim.
        assert_eq!(decode_unicode_escapes("\\u12"), "\\u12");
        assert_eq!(decode_unicode_escapes("\\uzzzz"), "\\uzzzz");
    }
}
