//! State machine for normalizing Anthropic stream events into OpenAI-style SSE frames.
//!
//! The [`StreamNormalizer`] consumes Anthropic events one at a time. Each text
//! delta becomes exactly one `data: <chunk>\n\n` frame. Every other event is
//! dropped. A clean end of stream yields the `data: [DONE]\n\n` frame; a failure
//! yields none.

use bytes::Bytes;

use super::anthropic_types::{Delta, StreamEvent};
use super::openai_types::ChatCompletionChunk;
use crate::config::ChunkIdMode;
use crate::error::{ProxyError, Result};

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Frame one SSE data payload.
pub fn data_frame(payload: &str) -> Bytes {
    Bytes::from(format!("data: {}\n\n", payload))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizerState {
    AwaitingEvent,
    /// Held while a text delta is turned into a frame.
    EmittingChunk,
    StreamEnded,
    StreamErrored,
}

impl NormalizerState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::StreamEnded | Self::StreamErrored)
    }
}

/// What happened to one upstream event.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Frame(Bytes),
    /// Not a text delta; carries the event name for logging.
    Dropped(&'static str),
}

/// Usage:
///   let mut normalizer = StreamNormalizer::new("claude-3-opus", ChunkIdMode::PerChunk);
///   for data in upstream_payloads {
///       match normalizer.process_data(&data)? { ... }
///   }
///   let done = normalizer.finish();
#[derive(Debug)]
pub struct StreamNormalizer {
    model: String,
    id_mode: ChunkIdMode,
    response_id: String,
    state: NormalizerState,
    frames_emitted: usize,
    events_dropped: usize,
}

impl StreamNormalizer {
    pub fn new(model: &str, id_mode: ChunkIdMode) -> Self {
        Self {
            model: model.to_string(),
            id_mode,
            response_id: new_chunk_id(),
            state: NormalizerState::AwaitingEvent,
            frames_emitted: 0,
            events_dropped: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> NormalizerState {
        self.state
    }

    #[must_use]
    pub fn frames_emitted(&self) -> usize {
        self.frames_emitted
    }

    #[must_use]
    pub fn events_dropped(&self) -> usize {
        self.events_dropped
    }

    /// Decode one SSE `data` payload and process it. Payloads that are not
    /// valid Anthropic events are dropped like any other non-text event.
    pub fn process_data(&mut self, data: &str) -> Result<Outcome> {
        match serde_json::from_str::<StreamEvent>(data) {
            Ok(event) => self.process_event(&event),
            Err(_) if self.state.is_terminal() => Ok(Outcome::Dropped("after_end")),
            Err(_) => {
                self.events_dropped += 1;
                Ok(Outcome::Dropped("unparseable"))
            }
        }
    }

    pub fn process_event(&mut self, event: &StreamEvent) -> Result<Outcome> {
        if self.state.is_terminal() {
            return Ok(Outcome::Dropped("after_end"));
        }

        match event {
            StreamEvent::ContentBlockDelta {
                delta: Delta::TextDelta { text },
                ..
            } => {
                self.state = NormalizerState::EmittingChunk;
                let chunk = ChatCompletionChunk::assistant_text(self.chunk_id(), &self.model, text);
                let json = match serde_json::to_string(&chunk) {
                    Ok(json) => json,
                    Err(e) => {
                        self.state = NormalizerState::StreamErrored;
                        return Err(e.into());
                    }
                };
                self.frames_emitted += 1;
                self.state = NormalizerState::AwaitingEvent;
                Ok(Outcome::Frame(data_frame(&json)))
            }
            StreamEvent::Error { error } => {
                self.state = NormalizerState::StreamErrored;
                Err(ProxyError::provider(error.describe()))
            }
            other => {
                self.events_dropped += 1;
                Ok(Outcome::Dropped(other.event_name()))
            }
        }
    }

    /// The upstream closed normally. Returns the terminal frame unless the
    /// stream already ended or failed.
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.state.is_terminal() {
            return None;
        }
        self.state = NormalizerState::StreamEnded;
        Some(Bytes::from_static(DONE_FRAME.as_bytes()))
    }

    /// The upstream failed outside the event payloads (transport error).
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = NormalizerState::StreamErrored;
        }
    }

    fn chunk_id(&self) -> String {
        match self.id_mode {
            ChunkIdMode::PerChunk => new_chunk_id(),
            ChunkIdMode::PerResponse => self.response_id.clone(),
        }
    }
}

fn new_chunk_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE_START: &str = r#"{"type":"message_start","message":{"id":"msg_1","type":"message","role":"assistant","content":[],"model":"claude-3-opus-20240229","usage":{"input_tokens":10,"output_tokens":1}}}"#;
    const BLOCK_START: &str =
        r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#;
    const PING: &str = r#"{"type":"ping"}"#;
    const BLOCK_STOP: &str = r#"{"type":"content_block_stop","index":0}"#;
    const MESSAGE_DELTA: &str = r#"{"type":"message_delta","delta":{"stop_reason":"end_turn","stop_sequence":null},"usage":{"output_tokens":5}}"#;
    const MESSAGE_STOP: &str = r#"{"type":"message_stop"}"#;

    fn text_delta(text: &str) -> String {
        serde_json::json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": { "type": "text_delta", "text": text }
        })
        .to_string()
    }

    fn frame_chunk(frame: &Bytes) -> ChatCompletionChunk {
        let s = std::str::from_utf8(frame).unwrap();
        let payload = s
            .strip_prefix("data: ")
            .and_then(|p| p.strip_suffix("\n\n"))
            .unwrap();
        serde_json::from_str(payload).unwrap()
    }

    fn frames(outcomes: Vec<Outcome>) -> Vec<Bytes> {
        outcomes
            .into_iter()
            .filter_map(|o| match o {
                Outcome::Frame(f) => Some(f),
                Outcome::Dropped(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_only_text_deltas_produce_frames() {
        let mut normalizer = StreamNormalizer::new("claude-3-opus", ChunkIdMode::PerChunk);
        let payloads = vec![
            MESSAGE_START.to_string(),
            BLOCK_START.to_string(),
            PING.to_string(),
            text_delta("Hello"),
            text_delta(", "),
            text_delta("world"),
            BLOCK_STOP.to_string(),
            MESSAGE_DELTA.to_string(),
            MESSAGE_STOP.to_string(),
        ];

        let outcomes: Vec<Outcome> = payloads
            .iter()
            .map(|p| normalizer.process_data(p).unwrap())
            .collect();
        let frames = frames(outcomes);

        assert_eq!(frames.len(), 3);
        let texts: Vec<String> = frames
            .iter()
            .map(|f| frame_chunk(f).text().unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["Hello", ", ", "world"]);
        assert_eq!(normalizer.frames_emitted(), 3);
        assert_eq!(normalizer.events_dropped(), 6);
        assert_eq!(normalizer.state(), NormalizerState::AwaitingEvent);

        let done = normalizer.finish().unwrap();
        assert_eq!(&done[..], DONE_FRAME.as_bytes());
        assert_eq!(normalizer.state(), NormalizerState::StreamEnded);
        assert!(normalizer.finish().is_none());
    }

    #[test]
    fn test_chunk_shape() {
        let mut normalizer = StreamNormalizer::new("claude-3-opus", ChunkIdMode::PerChunk);
        let Outcome::Frame(frame) = normalizer.process_data(&text_delta("Hi")).unwrap() else {
            panic!("Expected a frame");
        };

        let chunk = frame_chunk(&frame);
        assert!(chunk.id.starts_with("chatcmpl-"));
        assert_eq!(chunk.object, "chat.completion.chunk");
        assert_eq!(chunk.model, "claude-3-opus");
        assert_eq!(chunk.choices.len(), 1);
        assert_eq!(chunk.choices[0].index, 0);
        assert_eq!(chunk.choices[0].delta.role.as_deref(), Some("assistant"));
        assert_eq!(chunk.choices[0].finish_reason, None);
    }

    #[test]
    fn test_chunk_id_modes() {
        let mut per_chunk = StreamNormalizer::new("m", ChunkIdMode::PerChunk);
        let mut per_response = StreamNormalizer::new("m", ChunkIdMode::PerResponse);

        let ids = |n: &mut StreamNormalizer| -> Vec<String> {
            frames(vec![
                n.process_data(&text_delta("a")).unwrap(),
                n.process_data(&text_delta("b")).unwrap(),
            ])
            .iter()
            .map(|f| frame_chunk(f).id)
            .collect()
        };

        let a = ids(&mut per_chunk);
        assert_ne!(a[0], a[1]);

        let b = ids(&mut per_response);
        assert_eq!(b[0], b[1]);
    }

    #[test]
    fn test_in_band_error_is_terminal() {
        let mut normalizer = StreamNormalizer::new("m", ChunkIdMode::PerChunk);
        assert!(matches!(
            normalizer.process_data(&text_delta("partial")),
            Ok(Outcome::Frame(_))
        ));

        let err = normalizer
            .process_data(r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("Overloaded"));
        assert_eq!(normalizer.state(), NormalizerState::StreamErrored);

        // Nothing after a failure, and no terminal frame.
        assert_eq!(
            normalizer.process_data(&text_delta("late")).unwrap(),
            Outcome::Dropped("after_end")
        );
        assert!(normalizer.finish().is_none());
    }

    #[test]
    fn test_sparse_error_event_is_still_terminal() {
        let mut normalizer = StreamNormalizer::new("m", ChunkIdMode::PerChunk);
        let err = normalizer
            .process_data(r#"{"type":"error","error":{"message":"Overloaded"}}"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "Provider error: Overloaded");
        assert_eq!(normalizer.state(), NormalizerState::StreamErrored);
        assert!(normalizer.finish().is_none());

        let mut normalizer = StreamNormalizer::new("m", ChunkIdMode::PerChunk);
        assert!(normalizer.process_data(r#"{"type":"error"}"#).is_err());
        assert!(normalizer.finish().is_none());
    }

    #[test]
    fn test_transport_failure_suppresses_done() {
        let mut normalizer = StreamNormalizer::new("m", ChunkIdMode::PerChunk);
        normalizer.fail();
        assert_eq!(normalizer.state(), NormalizerState::StreamErrored);
        assert!(normalizer.finish().is_none());
    }

    #[test]
    fn test_non_text_deltas_and_garbage_are_dropped() {
        let mut normalizer = StreamNormalizer::new("m", ChunkIdMode::PerChunk);
        let tool_delta = r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"q\""}}"#;

        assert_eq!(
            normalizer.process_data(tool_delta).unwrap(),
            Outcome::Dropped("content_block_delta")
        );
        assert_eq!(
            normalizer.process_data("not json").unwrap(),
            Outcome::Dropped("unparseable")
        );
        assert_eq!(normalizer.frames_emitted(), 0);
        assert_eq!(normalizer.state(), NormalizerState::AwaitingEvent);
    }

    #[test]
    fn test_empty_stream_still_terminates() {
        let mut normalizer = StreamNormalizer::new("m", ChunkIdMode::PerChunk);
        assert_eq!(
            normalizer.finish().as_deref(),
            Some(DONE_FRAME.as_bytes())
        );
    }
}
