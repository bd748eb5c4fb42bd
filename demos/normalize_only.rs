//! Run canned Anthropic stream events through the normalizer without a server.
//!
//! Usage:
//!   `cargo run --example normalize_only`

use chat_proxy::config::{AnthropicConfig, ChunkIdMode};
use chat_proxy::proxy::frame_preview;
use chat_proxy::translate::chat_types::{ChatMessage, ChatRequest};
use chat_proxy::translate::request::chat_to_anthropic;
use chat_proxy::translate::streaming::{Outcome, StreamNormalizer};

fn main() {
    // What a browser client posts to /api/chat-anthropic
    let chat_req = ChatRequest {
        messages: vec![
            ChatMessage::user("What is the capital of France?"),
            ChatMessage::assistant("The capital of France is Paris."),
            ChatMessage::user("And Germany?"),
        ],
        temperature: Some(0.2),
        max_tokens: None,
    };

    let config = AnthropicConfig::default();
    println!("=== Upstream request body ===");
    match chat_to_anthropic(&chat_req, &config) {
        Ok(upstream_req) => println!(
            "{}",
            serde_json::to_string_pretty(&upstream_req).unwrap_or_default()
        ),
        Err(e) => println!("rejected: {}", e),
    }
    println!();

    // Payloads as they would arrive on the Anthropic SSE stream
    let payloads = [
        r#"{"type":"message_start","message":{"id":"msg_01","model":"claude-3-opus-20240229","usage":{"input_tokens":25,"output_tokens":1}}}"#,
        r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
        r#"{"type":"ping"}"#,
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"The capital"}}"#,
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":" of Germany"}}"#,
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":" is Berlin."}}"#,
        r#"{"type":"content_block_stop","index":0}"#,
        r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":9}}"#,
        r#"{"type":"message_stop"}"#,
    ];

    for mode in [ChunkIdMode::PerChunk, ChunkIdMode::PerResponse] {
        println!("=== Normalized frames ({:?}) ===", mode);
        let mut normalizer = StreamNormalizer::new(&config.reported_model, mode);

        for payload in payloads {
            match normalizer.process_data(payload) {
                Ok(Outcome::Frame(frame)) => println!("  {}", frame_preview(&frame)),
                Ok(Outcome::Dropped(name)) => println!("  (dropped {})", name),
                Err(e) => {
                    println!("  error: {}", e);
                    break;
                }
            }
        }

        if let Some(done) = normalizer.finish() {
            println!("  {}", frame_preview(&done));
        }
        println!(
            "  frames={} dropped={}",
            normalizer.frames_emitted(),
            normalizer.events_dropped()
        );
        println!();
    }

    // An in-band error ends the stream without [DONE]
    println!("=== Upstream error ===");
    let mut normalizer = StreamNormalizer::new(&config.reported_model, ChunkIdMode::PerChunk);
    let failing = [
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Partial"}}"#,
        r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
    ];
    for payload in failing {
        match normalizer.process_data(payload) {
            Ok(Outcome::Frame(frame)) => println!("  {}", frame_preview(&frame)),
            Ok(Outcome::Dropped(name)) => println!("  (dropped {})", name),
            Err(e) => println!("  error: {}", e),
        }
    }
    println!(
        "  state={:?} done={}",
        normalizer.state(),
        normalizer.finish().is_some()
    );
}
