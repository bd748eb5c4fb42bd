use crate::config::{AnthropicConfig, OpenAiConfig};
use crate::error::{ProxyError, Result};
use crate::logging::RequestLogger;
use crate::translate::chat_types::ChatRequest;
use crate::translate::openai_types::ChatErrorResponse;
use crate::translate::request::{chat_to_anthropic, chat_to_openai};
use crate::translate::response::{anthropic_error_message, openai_error_message, truncate};
use crate::translate::streaming::{data_frame, Outcome, StreamNormalizer, DONE_FRAME};

use bytes::Bytes;
use eventsource_stream::{Event, Eventsource};
use futures::stream::Stream;
use futures::StreamExt;
use std::fmt::Display;
use std::pin::Pin;

/// Outgoing SSE body: ready-framed bytes, or an error that aborts the response.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Open a streaming Anthropic request and normalize its events into
/// OpenAI-style chunk frames.
pub async fn stream_anthropic(
    req: &ChatRequest,
    config: &AnthropicConfig,
    api_key: &str,
    client: &reqwest::Client,
    log: &RequestLogger,
) -> Result<FrameStream> {
    let url = format!("{}/v1/messages", config.base_url.trim_end_matches('/'));
    let upstream_req = chat_to_anthropic(req, config)?;

    log.info(
        "dispatch",
        format!(
            "POST {} model={} messages={} max_tokens={}",
            url,
            upstream_req.model,
            upstream_req.messages.len(),
            upstream_req.max_tokens
        ),
    );

    let response = client
        .post(&url)
        .header("x-api-key", api_key)
        .header("anthropic-version", &config.api_version)
        .header("Content-Type", "application/json")
        .json(&upstream_req)
        .send()
        .await
        .map_err(|e| ProxyError::provider(format!("Anthropic request failed: {}", e)))?;

    let status = response.status().as_u16();
    if status >= 400 {
        let body = response.text().await.unwrap_or_default();
        let message = anthropic_error_message(status, &body);
        log.error(
            "dispatch",
            format!("Anthropic returned status {}: {}", status, message),
        );
        return Err(ProxyError::provider(message));
    }

    let normalizer = StreamNormalizer::new(&config.reported_model, config.chunk_ids);
    let events = response.bytes_stream().eventsource();

    Ok(Box::pin(normalize_anthropic_events(
        events,
        normalizer,
        log.clone(),
    )))
}

/// Open a streaming OpenAI request and relay its chunks unchanged.
pub async fn stream_openai(
    req: &ChatRequest,
    config: &OpenAiConfig,
    api_key: &str,
    client: &reqwest::Client,
    log: &RequestLogger,
) -> Result<FrameStream> {
    let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
    let upstream_req = chat_to_openai(req, config);

    log.info(
        "dispatch",
        format!(
            "POST {} model={} messages={}",
            url,
            upstream_req.model,
            upstream_req.messages.len()
        ),
    );

    let response = client
        .post(&url)
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(&upstream_req)
        .send()
        .await
        .map_err(|e| ProxyError::provider(format!("OpenAI request failed: {}", e)))?;

    let status = response.status().as_u16();
    if status >= 400 {
        let body = response.text().await.unwrap_or_default();
        let message = openai_error_message(status, &body);
        log.error(
            "dispatch",
            format!("OpenAI returned status {}: {}", status, message),
        );
        return Err(ProxyError::provider(message));
    }

    let events = response.bytes_stream().eventsource();
    Ok(Box::pin(relay_openai_events(events, log.clone())))
}

/// Drive a [`StreamNormalizer`] over parsed Anthropic SSE events.
///
/// Frames come out in arrival order. A clean upstream close ends with the
/// `[DONE]` frame; an upstream failure ends with an `Err` item instead.
pub fn normalize_anthropic_events<S, E>(
    events: S,
    normalizer: StreamNormalizer,
    log: RequestLogger,
) -> impl Stream<Item = Result<Bytes>> + Send + 'static
where
    S: Stream<Item = std::result::Result<Event, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    async_stream::stream! {
        let mut normalizer = normalizer;
        let mut guard = AbandonGuard::new(log.clone(), "stream");

        tokio::pin!(events);

        while let Some(item) = events.next().await {
            let event = match item {
                Ok(e) => e,
                Err(e) => {
                    normalizer.fail();
                    log.error(
                        "stream",
                        format!(
                            "Upstream stream failed after {} frames: {}",
                            normalizer.frames_emitted(),
                            e
                        ),
                    );
                    yield Err(ProxyError::provider(format!("Upstream stream failed: {}", e)));
                    break;
                }
            };

            match normalizer.process_data(&event.data) {
                Ok(Outcome::Frame(frame)) => yield Ok(frame),
                Ok(Outcome::Dropped(name)) => {
                    log.debug("stream", format!("Dropped {} event", name));
                }
                Err(e) => {
                    log.error(
                        "stream",
                        format!(
                            "Upstream error after {} frames: {}",
                            normalizer.frames_emitted(),
                            e
                        ),
                    );
                    yield Err(e);
                    break;
                }
            }
        }

        if let Some(done) = normalizer.finish() {
            log.info(
                "stream",
                format!(
                    "Stream completed: frames={} dropped={}",
                    normalizer.frames_emitted(),
                    normalizer.events_dropped()
                ),
            );
            yield Ok(done);
        }

        guard.settle();
    }
}

/// Re-frame OpenAI SSE payloads without touching their contents.
///
/// The upstream `[DONE]` is forwarded and ends the relay. An in-band
/// `{"error": ...}` payload ends it with an `Err` item.
pub fn relay_openai_events<S, E>(
    events: S,
    log: RequestLogger,
) -> impl Stream<Item = Result<Bytes>> + Send + 'static
where
    S: Stream<Item = std::result::Result<Event, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    async_stream::stream! {
        let mut guard = AbandonGuard::new(log.clone(), "relay");
        let mut frames: usize = 0;
        let mut saw_done = false;

        tokio::pin!(events);

        while let Some(item) = events.next().await {
            let event = match item {
                Ok(e) => e,
                Err(e) => {
                    log.error(
                        "relay",
                        format!("Upstream stream failed after {} frames: {}", frames, e),
                    );
                    yield Err(ProxyError::provider(format!("Upstream stream failed: {}", e)));
                    break;
                }
            };

            let data = event.data.trim();
            if data.is_empty() {
                continue;
            }

            if data == "[DONE]" {
                saw_done = true;
                log.info("relay", format!("Stream completed: frames={}", frames));
                yield Ok(Bytes::from_static(DONE_FRAME.as_bytes()));
                break;
            }

            if let Ok(err) = serde_json::from_str::<ChatErrorResponse>(data) {
                log.error(
                    "relay",
                    format!("Upstream error after {} frames: {}", frames, err.error.message),
                );
                yield Err(ProxyError::provider(err.error.message));
                break;
            }

            frames += 1;
            yield Ok(data_frame(&event.data));
        }

        if !saw_done {
            log.warn(
                "relay",
                format!("Upstream closed without [DONE] after {} frames", frames),
            );
        }

        guard.settle();
    }
}

/// Logs when a stream is dropped before reaching a terminal state, which
/// happens when the client disconnects mid-response.
struct AbandonGuard {
    log: RequestLogger,
    stage: &'static str,
    settled: bool,
}

impl AbandonGuard {
    fn new(log: RequestLogger, stage: &'static str) -> Self {
        Self {
            log,
            stage,
            settled: false,
        }
    }

    fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.log.warn(
                self.stage,
                "Client disconnected before the stream finished; upstream abandoned",
            );
        }
    }
}

/// Human-readable preview of a frame for debug output.
pub fn frame_preview(frame: &[u8]) -> String {
    let text = String::from_utf8_lossy(frame);
    truncate(text.trim_end(), 120).to_string()
}
