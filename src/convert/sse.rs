//! SSE adapters between the upstream byte stream and the downstream body
//!
//! The returned streams end with an error, not a terminator, when the
//! upstream drops or closes before `message_stop`; the HTTP layer turns that
//! into an aborted response body. Dropping a returned stream drops the
//! upstream read with it.

use super::capture::ThinkingRecorder;
use super::stream::{StreamConverter, UsageFold};
use crate::anthropic::StreamEvent;
use crate::error::{RelayError, RelayResult};
use crate::logging::{log_debug, log_warn};
use crate::store::CachedThinking;

use async_stream::try_stream;
use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};

/// One upstream SSE event, raw and parsed.
#[derive(Debug, Clone)]
pub struct UpstreamEvent {
    pub name: String,
    pub data: String,
    /// `None` when the payload could not be decoded.
    pub parsed: Option<StreamEvent>,
}

impl UpstreamEvent {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        let name = name.into();
        let data = data.into();
        let parsed = match StreamEvent::parse(&data) {
            Ok(event) => Some(event),
            Err(e) => {
                log_warn!(event = %name, error = %e, "Skipping undecodable upstream event");
                None
            }
        };
        Self { name, data, parsed }
    }

    /// Re-frame the event exactly as received.
    pub fn to_sse(&self) -> String {
        if self.name.is_empty() {
            format!("data: {}\n\n", self.data)
        } else {
            format!("event: {}\ndata: {}\n\n", self.name, self.data)
        }
    }
}

/// Parse an upstream byte stream into events.
pub fn upstream_events<S, B, E>(bytes: S) -> impl Stream<Item = RelayResult<UpstreamEvent>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    bytes.eventsource().map(|item| match item {
        Ok(event) => Ok(UpstreamEvent::new(event.event, event.data)),
        Err(e) => Err(RelayError::stream_aborted(format!("upstream read failed: {e}"))),
    })
}

/// What a completed stream produced, for usage reporting and the cache.
#[derive(Debug, Clone, Default)]
pub struct StreamOutcome {
    pub usage: UsageFold,
    pub thinking: Vec<(String, CachedThinking)>,
}

/// How the downstream body is produced.
#[derive(Debug)]
pub enum StreamMode {
    /// Re-encode as OpenAI chunks ending in `[DONE]`.
    Translate(StreamConverter),
    /// Forward upstream events unchanged.
    Passthrough,
}

/// Relay an upstream event stream to the caller.
///
/// `on_complete` runs once after `message_stop`, never on abort.
pub fn relay_stream<S, F>(
    events: S,
    mode: StreamMode,
    on_complete: F,
) -> impl Stream<Item = RelayResult<Bytes>> + Send + 'static
where
    S: Stream<Item = RelayResult<UpstreamEvent>> + Send + 'static,
    F: FnOnce(StreamOutcome) + Send + 'static,
{
    try_stream! {
        let mut events = Box::pin(events);
        let mut mode = mode;
        let mut usage = UsageFold::default();
        let mut recorder = ThinkingRecorder::new();
        let mut completed = false;

        while let Some(event) = events.next().await {
            let event = event?;
            if let Some(parsed) = &event.parsed {
                usage.observe(parsed);
                recorder.observe(parsed);
            }

            match &mut mode {
                StreamMode::Translate(converter) => {
                    if let Some(parsed) = &event.parsed {
                        for out in converter.on_event(parsed) {
                            yield Bytes::from(out.to_sse());
                        }
                    }
                    completed = converter.is_finished();
                }
                StreamMode::Passthrough => {
                    yield Bytes::from(event.to_sse());
                    completed = matches!(event.parsed, Some(StreamEvent::MessageStop));
                }
            }
            if completed {
                break;
            }
        }

        if !completed {
            Err::<(), _>(RelayError::stream_aborted("upstream closed before message_stop"))?;
        }

        log_debug!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Upstream stream completed"
        );
        on_complete(StreamOutcome {
            usage,
            thinking: recorder.finish(),
        });
    }
}
