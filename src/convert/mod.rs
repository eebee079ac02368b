//! Response conversion from the Anthropic protocol to the OpenAI protocol
//!
//! - [`response`] - whole JSON message to `chat.completion`
//! - [`stream`] - event-by-event transducer to `chat.completion.chunk`
//! - [`capture`] - records signed thinking blocks for the conversation cache
//! - [`sse`] - byte-stream adapters used by the gateway

pub mod capture;
pub mod response;
pub mod sse;
pub mod stream;

pub use capture::ThinkingRecorder;
pub use response::convert_response;
pub use sse::{relay_stream, upstream_events, StreamMode, StreamOutcome, UpstreamEvent};
pub use stream::{ConverterState, DownstreamEvent, StreamConverter, UsageFold};
