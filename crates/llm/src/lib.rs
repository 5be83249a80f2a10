//! Client side of the local inference server: model listing and streamed chat replies.

mod lines;
mod model;
mod ollama;
mod provider;
mod stream;
mod wire;

pub use lines::{LineDecoder, lines_from_bytes};
pub use model::{
    DEFAULT_MODEL, Model, ModelCache, ModelCatalog, ModelCatalogSource, default_models,
    fetch_model_catalog,
};
pub use ollama::{CHAT_PATH, OllamaClient, TAGS_PATH};
pub use provider::{
    BoxFuture, ChatTransport, ClientConfig, DEFAULT_ENDPOINT, DEFAULT_REQUEST_TIMEOUT, LineStream,
    LlmError, LlmResult,
};
pub use stream::{
    StreamEvent, StreamEventPayload, StreamEventSink, StreamSessionId, StreamTarget,
    diagnostic_text, run_stream_worker,
};
pub use wire::{ChatMessage, ChatRequest, StreamRecord, parse_record};
