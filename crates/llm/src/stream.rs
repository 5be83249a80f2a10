use std::sync::Arc;

use futures::StreamExt;
use ganesha_storage::ConversationId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::provider::{ChatTransport, LlmError};
use super::wire::{ChatRequest, parse_record};

/// Identifier for one streaming exchange. Changes on every start so stale events can be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamSessionId(pub u64);

impl StreamSessionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Stream routing key used for stale-event rejection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamTarget {
    pub conversation_id: ConversationId,
    pub session_id: StreamSessionId,
}

impl StreamTarget {
    pub fn new(conversation_id: ConversationId, session_id: StreamSessionId) -> Self {
        Self {
            conversation_id,
            session_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventPayload {
    /// The server accepted the request; generation has begun.
    Prefix,
    Chunk(String),
    Finished,
    Error(String),
    Cancelled,
}

impl StreamEventPayload {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error(_) | Self::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub target: StreamTarget,
    pub payload: StreamEventPayload,
}

impl StreamEvent {
    pub fn new(target: StreamTarget, payload: StreamEventPayload) -> Self {
        Self { target, payload }
    }
}

/// Where the worker posts its events.
pub trait StreamEventSink: Send + Sync + 'static {
    /// Returns false once nobody is listening any more.
    fn post(&self, event: StreamEvent) -> bool;
    fn is_closed(&self) -> bool;
}

impl StreamEventSink for mpsc::UnboundedSender<StreamEvent> {
    fn post(&self, event: StreamEvent) -> bool {
        self.send(event).is_ok()
    }

    fn is_closed(&self) -> bool {
        mpsc::UnboundedSender::is_closed(self)
    }
}

/// Text appended to the assistant message when the exchange fails.
pub fn diagnostic_text(error: &LlmError) -> String {
    format!("[Error talking to the inference server: {}]", error_chain(error))
}

/// Joins an error with its causes. Causes already spelled out by an outer message are skipped.
fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut cause = error.source();
    while let Some(inner) = cause {
        let inner_text = inner.to_string();
        if !text.contains(&inner_text) {
            text.push_str(": ");
            text.push_str(&inner_text);
        }
        cause = inner.source();
    }
    text
}

/// Background half of a streaming session.
///
/// Emits `Prefix`, any number of `Chunk`s and exactly one terminal event, unless the sink
/// closes first. Cancellation is checked before connecting and before every line read.
pub async fn run_stream_worker<S: StreamEventSink>(
    transport: Arc<dyn ChatTransport>,
    request: ChatRequest,
    target: StreamTarget,
    sink: S,
    cancel: CancellationToken,
) {
    let post = |payload: StreamEventPayload| sink.post(StreamEvent::new(target.clone(), payload));

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!(session_id = target.session_id.0, "stream cancelled while connecting");
            post(StreamEventPayload::Cancelled);
            return;
        }
        opened = transport.open_chat(&request) => opened,
    };

    let mut lines = match opened {
        Ok(lines) => lines,
        Err(error) => {
            tracing::error!(
                conversation_id = %target.conversation_id,
                session_id = target.session_id.0,
                transport = transport.name(),
                model = %request.model,
                error = %error,
                "failed to open chat stream"
            );
            if post(StreamEventPayload::Chunk(diagnostic_text(&error))) {
                post(StreamEventPayload::Error(error_chain(&error)));
            }
            return;
        }
    };

    if !post(StreamEventPayload::Prefix) {
        return;
    }

    let mut skipped_lines = 0usize;
    loop {
        if sink.is_closed() {
            tracing::debug!(session_id = target.session_id.0, "event sink closed; abandoning stream");
            return;
        }

        let next_line = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(session_id = target.session_id.0, "stream cancelled");
                post(StreamEventPayload::Cancelled);
                return;
            }
            next_line = lines.next() => next_line,
        };

        match next_line {
            Some(Ok(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let record = match parse_record(line) {
                    Ok(record) => record,
                    Err(error) => {
                        skipped_lines += 1;
                        tracing::warn!(
                            session_id = target.session_id.0,
                            error = %error,
                            line_len = line.len(),
                            "skipping malformed stream record"
                        );
                        continue;
                    }
                };

                if let Some(delta) = record.delta
                    && !delta.is_empty()
                    && !post(StreamEventPayload::Chunk(delta))
                {
                    return;
                }

                if record.done {
                    break;
                }
            }
            Some(Err(error)) => {
                tracing::warn!(
                    session_id = target.session_id.0,
                    error = %error,
                    "chat stream failed mid-response"
                );
                if post(StreamEventPayload::Chunk(diagnostic_text(&error))) {
                    post(StreamEventPayload::Error(error_chain(&error)));
                }
                return;
            }
            None => {
                tracing::debug!(session_id = target.session_id.0, "chat stream ended without done record");
                break;
            }
        }
    }

    tracing::debug!(
        conversation_id = %target.conversation_id,
        session_id = target.session_id.0,
        skipped_lines,
        "chat stream finished"
    );
    post(StreamEventPayload::Finished);
}
