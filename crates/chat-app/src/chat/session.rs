use std::sync::Arc;

use ganesha_llm::{
    ChatMessage, ChatRequest, ChatTransport, StreamEvent, StreamEventPayload, StreamSessionId,
    StreamTarget, run_stream_worker,
};
use ganesha_storage::{ConversationId, ConversationStore};
use tokio_util::sync::CancellationToken;

use super::bridge::EventPoster;
use super::events::AppEvent;

/// Lifecycle of the streaming session as seen from the presentation side.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// Request sent, nothing heard from the server yet.
    Requesting(StreamTarget),
    Streaming(StreamTarget),
    Finished(StreamTarget),
    Error {
        target: StreamTarget,
        message: String,
    },
    Cancelled(StreamTarget),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTransition {
    Start(StreamTarget),
    BeginStreaming(StreamTarget),
    Complete(StreamTarget),
    Fail {
        target: StreamTarget,
        message: String,
    },
    Cancel(StreamTarget),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTransitionRejection {
    AlreadyActive {
        active: StreamTarget,
        attempted: StreamTarget,
    },
    NoActiveSession,
    NotRequesting,
    SessionMismatch {
        active: StreamTarget,
        attempted: StreamTarget,
    },
}

pub type SessionTransitionResult = Result<SessionState, SessionTransitionRejection>;

impl SessionState {
    /// Target of the in-flight session, if any.
    pub fn active_target(&self) -> Option<&StreamTarget> {
        match self {
            Self::Requesting(target) | Self::Streaming(target) => Some(target),
            Self::Idle | Self::Finished(_) | Self::Error { .. } | Self::Cancelled(_) => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active_target().is_some()
    }

    /// Applies one transition without mutating `self`.
    ///
    /// A new session may start from any inactive state. Terminal transitions must name the
    /// active session exactly, and may arrive before `BeginStreaming` when connecting fails.
    pub fn apply(&self, transition: SessionTransition) -> SessionTransitionResult {
        match transition {
            SessionTransition::Start(target) => self.apply_start(target),
            SessionTransition::BeginStreaming(target) => self.apply_begin_streaming(target),
            SessionTransition::Complete(target) => {
                self.end_active(target, SessionState::Finished)
            }
            SessionTransition::Fail { target, message } => {
                self.end_active(target, |target| SessionState::Error { target, message })
            }
            SessionTransition::Cancel(target) => self.end_active(target, SessionState::Cancelled),
        }
    }

    fn apply_start(&self, target: StreamTarget) -> SessionTransitionResult {
        match self.active_target() {
            Some(active) => Err(SessionTransitionRejection::AlreadyActive {
                active: active.clone(),
                attempted: target,
            }),
            None => Ok(Self::Requesting(target)),
        }
    }

    fn apply_begin_streaming(&self, target: StreamTarget) -> SessionTransitionResult {
        match self {
            Self::Requesting(active) if *active == target => Ok(Self::Streaming(target)),
            Self::Requesting(active) => Err(SessionTransitionRejection::SessionMismatch {
                active: active.clone(),
                attempted: target,
            }),
            Self::Streaming(_) => Err(SessionTransitionRejection::NotRequesting),
            Self::Idle | Self::Finished(_) | Self::Error { .. } | Self::Cancelled(_) => {
                Err(SessionTransitionRejection::NoActiveSession)
            }
        }
    }

    fn end_active(
        &self,
        target: StreamTarget,
        terminal: impl FnOnce(StreamTarget) -> SessionState,
    ) -> SessionTransitionResult {
        match self.active_target() {
            Some(active) if *active == target => Ok(terminal(target)),
            Some(active) => Err(SessionTransitionRejection::SessionMismatch {
                active: active.clone(),
                attempted: target,
            }),
            None => Err(SessionTransitionRejection::NoActiveSession),
        }
    }
}

/// Returned by [`StreamingSession::start`]; names the session for [`StreamingSession::cancel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    target: StreamTarget,
}

impl SessionHandle {
    pub fn target(&self) -> &StreamTarget {
        &self.target
    }
}

#[derive(Debug)]
struct ActiveSession {
    target: StreamTarget,
    assistant_index: usize,
    cancel: CancellationToken,
    cancel_requested: bool,
}

/// Presentation-side owner of the one in-flight exchange.
///
/// Owns the state machine and the cancellation token of the running worker. Conversation
/// data stays in the [`ConversationStore`] the caller passes in, so every mutation happens
/// on the presentation side when a bridged event is applied.
pub struct StreamingSession {
    transport: Arc<dyn ChatTransport>,
    poster: EventPoster<AppEvent>,
    shutdown: CancellationToken,
    state: SessionState,
    active: Option<ActiveSession>,
    next_session_id: u64,
}

impl StreamingSession {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        poster: EventPoster<AppEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            transport,
            poster,
            shutdown,
            state: SessionState::Idle,
            active: None,
            next_session_id: 1,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_handle(&self) -> Option<SessionHandle> {
        self.active.as_ref().map(|active| SessionHandle {
            target: active.target.clone(),
        })
    }

    /// Appends the user message and an empty assistant message, then spawns the worker.
    ///
    /// Returns `None` without touching the store while another session is active, after
    /// shutdown, or when the conversation does not exist.
    pub fn start(
        &mut self,
        store: &mut ConversationStore,
        conversation_id: &ConversationId,
        prompt: &str,
        images: Vec<String>,
        model: &str,
    ) -> Option<SessionHandle> {
        if self.shutdown.is_cancelled() {
            tracing::debug!("ignoring send after shutdown");
            return None;
        }

        let target = StreamTarget::new(
            conversation_id.clone(),
            StreamSessionId::new(self.next_session_id),
        );
        let next_state = match self.state.apply(SessionTransition::Start(target.clone())) {
            Ok(state) => state,
            Err(rejection) => {
                tracing::debug!(?rejection, "ignoring send while a session is active");
                return None;
            }
        };

        let Some(conversation) = store.get_mut(conversation_id) else {
            tracing::warn!(conversation_id = %conversation_id, "cannot start session for unknown conversation");
            return None;
        };

        conversation.push_user(prompt, images);
        let history = conversation
            .messages()
            .iter()
            .map(ChatMessage::from)
            .collect::<Vec<_>>();
        let assistant_index = conversation.push_assistant_placeholder();

        self.next_session_id += 1;
        self.state = next_state;
        let cancel = self.shutdown.child_token();
        self.active = Some(ActiveSession {
            target: target.clone(),
            assistant_index,
            cancel: cancel.clone(),
            cancel_requested: false,
        });

        tracing::info!(
            conversation_id = %target.conversation_id,
            session_id = target.session_id.0,
            model,
            history_len = history.len(),
            "starting streaming session"
        );

        tokio::spawn(run_stream_worker(
            Arc::clone(&self.transport),
            ChatRequest::streaming(model, history),
            target.clone(),
            self.poster.clone(),
            cancel,
        ));

        Some(SessionHandle { target })
    }

    /// Requests cancellation. Returns false when `handle` is not the active session or
    /// cancellation was already requested.
    pub fn cancel(&mut self, handle: &SessionHandle) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        if active.target != handle.target || active.cancel_requested {
            return false;
        }

        active.cancel_requested = true;
        active.cancel.cancel();
        tracing::debug!(session_id = active.target.session_id.0, "cancellation requested");
        true
    }

    pub fn cancel_active(&mut self) -> bool {
        match self.active_handle() {
            Some(handle) => self.cancel(&handle),
            None => false,
        }
    }

    /// Ends the active session as `Cancelled` right away, without waiting for the worker.
    /// Used on shutdown, when no further events will be drained.
    pub fn abandon(&mut self) -> Option<StreamEvent> {
        let target = self.active.as_ref()?.target.clone();
        Some(self.finish(
            StreamEvent::new(target, StreamEventPayload::Cancelled),
            true,
        ))
    }

    /// Applies one bridged event to the store.
    ///
    /// Returns the event the presentation should react to, or `None` when it was dropped:
    /// stale sessions, and chunks arriving after cancellation was requested. A terminal
    /// event after a cancel request is reported as `Cancelled` whatever the worker sent.
    pub fn apply(
        &mut self,
        store: &mut ConversationStore,
        event: StreamEvent,
    ) -> Option<StreamEvent> {
        let (assistant_index, cancel_requested) = match self.active.as_ref() {
            Some(active) if active.target == event.target => {
                (active.assistant_index, active.cancel_requested)
            }
            _ => {
                tracing::debug!(
                    session_id = event.target.session_id.0,
                    "dropping event for inactive session"
                );
                return None;
            }
        };

        match &event.payload {
            StreamEventPayload::Prefix => {
                self.transition(SessionTransition::BeginStreaming(event.target.clone()));
                Some(event)
            }
            StreamEventPayload::Chunk(_) if cancel_requested => None,
            StreamEventPayload::Chunk(text) => {
                let appended = store
                    .get_mut(&event.target.conversation_id)
                    .is_some_and(|conversation| {
                        conversation.append_to_assistant(assistant_index, text)
                    });
                if !appended {
                    tracing::debug!(
                        conversation_id = %event.target.conversation_id,
                        "target conversation is gone; chunk discarded"
                    );
                }
                Some(event)
            }
            StreamEventPayload::Finished
            | StreamEventPayload::Error(_)
            | StreamEventPayload::Cancelled => Some(self.finish(event, cancel_requested)),
        }
    }

    fn finish(&mut self, event: StreamEvent, cancel_requested: bool) -> StreamEvent {
        let StreamEvent { target, payload } = event;
        let payload = if cancel_requested {
            StreamEventPayload::Cancelled
        } else {
            payload
        };

        let transition = match &payload {
            StreamEventPayload::Finished => SessionTransition::Complete(target.clone()),
            StreamEventPayload::Error(message) => SessionTransition::Fail {
                target: target.clone(),
                message: message.clone(),
            },
            _ => SessionTransition::Cancel(target.clone()),
        };
        self.transition(transition);

        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }

        tracing::info!(
            conversation_id = %target.conversation_id,
            session_id = target.session_id.0,
            outcome = ?payload,
            "streaming session ended"
        );
        StreamEvent::new(target, payload)
    }

    fn transition(&mut self, transition: SessionTransition) {
        match self.state.apply(transition) {
            Ok(state) => self.state = state,
            Err(rejection) => tracing::warn!(?rejection, "rejected session transition"),
        }
    }
}
