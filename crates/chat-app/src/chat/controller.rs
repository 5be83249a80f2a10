use std::path::Path;
use std::sync::Arc;

use ganesha_llm::{ChatTransport, ModelCache, ModelCatalog, StreamEventPayload, fetch_model_catalog};
use ganesha_storage::{
    Conversation, ConversationId, ConversationStore, DARK_THEME_KEY, PREFERRED_MODEL_KEY,
    Persistence,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::bridge::EventBridge;
use super::events::AppEvent;
use super::session::{SessionHandle, SessionState, StreamingSession};
use crate::attachments::{AttachmentResult, encode_image_file};

/// Result of one [`ChatController::drain`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Nothing was queued.
    Empty,
    /// One event was taken but belonged to a session that is no longer active.
    Dropped,
    Handled(AppEvent),
}

/// Everything the presentation layer drives: conversations, the streaming session, model
/// choice and preferences.
///
/// Background work only talks back through the event bridge; [`drain`](Self::drain) and
/// [`next_event`](Self::next_event) apply those events here, on the presentation side.
pub struct ChatController {
    store: ConversationStore,
    persistence: Persistence,
    transport: Arc<dyn ChatTransport>,
    model_cache: Arc<ModelCache>,
    session: StreamingSession,
    bridge: EventBridge<AppEvent>,
    shutdown: CancellationToken,
    pending_images: Vec<String>,
    model: String,
    dark_theme: bool,
    catalog: Option<ModelCatalog>,
}

impl ChatController {
    /// Loads persisted conversations and preferences. No conversation is selected afterwards.
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        persistence: Persistence,
        default_model: &str,
    ) -> Self {
        let conversations = persistence.load_conversations();
        let preferences = persistence.load_preferences();
        let model = preferences
            .preferred_model
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| default_model.to_string());

        tracing::info!(
            directory = %persistence.directory().display(),
            conversation_count = conversations.len(),
            model = %model,
            "loaded chat state"
        );

        let bridge = EventBridge::new();
        let shutdown = CancellationToken::new();
        let session =
            StreamingSession::new(Arc::clone(&transport), bridge.poster(), shutdown.clone());

        Self {
            store: ConversationStore::from_conversations(conversations),
            persistence,
            transport,
            model_cache: Arc::new(ModelCache::new()),
            session,
            bridge,
            shutdown,
            pending_images: Vec::new(),
            model,
            dark_theme: preferences.dark_theme,
            catalog: None,
        }
    }

    pub fn conversations(&self) -> &[Conversation] {
        self.store.conversations()
    }

    pub fn current(&self) -> Option<&Conversation> {
        self.store.current()
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn new_conversation(&mut self) -> ConversationId {
        let id = self.store.create_conversation();
        self.persist_conversations();
        id
    }

    pub fn select_conversation(&mut self, id: &ConversationId) -> bool {
        let selected = self.store.select(id);
        if selected {
            self.persist_conversations();
        }
        selected
    }

    /// Removes a conversation, cancelling the session that streams into it.
    pub fn delete_conversation(&mut self, id: &ConversationId) -> bool {
        if let Some(handle) = self.session.active_handle()
            && handle.target().conversation_id == *id
        {
            self.session.cancel(&handle);
        }

        let removed = self.store.remove(id).is_some();
        if removed {
            tracing::info!(conversation_id = %id, "deleted conversation");
            self.persist_conversations();
        }
        removed
    }

    /// Queues an already-encoded image for the next send.
    pub fn attach_image(&mut self, base64: impl Into<String>) {
        self.pending_images.push(base64.into());
    }

    pub fn attach_image_file(&mut self, path: &Path) -> AttachmentResult<()> {
        let encoded = encode_image_file(path)?;
        self.pending_images.push(encoded);
        Ok(())
    }

    pub fn pending_images(&self) -> &[String] {
        &self.pending_images
    }

    pub fn clear_pending_images(&mut self) {
        self.pending_images.clear();
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Switches model for subsequent sends and remembers it across restarts.
    pub fn set_model(&mut self, model: &str) -> bool {
        let model = model.trim();
        if model.is_empty() {
            return false;
        }

        self.model = model.to_string();
        if let Err(error) = self.persistence.save_preference(PREFERRED_MODEL_KEY, model) {
            tracing::warn!(error = %error, "failed to save preferred model");
        }
        true
    }

    pub fn dark_theme(&self) -> bool {
        self.dark_theme
    }

    pub fn set_dark_theme(&mut self, dark: bool) {
        self.dark_theme = dark;
        if let Err(error) = self.persistence.save_preference(DARK_THEME_KEY, dark) {
            tracing::warn!(error = %error, "failed to save theme preference");
        }
    }

    pub fn catalog(&self) -> Option<&ModelCatalog> {
        self.catalog.as_ref()
    }

    pub fn session_state(&self) -> &SessionState {
        self.session.state()
    }

    pub fn is_streaming(&self) -> bool {
        self.session.is_active()
    }

    /// Sends `prompt` with any pending images to the current conversation, creating one when
    /// nothing is selected.
    ///
    /// Returns `None` while a session is already active, or when there is nothing to send.
    pub fn send(&mut self, prompt: &str) -> Option<SessionHandle> {
        if prompt.trim().is_empty() && self.pending_images.is_empty() {
            return None;
        }
        if self.shutdown.is_cancelled() {
            return None;
        }
        if self.session.is_active() {
            tracing::debug!("send ignored while streaming");
            return None;
        }

        let conversation_id = self.store.ensure_current();
        let images = std::mem::take(&mut self.pending_images);
        self.session.start(
            &mut self.store,
            &conversation_id,
            prompt,
            images,
            &self.model,
        )
    }

    /// Cancels the active session, if any.
    pub fn stop(&mut self) -> bool {
        self.session.cancel_active()
    }

    /// Fetches the model catalog in the background; the result arrives as
    /// [`AppEvent::ModelsLoaded`].
    pub fn refresh_models(&self) -> JoinHandle<()> {
        let transport = Arc::clone(&self.transport);
        let cache = Arc::clone(&self.model_cache);
        let poster = self.bridge.poster();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                catalog = fetch_model_catalog(transport.as_ref(), &cache) => {
                    poster.post(catalog);
                }
            }
        })
    }

    /// Takes at most one queued event and applies it, without waiting.
    pub fn drain(&mut self) -> DrainOutcome {
        match self.bridge.try_next() {
            None => DrainOutcome::Empty,
            Some(event) => match self.handle(event) {
                Some(event) => DrainOutcome::Handled(event),
                None => DrainOutcome::Dropped,
            },
        }
    }

    /// Waits for the next event worth showing. Returns `None` once shut down and drained.
    pub async fn next_event(&mut self) -> Option<AppEvent> {
        loop {
            let event = self.bridge.next().await?;
            if let Some(event) = self.handle(event) {
                return Some(event);
            }
        }
    }

    /// Cancels all background work and flushes conversations to disk. An active session ends
    /// as cancelled, keeping the text applied so far. Later posts to the bridge are discarded.
    pub fn shutdown(&mut self) {
        self.session.abandon();
        self.shutdown.cancel();
        self.bridge.close();
        self.persist_conversations();
        tracing::info!("chat controller shut down");
    }

    fn handle(&mut self, event: AppEvent) -> Option<AppEvent> {
        match event {
            AppEvent::Stream(event) => {
                let event = self.session.apply(&mut self.store, event)?;
                if event.payload.is_terminal() {
                    self.persist_conversations();
                }
                if let StreamEventPayload::Error(message) = &event.payload {
                    tracing::warn!(error = %message, "streaming session failed");
                }
                Some(AppEvent::Stream(event))
            }
            AppEvent::ModelsLoaded(catalog) => {
                if !catalog.contains(&self.model) {
                    tracing::info!(
                        model = %self.model,
                        source = ?catalog.source,
                        "selected model is not in the catalog; keeping it"
                    );
                }
                self.catalog = Some(catalog.clone());
                Some(AppEvent::ModelsLoaded(catalog))
            }
        }
    }

    fn persist_conversations(&self) {
        if let Err(error) = self
            .persistence
            .save_conversations(self.store.conversations())
        {
            tracing::warn!(error = %error, "failed to save conversations");
        }
    }
}
