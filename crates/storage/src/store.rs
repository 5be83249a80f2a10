use super::ids::ConversationId;
use super::types::Conversation;

/// In-memory conversation collection in creation order, plus the current selection.
///
/// `current`, when set, always names a conversation present in the collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    current: Option<ConversationId>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps conversations loaded from disk. Nothing is selected.
    pub fn from_conversations(conversations: Vec<Conversation>) -> Self {
        Self {
            conversations,
            current: None,
        }
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| &conversation.id == id)
    }

    pub fn get_mut(&mut self, id: &ConversationId) -> Option<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|conversation| &conversation.id == id)
    }

    pub fn current_id(&self) -> Option<&ConversationId> {
        self.current.as_ref()
    }

    pub fn current(&self) -> Option<&Conversation> {
        self.current.as_ref().and_then(|id| self.get(id))
    }

    pub fn current_mut(&mut self) -> Option<&mut Conversation> {
        let id = self.current.clone()?;
        self.get_mut(&id)
    }

    /// Appends a fresh conversation and makes it current.
    pub fn create_conversation(&mut self) -> ConversationId {
        let conversation = Conversation::new(ConversationId::new_v7());
        let id = conversation.id.clone();
        self.conversations.push(conversation);
        self.current = Some(id.clone());
        tracing::debug!(conversation_id = %id, "created conversation");
        id
    }

    /// Returns the current conversation id, creating a conversation when none is selected.
    pub fn ensure_current(&mut self) -> ConversationId {
        match &self.current {
            Some(id) => id.clone(),
            None => self.create_conversation(),
        }
    }

    /// Selects an existing conversation. Unknown ids leave the selection unchanged.
    pub fn select(&mut self, id: &ConversationId) -> bool {
        if self.get(id).is_none() {
            return false;
        }

        self.current = Some(id.clone());
        true
    }

    /// Destroys a conversation and its messages; clears the selection if it was current.
    pub fn remove(&mut self, id: &ConversationId) -> Option<Conversation> {
        let position = self
            .conversations
            .iter()
            .position(|conversation| &conversation.id == id)?;

        if self.current.as_ref() == Some(id) {
            self.current = None;
        }

        Some(self.conversations.remove(position))
    }
}
