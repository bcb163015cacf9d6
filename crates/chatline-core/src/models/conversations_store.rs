use chrono::{DateTime, Utc};

use super::conversation::Conversation;

/// Lightweight entry for conversation lists
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
    pub is_streaming: bool,
}

/// Registry of all conversations plus the active selection.
///
/// Conversations are kept newest-first by creation; later activity does not
/// reorder them. The active id always names a stored conversation, and is
/// `None` only while the registry is empty.
#[derive(Debug, Default)]
pub struct ConversationsStore {
    conversations: Vec<Conversation>,
    active_conversation_id: Option<String>,
}

impl ConversationsStore {
    pub fn new() -> Self {
        Self {
            conversations: Vec::new(),
            active_conversation_id: None,
        }
    }

    /// Rebuild a registry from restored conversations (already in listing order)
    pub fn from_parts(conversations: Vec<Conversation>, active_id: Option<String>) -> Self {
        let mut store = Self {
            conversations,
            active_conversation_id: None,
        };
        let active = active_id
            .filter(|id| store.contains(id))
            .or_else(|| store.conversations.first().map(|c| c.id().to_string()));
        store.active_conversation_id = active;
        store
    }

    /// Create an empty conversation at the front and make it active
    pub fn create_conversation(&mut self) -> String {
        let conversation = Conversation::new();
        let id = conversation.id().to_string();
        self.conversations.insert(0, conversation);
        self.active_conversation_id = Some(id.clone());
        id
    }

    pub fn contains(&self, id: &str) -> bool {
        self.conversations.iter().any(|c| c.id() == id)
    }

    /// Get a conversation by ID (immutable)
    pub fn get_conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id() == id)
    }

    /// Get a mutable reference to a conversation by ID
    pub fn get_conversation_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id() == id)
    }

    /// Set the active conversation; unknown ids are ignored
    pub fn set_active(&mut self, id: &str) -> bool {
        if self.contains(id) {
            self.active_conversation_id = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_conversation_id.as_deref()
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active_id().and_then(|id| self.get_conversation(id))
    }

    /// Delete a conversation by ID.
    ///
    /// When the active conversation goes away the most recent remaining one
    /// becomes active; if none remain a fresh conversation is created.
    /// Returns the removed conversation.
    pub fn delete_conversation(&mut self, id: &str) -> Option<Conversation> {
        let index = self.conversations.iter().position(|c| c.id() == id)?;
        let removed = self.conversations.remove(index);

        if self.active_conversation_id.as_deref() == Some(id) {
            match self.conversations.first() {
                Some(next) => self.active_conversation_id = Some(next.id().to_string()),
                None => {
                    self.create_conversation();
                }
            }
        }

        Some(removed)
    }

    /// All conversations in listing order
    pub fn list_all(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn count(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}
