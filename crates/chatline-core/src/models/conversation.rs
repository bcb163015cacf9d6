use chrono::{DateTime, Utc};

use super::message::{Attachment, Message, MessagePatch, MessageStatus};
use crate::repositories::ConversationData;

/// Title every conversation starts with
pub const DEFAULT_TITLE: &str = "New chat";

/// A single titled thread of messages.
///
/// The message list is the conversation's message store: insertion order is
/// chronological order and entries are never reordered. The store accepts any
/// sequence of roles; pairing user turns with answers is the orchestrator's job.
#[derive(Clone, Debug, PartialEq)]
pub struct Conversation {
    id: String,
    title: String,
    messages: Vec<Message>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create an empty conversation with a fresh id and the default title
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_id(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Restore a conversation from persisted data
    pub fn from_data(data: ConversationData) -> Self {
        Self {
            id: data.id,
            title: data.title,
            messages: data.messages,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Snapshot for persistence
    pub fn to_data(&self) -> ConversationData {
        ConversationData {
            id: self.id.clone(),
            title: self.title.clone(),
            messages: self.messages.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Whether the title is still the untouched placeholder
    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_TITLE
    }

    /// Set the title; blank titles are rejected and leave the old one in place
    pub fn set_title(&mut self, title: &str) -> bool {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return false;
        }
        self.title = trimmed.to_string();
        self.touch();
        true
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    /// The closest user message before `id`, if any
    pub fn preceding_user_message(&self, id: &str) -> Option<&Message> {
        let index = self.position(id)?;
        self.messages[..index].iter().rev().find(|m| m.is_user())
    }

    /// Append a completed user message and return its id
    pub fn append_user_message(&mut self, content: String, attachments: Vec<Attachment>) -> String {
        self.push(Message::user(content, attachments))
    }

    /// Append a pending assistant message for the orchestrator to fill
    pub fn append_placeholder_assistant_message(&mut self, model_id: &str) -> String {
        self.push(Message::assistant_placeholder(model_id))
    }

    fn push(&mut self, message: Message) -> String {
        let id = message.id.clone();
        self.messages.push(message);
        self.touch();
        id
    }

    /// Mutate an existing message. Returns `false` if the id is unknown.
    pub fn update_message(&mut self, id: &str, patch: MessagePatch) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        if message.apply(patch) {
            self.touch();
        }
        true
    }

    /// Remove every message strictly after `id`, returning what was removed
    pub fn truncate_after(&mut self, id: &str) -> Vec<Message> {
        match self.position(id) {
            Some(index) => self.split_off(index + 1),
            None => Vec::new(),
        }
    }

    /// Remove `id` and every message after it
    pub fn truncate_from(&mut self, id: &str) -> Vec<Message> {
        match self.position(id) {
            Some(index) => self.split_off(index),
            None => Vec::new(),
        }
    }

    fn split_off(&mut self, index: usize) -> Vec<Message> {
        let removed = self.messages.split_off(index);
        if !removed.is_empty() {
            self.touch();
        }
        removed
    }

    /// Fail any placeholder left in flight (e.g. by a process that exited mid-request).
    /// Returns how many messages were changed.
    pub fn fail_in_flight(&mut self, reason: &str) -> usize {
        let mut count = 0;
        for message in self.messages.iter_mut().filter(|m| m.status.is_in_flight()) {
            message.apply(MessagePatch::new().failed(reason));
            count += 1;
        }
        if count > 0 {
            self.touch();
        }
        count
    }

    /// Number of assistant answers that completed
    pub fn completed_answer_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.is_assistant() && m.status == MessageStatus::Complete)
            .count()
    }

    /// Text of the first user message, used for deriving a title
    pub fn first_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.is_user())
            .map(|m| m.content.as_str())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
