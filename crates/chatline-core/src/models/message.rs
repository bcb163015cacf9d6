use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Lifecycle of a message.
///
/// `Pending` and `Streaming` mark the placeholder the orchestrator is still
/// filling; `Complete` and `Error` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Complete,
    Pending,
    Streaming,
    Error,
}

impl MessageStatus {
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Pending | Self::Streaming)
    }
}

/// An image attached to a user message, kept as base64 text
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub mime_type: String,
    pub data: String,
}

impl Attachment {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Encode raw image bytes
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(mime_type, STANDARD.encode(bytes))
    }

    /// Decode the payload back into raw bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }

    /// Render as a `data:` URL, the form most multimodal APIs accept
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// A single entry in a conversation's history
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: MessageRole::User,
            content: content.into(),
            attachments,
            status: MessageStatus::Complete,
            error: None,
            model_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant_placeholder(model_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: MessageRole::Assistant,
            content: String::new(),
            attachments: Vec::new(),
            status: MessageStatus::Pending,
            error: None,
            model_id: Some(model_id.into()),
            created_at: Utc::now(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }

    /// Apply a patch; returns whether anything changed
    pub fn apply(&mut self, patch: MessagePatch) -> bool {
        let mut changed = false;

        match patch.content {
            Some(ContentPatch::Replace(text)) => {
                self.content = text;
                changed = true;
            }
            Some(ContentPatch::Append(text)) if !text.is_empty() => {
                self.content.push_str(&text);
                changed = true;
            }
            Some(ContentPatch::Append(_)) | None => {}
        }

        if let Some(status) = patch.status {
            if status != MessageStatus::Error {
                self.error = None;
            }
            self.status = status;
            changed = true;
        }

        if let Some(error) = patch.error {
            self.error = Some(error);
            changed = true;
        }

        if let Some(model_id) = patch.model_id {
            self.model_id = Some(model_id);
            changed = true;
        }

        changed
    }
}

/// How a patch touches the message text
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentPatch {
    Replace(String),
    Append(String),
}

/// Partial update for [`Message`], built with the chained constructors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessagePatch {
    pub content: Option<ContentPatch>,
    pub status: Option<MessageStatus>,
    pub error: Option<String>,
    pub model_id: Option<String>,
}

impl MessagePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_content(mut self, text: impl Into<String>) -> Self {
        self.content = Some(ContentPatch::Replace(text.into()));
        self
    }

    pub fn append_content(mut self, text: impl Into<String>) -> Self {
        self.content = Some(ContentPatch::Append(text.into()));
        self
    }

    pub fn status(mut self, status: MessageStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Mark as failed with a human-readable reason
    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        self.status = Some(MessageStatus::Error);
        self.error = Some(reason.into());
        self
    }

    pub fn model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_pending_assistant() {
        let msg = Message::assistant_placeholder("openai/gpt-4o");
        assert!(msg.is_assistant());
        assert_eq!(msg.status, MessageStatus::Pending);
        assert!(msg.status.is_in_flight());
        assert_eq!(msg.model_id.as_deref(), Some("openai/gpt-4o"));
        assert!(msg.content.is_empty());
    }

    #[test]
    fn test_patch_append_then_complete_clears_error() {
        let mut msg = Message::assistant_placeholder("m");
        msg.apply(MessagePatch::new().failed("network down"));
        assert_eq!(msg.status, MessageStatus::Error);
        assert_eq!(msg.error.as_deref(), Some("network down"));

        msg.apply(
            MessagePatch::new()
                .append_content("Hel")
                .status(MessageStatus::Streaming),
        );
        msg.apply(MessagePatch::new().append_content("lo"));
        msg.apply(MessagePatch::new().status(MessageStatus::Complete));

        assert_eq!(msg.content, "Hello");
        assert_eq!(msg.status, MessageStatus::Complete);
        assert!(msg.error.is_none());
    }

    #[test]
    fn test_empty_patch_reports_no_change() {
        let mut msg = Message::user("hi", Vec::new());
        assert!(!msg.apply(MessagePatch::new()));
        assert!(!msg.apply(MessagePatch::new().append_content("")));
    }

    #[test]
    fn test_attachment_bytes_and_data_url() {
        let att = Attachment::from_bytes("image/png", &[0x89, 0x50, 0x4e, 0x47]);
        assert_eq!(att.to_bytes().unwrap(), vec![0x89, 0x50, 0x4e, 0x47]);
        assert!(att.data_url().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&MessageStatus::Streaming).unwrap();
        assert_eq!(json, "\"streaming\"");
        let role: MessageRole = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(role, MessageRole::Assistant);
    }
}
