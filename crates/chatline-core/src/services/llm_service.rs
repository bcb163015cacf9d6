use futures::stream::BoxStream;
use thiserror::Error;

use crate::models::{Attachment, Message, MessageRole, MessageStatus};
use crate::repositories::BoxFuture;

/// Typed failure of a backend call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("cancelled")]
    Cancelled,
}

/// One entry of the context sent to a model
#[derive(Debug, Clone, PartialEq)]
pub struct RequestMessage {
    pub role: MessageRole,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

/// Everything a backend needs for one answer
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model_id: String,
    pub messages: Vec<RequestMessage>,
}

impl ChatRequest {
    /// Build the context from a conversation's history.
    ///
    /// Failed or unfinished assistant attempts are left out, and attachments
    /// are only forwarded to multimodal models.
    pub fn from_history(model_id: &str, history: &[Message], multimodal: bool) -> Self {
        let messages = history
            .iter()
            .filter(|m| m.is_user() || m.status == MessageStatus::Complete)
            .map(|m| RequestMessage {
                role: m.role,
                content: m.content.clone(),
                attachments: if multimodal {
                    m.attachments.clone()
                } else {
                    Vec::new()
                },
            })
            .collect();

        Self {
            model_id: model_id.to_string(),
            messages,
        }
    }

    /// The user turn being answered
    pub fn last_user_message(&self) -> Option<&RequestMessage> {
        self.messages.iter().rev().find(|m| m.role == MessageRole::User)
    }
}

/// Stream of response text fragments
pub type FragmentStream = BoxStream<'static, Result<String, BackendError>>;

/// What a backend hands back: the whole answer, or fragments as they arrive
pub enum BackendResponse {
    Complete(String),
    Stream(FragmentStream),
}

/// A language-model backend, treated as an opaque capability
pub trait ModelBackend: Send + Sync + 'static {
    fn invoke(&self, request: ChatRequest) -> BoxFuture<'static, Result<BackendResponse, BackendError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Conversation, MessagePatch};

    #[test]
    fn test_context_skips_failed_attempts_and_strips_attachments() {
        let mut conv = Conversation::new();
        conv.append_user_message(
            "look".to_string(),
            vec![Attachment::new("image/png", "aGVsbG8=")],
        );
        let failed = conv.append_placeholder_assistant_message("m");
        conv.update_message(&failed, MessagePatch::new().failed("timeout"));
        conv.append_user_message("again".to_string(), Vec::new());

        let request = ChatRequest::from_history("m", conv.messages(), false);
        assert_eq!(request.messages.len(), 2);
        assert!(request.messages.iter().all(|m| m.role == MessageRole::User));
        assert!(request.messages[0].attachments.is_empty());
        assert_eq!(request.last_user_message().unwrap().content, "again");

        let multimodal = ChatRequest::from_history("m", conv.messages(), true);
        assert_eq!(multimodal.messages[0].attachments.len(), 1);
    }

    #[test]
    fn test_cancelled_reason_text() {
        assert_eq!(BackendError::Cancelled.to_string(), "cancelled");
    }
}
