use thiserror::Error;

/// Why an intent was refused. A refused intent changes no state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Message {0} is not an assistant message")]
    NotAnAssistantMessage(String),

    #[error("No user message precedes {0}")]
    NoPrecedingUserMessage(String),

    #[error("Conversation {0} is waiting for a response")]
    Busy(String),

    #[error("Too many requests in flight (limit {0})")]
    RequestLimit(usize),
}

pub type ChatResult<T> = Result<T, ChatError>;
