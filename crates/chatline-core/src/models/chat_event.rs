use super::stream_manager::StreamStatus;

/// Events emitted by the chat controller for decoupled UI updates.
/// Message-level variants carry `conversation_id` so subscribers can filter.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    ConversationCreated {
        conversation_id: String,
    },
    ConversationSelected {
        conversation_id: String,
    },
    ConversationDeleted {
        conversation_id: String,
    },
    TitleChanged {
        conversation_id: String,
        title: String,
    },
    /// Messages were appended, removed or rewritten outside of streaming
    MessagesChanged {
        conversation_id: String,
    },
    StreamStarted {
        conversation_id: String,
        message_id: String,
    },
    TextChunk {
        conversation_id: String,
        message_id: String,
        text: String,
    },
    StreamEnded {
        conversation_id: String,
        message_id: String,
        status: StreamStatus,
    },
    /// A send or regenerate was rejected because a request is outstanding
    Busy {
        conversation_id: String,
    },
    ModelChanged {
        model_id: String,
    },
}
