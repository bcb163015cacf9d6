pub mod chat_event;
pub mod conversation;
pub mod conversations_store;
pub mod error_store;
pub mod message;
pub mod model_binding;
pub mod model_catalog;
pub mod stream_manager;

pub use chat_event::ChatEvent;
pub use conversation::{Conversation, DEFAULT_TITLE};
pub use conversations_store::{ConversationSummary, ConversationsStore};
pub use error_store::{ErrorEntry, ErrorLevel, ErrorStore};
pub use message::{Attachment, ContentPatch, Message, MessagePatch, MessageRole, MessageStatus};
pub use model_binding::{ModelBinding, ModelChange};
pub use model_catalog::{ModelCatalog, ModelInfo, ProviderGroup, provider_display_name};
pub use stream_manager::{RequestTicket, StreamManager, StreamState, StreamStatus};
