use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::RepositoryResult;
use crate::models::Message;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Current on-disk snapshot format
pub const SNAPSHOT_VERSION: u32 = 1;

fn default_snapshot_version() -> u32 {
    SNAPSHOT_VERSION
}

/// Serializable conversation data for persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationData {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The whole registry: every conversation in listing order plus the active id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default = "default_snapshot_version")]
    pub version: u32,
    #[serde(default)]
    pub active_conversation_id: Option<String>,
    #[serde(default)]
    pub conversations: Vec<ConversationData>,
}

impl RegistrySnapshot {
    pub fn new(active_conversation_id: Option<String>, conversations: Vec<ConversationData>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            active_conversation_id,
            conversations,
        }
    }

    pub fn empty() -> Self {
        Self::new(None, Vec::new())
    }
}

/// Durable store for registry snapshots.
///
/// `load` yields `Ok(None)` when nothing has been saved yet; a snapshot that
/// exists but cannot be decoded is an error.
pub trait ConversationRepository: Send + Sync + 'static {
    /// Load the last saved snapshot
    fn load(&self) -> BoxFuture<'static, RepositoryResult<Option<RegistrySnapshot>>>;

    /// Replace the stored snapshot
    fn save(&self, snapshot: RegistrySnapshot) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Where the data lives, for log lines
    fn storage_path(&self) -> String;
}
