use std::sync::Arc;

use parking_lot::Mutex;

use super::conversation_repository::{BoxFuture, ConversationRepository, RegistrySnapshot};
use super::error::{RepositoryError, RepositoryResult};

#[derive(Default)]
struct InMemoryState {
    snapshot: Option<RegistrySnapshot>,
    save_count: usize,
    fail_saves: bool,
}

/// In-memory repository for conversations.
/// Useful for testing and development; clones share the same storage.
#[derive(Clone, Default)]
pub struct InMemoryConversationRepository {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing snapshot
    pub fn with_snapshot(snapshot: RegistrySnapshot) -> Self {
        let repo = Self::new();
        repo.state.lock().snapshot = Some(snapshot);
        repo
    }

    /// Make every subsequent save fail (or succeed again)
    pub fn set_fail_saves(&self, fail: bool) {
        self.state.lock().fail_saves = fail;
    }

    /// The last successfully saved snapshot
    pub fn snapshot(&self) -> Option<RegistrySnapshot> {
        self.state.lock().snapshot.clone()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.state.lock().save_count
    }
}

impl ConversationRepository for InMemoryConversationRepository {
    fn load(&self) -> BoxFuture<'static, RepositoryResult<Option<RegistrySnapshot>>> {
        let snapshot = self.state.lock().snapshot.clone();
        Box::pin(async move { Ok(snapshot) })
    }

    fn save(&self, snapshot: RegistrySnapshot) -> BoxFuture<'static, RepositoryResult<()>> {
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.lock();
            if state.fail_saves {
                return Err(RepositoryError::Unavailable {
                    message: "in-memory store configured to fail".to_string(),
                });
            }
            state.snapshot = Some(snapshot);
            state.save_count += 1;
            Ok(())
        })
    }

    fn storage_path(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Conversation;

    #[tokio::test]
    async fn test_load_empty_returns_none() {
        let repo = InMemoryConversationRepository::new();
        assert!(repo.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let repo = InMemoryConversationRepository::new();
        let conv = Conversation::new();
        let snapshot = RegistrySnapshot::new(Some(conv.id().to_string()), vec![conv.to_data()]);

        repo.save(snapshot.clone()).await.unwrap();

        let loaded = repo.load().await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(repo.save_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_saves_keep_previous_snapshot() {
        let repo = InMemoryConversationRepository::with_snapshot(RegistrySnapshot::empty());
        repo.set_fail_saves(true);

        let conv = Conversation::new();
        let result = repo
            .save(RegistrySnapshot::new(None, vec![conv.to_data()]))
            .await;
        assert!(result.is_err());
        assert_eq!(repo.snapshot().unwrap(), RegistrySnapshot::empty());

        repo.set_fail_saves(false);
        repo.save(RegistrySnapshot::empty()).await.unwrap();
        assert_eq!(repo.save_count(), 1);
    }
}
