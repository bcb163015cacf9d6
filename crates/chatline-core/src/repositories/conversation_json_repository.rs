use std::path::PathBuf;

use super::conversation_repository::{BoxFuture, ConversationRepository, RegistrySnapshot};
use super::error::RepositoryResult;

/// JSON file-based repository for conversations.
/// Stores the whole registry in a single file, usually `conversations.json`
/// in the app config directory.
pub struct ConversationJsonRepository {
    file_path: PathBuf,
}

impl ConversationJsonRepository {
    pub fn with_path(file_path: PathBuf) -> Self {
        Self { file_path }
    }
}

impl ConversationRepository for ConversationJsonRepository {
    fn load(&self) -> BoxFuture<'static, RepositoryResult<Option<RegistrySnapshot>>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            // First run: nothing saved yet
            if !tokio::fs::try_exists(&path).await? {
                return Ok(None);
            }

            let contents = tokio::fs::read_to_string(&path).await?;
            let snapshot: RegistrySnapshot = serde_json::from_str(&contents)?;

            Ok(Some(snapshot))
        })
    }

    fn save(&self, snapshot: RegistrySnapshot) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let json = serde_json::to_string_pretty(&snapshot)?;

            // Write atomically using temp file + rename
            let temp_path = path.with_extension("json.tmp");
            tokio::fs::write(&temp_path, json).await?;
            tokio::fs::rename(&temp_path, &path).await?;

            Ok(())
        })
    }

    fn storage_path(&self) -> String {
        self.file_path.to_string_lossy().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::RepositoryError;
    use crate::models::{Conversation, MessagePatch, MessageStatus};

    fn sample_snapshot() -> RegistrySnapshot {
        let mut conv = Conversation::new();
        conv.append_user_message("2+2?".to_string(), Vec::new());
        let answer = conv.append_placeholder_assistant_message("openai/gpt-4o");
        conv.update_message(
            &answer,
            MessagePatch::new()
                .replace_content("4")
                .status(MessageStatus::Complete),
        );
        RegistrySnapshot::new(Some(conv.id().to_string()), vec![conv.to_data()])
    }

    #[tokio::test]
    async fn test_missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ConversationJsonRepository::with_path(dir.path().join("conversations.json"));
        assert!(repo.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("conversations.json");
        let repo = ConversationJsonRepository::with_path(path.clone());

        let snapshot = sample_snapshot();
        repo.save(snapshot.clone()).await.unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(repo.load().await.unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversations.json");
        std::fs::write(&path, "{ not json").unwrap();

        let repo = ConversationJsonRepository::with_path(path);
        let err = repo.load().await.unwrap_err();
        assert!(matches!(err, RepositoryError::SerializationError(_)));
    }
}
