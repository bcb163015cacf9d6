use std::path::PathBuf;

use super::chat_settings::ChatSettings;
use crate::repositories::{BoxFuture, RepositoryResult};

pub trait SettingsRepository: Send + Sync + 'static {
    /// Load settings; a missing file yields the defaults
    fn load(&self) -> BoxFuture<'static, RepositoryResult<ChatSettings>>;

    fn save(&self, settings: ChatSettings) -> BoxFuture<'static, RepositoryResult<()>>;
}

/// Settings stored as `settings.json` in the config directory
pub struct JsonSettingsRepository {
    file_path: PathBuf,
}

impl JsonSettingsRepository {
    pub fn in_dir(dir: PathBuf) -> Self {
        Self::with_path(dir.join("settings.json"))
    }

    pub fn with_path(file_path: PathBuf) -> Self {
        Self { file_path }
    }
}

impl SettingsRepository for JsonSettingsRepository {
    fn load(&self) -> BoxFuture<'static, RepositoryResult<ChatSettings>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            if !tokio::fs::try_exists(&path).await? {
                return Ok(ChatSettings::default());
            }

            let contents = tokio::fs::read_to_string(&path).await?;
            let settings: ChatSettings = serde_json::from_str(&contents)?;
            Ok(settings)
        })
    }

    fn save(&self, settings: ChatSettings) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let json = serde_json::to_string_pretty(&settings)?;

            // Write atomically using temp file + rename
            let temp_path = path.with_extension("json.tmp");
            tokio::fs::write(&temp_path, json).await?;
            tokio::fs::rename(&temp_path, &path).await?;

            Ok(())
        })
    }
}
