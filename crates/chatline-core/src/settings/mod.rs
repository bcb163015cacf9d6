pub mod chat_settings;
pub mod models_repository;
pub mod settings_repository;

use std::path::PathBuf;

pub use chat_settings::{ChatSettings, StorageKind};
pub use models_repository::{JsonModelsRepository, ModelsRepository, load_catalog};
pub use settings_repository::{JsonSettingsRepository, SettingsRepository};

use crate::repositories::{RepositoryError, RepositoryResult};

/// `<config_dir>/chatline`
pub fn app_config_dir() -> RepositoryResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("chatline"))
        .ok_or_else(|| RepositoryError::InitializationError {
            message: "Could not determine config directory".to_string(),
        })
}
