use std::path::PathBuf;

use tracing::{info, warn};

use crate::models::{ModelCatalog, ModelInfo};
use crate::repositories::{BoxFuture, RepositoryResult};

pub trait ModelsRepository: Send + Sync + 'static {
    /// Load all configured models; a missing file yields an empty list
    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<ModelInfo>>>;
}

/// Model catalog stored as `models.json` in the config directory
pub struct JsonModelsRepository {
    file_path: PathBuf,
}

impl JsonModelsRepository {
    pub fn in_dir(dir: PathBuf) -> Self {
        Self::with_path(dir.join("models.json"))
    }

    pub fn with_path(file_path: PathBuf) -> Self {
        Self { file_path }
    }
}

impl ModelsRepository for JsonModelsRepository {
    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<ModelInfo>>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            if !tokio::fs::try_exists(&path).await? {
                return Ok(Vec::new());
            }

            let contents = tokio::fs::read_to_string(&path).await?;
            let models: Vec<ModelInfo> = serde_json::from_str(&contents)?;
            Ok(models)
        })
    }
}

/// Load the configured catalog, falling back to the built-in one
pub async fn load_catalog(repository: &dyn ModelsRepository) -> ModelCatalog {
    match repository.load_all().await {
        Ok(models) if !models.is_empty() => {
            info!(count = models.len(), "Loaded model catalog");
            ModelCatalog::new(models)
        }
        Ok(_) => ModelCatalog::builtin(),
        Err(e) => {
            warn!(error = ?e, "Failed to load models, using built-in catalog");
            ModelCatalog::builtin()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonModelsRepository::in_dir(dir.path().to_path_buf());
        let catalog = load_catalog(&repo).await;
        assert_eq!(catalog.models().len(), ModelCatalog::builtin().models().len());
    }

    #[tokio::test]
    async fn test_configured_models_replace_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");
        std::fs::write(
            &path,
            r#"[{"id": "local/llama", "name": "Local Llama"}, {"id": "local/vision", "name": "Vision", "multimodal": true}]"#,
        )
        .unwrap();

        let catalog = load_catalog(&JsonModelsRepository::with_path(path)).await;
        assert_eq!(catalog.models().len(), 2);
        assert!(catalog.supports_attachments("local/vision"));
        assert_eq!(catalog.default_model().unwrap().id, "local/llama");
    }

    #[tokio::test]
    async fn test_corrupt_file_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");
        std::fs::write(&path, "[{").unwrap();
        let catalog = load_catalog(&JsonModelsRepository::with_path(path)).await;
        assert!(catalog.contains("openai/gpt-4o"));
    }
}
