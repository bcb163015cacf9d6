use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chatline_core::ChatController;
use chatline_core::models::ErrorStore;
use chatline_core::repositories::{
    ConversationJsonRepository, ConversationRepository, ConversationSqliteRepository,
    InMemoryConversationRepository,
};
use chatline_core::services::ErrorCollectorLayer;
use chatline_core::settings::{
    ChatSettings, JsonModelsRepository, JsonSettingsRepository, SettingsRepository, StorageKind,
    app_config_dir, load_catalog,
};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

mod commands;
mod echo_backend;
mod repl;

use echo_backend::EchoBackend;

#[derive(Parser)]
#[command(name = "chatline")]
#[command(about = "Multi-conversation chat client")]
#[command(version)]
struct Cli {
    /// Directory holding settings.json, models.json and saved conversations
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Model to start with
    #[arg(short, long)]
    model: Option<String>,

    /// Conversation store (json, sqlite, memory)
    #[arg(long)]
    storage: Option<StorageKind>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Delay between words streamed by the offline backend, in milliseconds
    #[arg(long, default_value_t = 40)]
    echo_delay_ms: u64,
}

fn init_logging(level: &str, errors: ErrorStore) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level '{level}'"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(ErrorCollectorLayer::new(errors))
        .init();
    Ok(())
}

async fn open_repository(kind: StorageKind, dir: &Path) -> Result<Arc<dyn ConversationRepository>> {
    let repository: Arc<dyn ConversationRepository> = match kind {
        StorageKind::Json => Arc::new(ConversationJsonRepository::with_path(
            dir.join("conversations.json"),
        )),
        StorageKind::Sqlite => Arc::new(
            ConversationSqliteRepository::open(&dir.join("conversations.db"))
                .await
                .context("Failed to open conversation database")?,
        ),
        StorageKind::Memory => Arc::new(InMemoryConversationRepository::new()),
    };
    Ok(repository)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let errors = ErrorStore::default();
    init_logging(&cli.log_level, errors.clone())?;

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => app_config_dir().context("Cannot determine config directory")?,
    };
    info!(dir = %config_dir.display(), "Starting chatline");

    let mut settings = match JsonSettingsRepository::in_dir(config_dir.clone()).load().await {
        Ok(settings) => settings,
        Err(e) => {
            warn!(error = ?e, "Failed to load settings, using defaults");
            ChatSettings::default()
        }
    };
    if let Some(model) = cli.model {
        settings.default_model_id = Some(model);
    }
    if let Some(storage) = cli.storage {
        settings.storage = storage;
    }

    let catalog = load_catalog(&JsonModelsRepository::in_dir(config_dir.clone())).await;
    let repository = open_repository(settings.storage, &config_dir).await?;
    let backend = Arc::new(EchoBackend::new(Duration::from_millis(cli.echo_delay_ms)));

    let controller = ChatController::load(repository, backend, catalog, settings).await;
    repl::run(controller, errors).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from([
            "chatline",
            "--config-dir",
            "/tmp/chatline",
            "--model",
            "openai/gpt-4o",
            "--storage",
            "sqlite",
        ]);
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/chatline")));
        assert_eq!(cli.storage, Some(StorageKind::Sqlite));
        assert_eq!(cli.log_level, "info");
        assert!(Cli::try_parse_from(["chatline", "--storage", "redis"]).is_err());
    }

    #[tokio::test]
    async fn test_open_repository_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        for kind in [StorageKind::Json, StorageKind::Sqlite, StorageKind::Memory] {
            let repo = open_repository(kind, dir.path()).await.unwrap();
            assert!(repo.load().await.unwrap().is_none());
        }
    }
}
