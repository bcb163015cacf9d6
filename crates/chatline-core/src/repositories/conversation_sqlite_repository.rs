use std::path::{Path, PathBuf};

use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use super::conversation_repository::{BoxFuture, ConversationRepository, RegistrySnapshot};
use super::error::RepositoryResult;

/// Key the registry snapshot is stored under
const REGISTRY_KEY: &str = "registry";

/// Migrations applied in order. Each entry is (version, sql).
/// To add a new migration: append a tuple with the next version number and its SQL.
/// Never edit or remove existing entries; existing databases depend on them.
const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    "CREATE TABLE IF NOT EXISTS snapshots (
        key        TEXT    PRIMARY KEY,
        value      TEXT    NOT NULL,
        updated_at INTEGER NOT NULL DEFAULT 0
    )",
)];

/// SQLite-backed key/value store for registry snapshots.
///
/// Uses WAL journal mode so reads do not block the background writer.
/// `SqlitePool` is internally reference-counted and cheap to clone.
#[derive(Clone)]
pub struct ConversationSqliteRepository {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl ConversationSqliteRepository {
    /// Open (or create) the database at `db_path`
    pub async fn open(db_path: &Path) -> RepositoryResult<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;

        info!(path = %db_path.display(), "Opened SQLite conversation database");

        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    /// Create the schema_version table if absent, then apply any pending migrations.
    async fn run_migrations(pool: &SqlitePool) -> RepositoryResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        // Seed version 0 if the table is empty (fresh database).
        sqlx::query(
            "INSERT INTO schema_version (version) SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM schema_version)",
        )
        .execute(pool)
        .await?;

        let current: i64 = sqlx::query_scalar("SELECT version FROM schema_version")
            .fetch_one(pool)
            .await?;

        for (version, sql) in MIGRATIONS {
            if *version > current {
                info!(version, "Applying schema migration");
                sqlx::query(*sql).execute(pool).await?;
                sqlx::query("UPDATE schema_version SET version = ?")
                    .bind(version)
                    .execute(pool)
                    .await?;
            }
        }

        Ok(())
    }
}

impl ConversationRepository for ConversationSqliteRepository {
    fn load(&self) -> BoxFuture<'static, RepositoryResult<Option<RegistrySnapshot>>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let row = sqlx::query("SELECT value FROM snapshots WHERE key = ?")
                .bind(REGISTRY_KEY)
                .fetch_optional(&pool)
                .await?;

            match row {
                Some(row) => {
                    let value: String = row.get("value");
                    Ok(Some(serde_json::from_str(&value)?))
                }
                None => Ok(None),
            }
        })
    }

    fn save(&self, snapshot: RegistrySnapshot) -> BoxFuture<'static, RepositoryResult<()>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let value = serde_json::to_string(&snapshot)?;
            let now = chrono::Utc::now().timestamp();

            sqlx::query(
                "INSERT INTO snapshots (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    value      = excluded.value,
                    updated_at = excluded.updated_at",
            )
            .bind(REGISTRY_KEY)
            .bind(&value)
            .bind(now)
            .execute(&pool)
            .await?;

            Ok(())
        })
    }

    fn storage_path(&self) -> String {
        self.db_path.to_string_lossy().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Conversation;

    #[tokio::test]
    async fn test_fresh_database_has_no_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ConversationSqliteRepository::open(&dir.path().join("chat.db"))
            .await
            .unwrap();
        assert!(repo.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ConversationSqliteRepository::open(&dir.path().join("chat.db"))
            .await
            .unwrap();

        let first = Conversation::new();
        repo.save(RegistrySnapshot::new(
            Some(first.id().to_string()),
            vec![first.to_data()],
        ))
        .await
        .unwrap();

        let mut second = Conversation::new();
        second.set_title("Trip plan");
        let snapshot = RegistrySnapshot::new(
            Some(second.id().to_string()),
            vec![second.to_data(), first.to_data()],
        );
        repo.save(snapshot.clone()).await.unwrap();

        assert_eq!(repo.load().await.unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn test_reopen_keeps_data_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        {
            let repo = ConversationSqliteRepository::open(&path).await.unwrap();
            repo.save(RegistrySnapshot::empty()).await.unwrap();
            repo.pool.close().await;
        }

        let repo = ConversationSqliteRepository::open(&path).await.unwrap();
        assert_eq!(repo.load().await.unwrap(), Some(RegistrySnapshot::empty()));
    }
}
