use crate::artifacts::ArtifactStore;
use crate::auth::password;
use crate::config::AppConfig;
use crate::db;
use crate::storage::{FsStorage, StorageClient};
use anyhow::Context;
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub artifacts: ArtifactStore,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let db = db::connect(&config.database_url, config.db_max_connections).await?;

        let storage = Arc::new(FsStorage::new(&config.upload_dir).await?) as Arc<dyn StorageClient>;

        if !tokio::task::spawn_blocking(password::warm_up)
            .await
            .context("join warm-up task")?
        {
            tracing::warn!("dummy password hash unavailable");
        }

        Ok(Self::from_parts(db, config, storage))
    }

    pub fn from_parts(db: SqlitePool, config: Arc<AppConfig>, storage: Arc<dyn StorageClient>) -> Self {
        Self {
            db,
            config,
            artifacts: ArtifactStore::new(storage),
        }
    }

    /// Fresh database and upload directory under a temp dir; keep the
    /// returned guard alive for the duration of the test.
    #[cfg(test)]
    pub async fn for_tests() -> (Self, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            database_url: format!("sqlite:{}", dir.path().join("test.sqlite3").display()),
            db_max_connections: 4,
            upload_dir: dir.path().join("uploads"),
            host: "127.0.0.1".into(),
            port: 0,
            sweep_orphans_on_start: false,
        };
        let state = Self::init(config).await.expect("test state");
        (state, dir)
    }
}
