use std::sync::Arc;

use chrono::Utc;
use config::{StorageBackend, StorageConfig};
use domain::{BlobStore, MessageRepository, RepositoryError, User, UserRepository, Username};
use thiserror::Error;

use crate::{
    blob_store::FsBlobStore,
    memory::{InMemoryMessageRepository, InMemoryUserRepository},
    migrations::MIGRATOR,
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("upload directory error: {0}")]
    UploadDir(#[from] std::io::Error),
    #[error("seeding user {username} failed: {source}")]
    Seed {
        username: String,
        source: RepositoryError,
    },
    #[error("configuration error: {0}")]
    Config(String),
}

/// 按配置装配好的存储端口
#[derive(Clone)]
pub struct Infrastructure {
    pub user_repository: Arc<dyn UserRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub blob_store: Arc<dyn BlobStore>,
}

impl Infrastructure {
    pub async fn connect(
        config: &StorageConfig,
        seed_users: &[Username],
    ) -> Result<Self, InfrastructureError> {
        let blob_store = FsBlobStore::new(&config.upload_dir);
        blob_store.ensure_root().await?;

        let (user_repository, message_repository): (
            Arc<dyn UserRepository>,
            Arc<dyn MessageRepository>,
        ) = match config.backend {
            StorageBackend::Memory => (
                Arc::new(InMemoryUserRepository::new()),
                Arc::new(InMemoryMessageRepository::new()),
            ),
            StorageBackend::Postgres => {
                let url = config.database_url.as_deref().ok_or_else(|| {
                    InfrastructureError::Config("storage.database_url is required".into())
                })?;
                let pool = create_pg_pool(url, config.max_connections).await?;
                MIGRATOR.run(&pool).await?;
                let storage = PgStorage::new(pool);
                (
                    storage.user_repository as Arc<dyn UserRepository>,
                    storage.message_repository as Arc<dyn MessageRepository>,
                )
            }
        };

        seed(user_repository.as_ref(), seed_users).await?;
        tracing::info!(backend = ?config.backend, upload_dir = %config.upload_dir, "storage ready");

        Ok(Self {
            user_repository,
            message_repository,
            blob_store: Arc::new(blob_store),
        })
    }
}

/// 注册尚不存在的用户，已存在的跳过
async fn seed(
    repository: &dyn UserRepository,
    usernames: &[Username],
) -> Result<(), InfrastructureError> {
    for username in usernames {
        match repository.create(User::register(username.clone(), Utc::now())).await {
            Ok(_) => tracing::info!(username = %username, "seeded user"),
            Err(RepositoryError::Conflict) => {}
            Err(source) => {
                return Err(InfrastructureError::Seed {
                    username: username.to_string(),
                    source,
                })
            }
        }
    }
    Ok(())
}
