use std::sync::Arc;

use serde::Deserialize;

use super::memory::{MemoryBackend, MemoryConfig};
use super::sql::{DatabaseConfig, MySQLBackend, PostgresBackend, SqliteBackend};
use crate::repository::ImageRepository;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "config")]
pub enum DatabaseConfigs {
    Postgres(DatabaseConfig),
    MySQL(DatabaseConfig),
    Sqlite(DatabaseConfig),
    Memory(MemoryConfig),
}

impl DatabaseConfigs {
    /// Connects to the configured store and makes sure its tables exist.
    pub async fn connect(self) -> anyhow::Result<Arc<dyn ImageRepository>> {
        let backend: Arc<dyn ImageRepository> = match self {
            Self::Postgres(cfg) => Arc::new(PostgresBackend::connect(&cfg).await?),
            Self::MySQL(cfg) => Arc::new(MySQLBackend::connect(&cfg).await?),
            Self::Sqlite(cfg) => Arc::new(SqliteBackend::connect(&cfg).await?),
            Self::Memory(cfg) => Arc::new(MemoryBackend::new(cfg.records)),
        };

        backend.ensure_tables().await?;

        Ok(backend)
    }
}
