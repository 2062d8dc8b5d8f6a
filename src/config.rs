use std::path::Path;

use chrono::Duration;
use serde::Deserialize;

use crate::repository::backends::DatabaseConfigs;
use crate::storage::backends::BlobStorageConfig;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Error responses include the full error chain.
    Development,

    /// Error responses only carry a message.
    Production,
}

impl Default for Environment {
    fn default() -> Self {
        Self::Production
    }
}

impl Environment {
    #[inline]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    /// The environment the server is deployed in.
    ///
    /// Defaults to `production`.
    pub environment: Environment,

    #[serde(default = "default_max_concurrency")]
    /// The maximum number of image paths resolved at once when
    /// listing images.
    ///
    /// Defaults to `8`.
    pub max_concurrency: usize,

    /// The set record store configuration.
    pub database: DatabaseConfigs,

    /// The blob storage account images are served from.
    pub blob_storage: BlobStorageConfig,
}

impl RuntimeConfig {
    pub async fn from_file(path: &Path) -> anyhow::Result<Self> {
        let data = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }
}

impl BlobStorageConfig {
    #[inline]
    pub fn sas_lifetime(&self) -> Duration {
        Duration::minutes(self.sas_lifetime_minutes as i64)
    }

    #[inline]
    pub fn clock_skew(&self) -> Duration {
        Duration::minutes(self.clock_skew_minutes as i64)
    }
}

const fn default_max_concurrency() -> usize {
    8
}
