use async_trait::async_trait;
use serde::Deserialize;

use crate::models::Image;
use crate::repository::{ImageFilter, ImageRepository};

#[derive(Debug, Default, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    /// The records to serve.
    ///
    /// Missing ids and creation dates are generated on load.
    pub records: Vec<Image>,
}

/// A read-only store held entirely in memory.
///
/// Useful for local runs and tests where standing up a database isn't
/// worth it.
pub struct MemoryBackend {
    records: Vec<Image>,
}

impl MemoryBackend {
    pub fn new(mut records: Vec<Image>) -> Self {
        records.sort_by_key(|v| v.created_at);
        Self { records }
    }
}

#[async_trait]
impl ImageRepository for MemoryBackend {
    async fn ensure_tables(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn get(&self, filter: ImageFilter) -> anyhow::Result<Option<Image>> {
        Ok(self.records.iter().find(|v| filter.matches(v)).cloned())
    }

    async fn get_all(&self, filter: ImageFilter) -> anyhow::Result<Vec<Image>> {
        Ok(self
            .records
            .iter()
            .filter(|v| filter.matches(v))
            .cloned()
            .collect())
    }
}
