use async_trait::async_trait;
use uuid::Uuid;

use crate::models::Image;

/// Selects which records a repository call applies to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ImageFilter {
    All,
    Id(Uuid),
}

impl ImageFilter {
    pub fn matches(&self, image: &Image) -> bool {
        match self {
            Self::All => true,
            Self::Id(id) => image.id == *id,
        }
    }
}

/// Read access to the persisted image records.
///
/// Every call has three outcomes: `Ok(Some(..))` / a non-empty vec when
/// records matched, `Ok(None)` / an empty vec when nothing did, and
/// `Err(..)` when the store itself failed.
#[async_trait]
pub trait ImageRepository: Sync + Send + 'static {
    /// Creates the backing tables if they don't already exist.
    async fn ensure_tables(&self) -> anyhow::Result<()>;

    /// Fetches the first record matching the filter.
    async fn get(&self, filter: ImageFilter) -> anyhow::Result<Option<Image>>;

    /// Fetches every record matching the filter, oldest first.
    async fn get_all(&self, filter: ImageFilter) -> anyhow::Result<Vec<Image>>;
}
