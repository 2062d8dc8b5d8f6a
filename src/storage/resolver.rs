use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;

use crate::storage::sas::{check_blob_name, BlobSasBuilder};
use crate::storage::BlobStore;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("blob container name is not configured, cannot form an absolute URL for {path:?}")]
    Configuration { path: String },

    #[error("failed to generate a signed URL for {path:?}: {message}")]
    Backend { path: String, message: String },
}

/// Whether a stored path can be handed to clients as-is.
pub fn is_absolute(path: &str) -> bool {
    path.get(..4)
        .map(|scheme| scheme.eq_ignore_ascii_case("http"))
        .unwrap_or(false)
}

/// Turns stored image paths into URLs a client can fetch.
///
/// Absolute URLs pass through untouched, blob names relative to the
/// container are exchanged for a read-only user delegation SAS URL.
/// Nothing is cached between calls.
pub struct PathResolver {
    store: Arc<dyn BlobStore>,
    lifetime: Duration,
    clock_skew: Duration,
}

impl PathResolver {
    pub fn new(store: Arc<dyn BlobStore>, lifetime: Duration, clock_skew: Duration) -> Self {
        Self {
            store,
            lifetime,
            clock_skew,
        }
    }

    pub async fn resolve(
        &self,
        raw_path: &str,
        container: Option<&str>,
    ) -> Result<String, ResolveError> {
        if raw_path.trim().is_empty() || is_absolute(raw_path) {
            return Ok(raw_path.to_string());
        }

        let container = match container.map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(ResolveError::Configuration {
                    path: raw_path.to_string(),
                })
            },
        };

        self.sign(container, raw_path)
            .await
            .map_err(|e| ResolveError::Backend {
                path: raw_path.to_string(),
                message: format!("{:#}", e),
            })
    }

    async fn sign(&self, container: &str, blob: &str) -> anyhow::Result<String> {
        check_blob_name(blob)?;

        if !self.store.exists(container, blob).await? {
            warn!(
                "Blob {} in container {} does not exist, returning the stored path",
                blob, container,
            );
            return Ok(blob.to_string());
        }

        let now = Utc::now();
        let starts_on = now - self.clock_skew;

        let key = self
            .store
            .user_delegation_key(starts_on, now + self.lifetime + self.clock_skew)
            .await?;

        let query = BlobSasBuilder::read_only(container, blob, starts_on, now + self.lifetime)
            .to_query(self.store.account_name(), &key)?;

        let mut url = self.store.blob_url(container, blob)?;
        url.set_query(Some(&query));

        debug!("Generated SAS URL for blob {} in container {}", blob, container);
        Ok(url.into())
    }
}
