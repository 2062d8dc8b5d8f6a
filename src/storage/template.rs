use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

/// A signing key issued by the storage account's identity service.
///
/// SAS tokens signed with this key are only valid while the key is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDelegationKey {
    pub signed_oid: String,
    pub signed_tid: String,
    pub signed_start: String,
    pub signed_expiry: String,
    pub signed_service: String,
    pub signed_version: String,

    /// The base64 encoded key material.
    pub value: String,
}

#[async_trait]
pub trait BlobStore: Sync + Send + 'static {
    /// The storage account name used in signed resource names.
    fn account_name(&self) -> &str;

    /// The unsigned URL of a blob within a container.
    fn blob_url(&self, container: &str, blob: &str) -> anyhow::Result<Url>;

    async fn exists(&self, container: &str, blob: &str) -> anyhow::Result<bool>;

    async fn user_delegation_key(
        &self,
        starts_on: DateTime<Utc>,
        expires_on: DateTime<Utc>,
    ) -> anyhow::Result<UserDelegationKey>;
}
