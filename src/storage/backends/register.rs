use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::azure::AzureBlobBackend;
use super::credential::CredentialConfig;
use crate::storage::BlobStore;

#[derive(Debug, Clone, Deserialize)]
pub struct BlobStorageConfig {
    /// The storage account holding the image blobs.
    pub account_name: String,

    #[serde(default)]
    /// Overrides the default `https://{account}.blob.core.windows.net` endpoint.
    ///
    /// Mostly useful for pointing at a local emulator.
    pub endpoint: Option<String>,

    #[serde(default)]
    /// The container relative image paths are looked up in.
    ///
    /// If unset, any record with a relative path can't be resolved.
    pub container_name: Option<String>,

    #[serde(default = "default_sas_lifetime")]
    /// How long generated signed URLs stay valid, in minutes.
    ///
    /// Defaults to `60`.
    pub sas_lifetime_minutes: u32,

    #[serde(default = "default_clock_skew")]
    /// Allowance for clock drift between us and the storage service, in minutes.
    ///
    /// Defaults to `5`.
    pub clock_skew_minutes: u32,

    #[serde(default = "default_request_timeout")]
    /// The timeout for each request to the storage service, in seconds.
    ///
    /// Defaults to `30`.
    pub request_timeout_secs: u64,

    pub credential: CredentialConfig,
}

impl BlobStorageConfig {
    pub fn connect(&self) -> anyhow::Result<Arc<dyn BlobStore>> {
        let backend = AzureBlobBackend::new(
            self.account_name.clone(),
            self.endpoint.as_deref(),
            self.credential.clone(),
            Duration::from_secs(self.request_timeout_secs),
        )?;

        Ok(Arc::new(backend))
    }
}

const fn default_sas_lifetime() -> u32 {
    60
}

const fn default_clock_skew() -> u32 {
    5
}

const fn default_request_timeout() -> u64 {
    30
}
