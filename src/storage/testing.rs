use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use crate::storage::{BlobStore, UserDelegationKey};

/// A blob store answering from a fixed set of blob names.
#[derive(Default)]
pub struct ScriptedBlobStore {
    blobs: HashSet<String>,
    failing: HashSet<String>,
    calls: AtomicUsize,
    key_requests: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
}

impl ScriptedBlobStore {
    pub fn with_blobs<'a>(blobs: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            blobs: blobs.into_iter().map(String::from).collect(),
            ..Default::default()
        }
    }

    /// Makes any existence check for `blob` fail as if access was denied.
    pub fn failing_on(mut self, blob: &str) -> Self {
        self.failing.insert(blob.to_string());
        self
    }

    /// Total number of outbound calls made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The validity windows of every delegation key requested.
    pub fn key_requests(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.key_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for ScriptedBlobStore {
    fn account_name(&self) -> &str {
        "acct"
    }

    fn blob_url(&self, container: &str, blob: &str) -> anyhow::Result<Url> {
        Ok(Url::parse(&format!(
            "https://acct.blob.core.windows.net/{}/{}",
            container, blob
        ))?)
    }

    async fn exists(&self, _container: &str, blob: &str) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.contains(blob) {
            return Err(anyhow!("Azure exists: HTTP 403 Forbidden - "));
        }

        Ok(self.blobs.contains(blob))
    }

    async fn user_delegation_key(
        &self,
        starts_on: DateTime<Utc>,
        expires_on: DateTime<Utc>,
    ) -> anyhow::Result<UserDelegationKey> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.key_requests.lock().unwrap().push((starts_on, expires_on));

        Ok(UserDelegationKey {
            signed_oid: "oid".to_string(),
            signed_tid: "tid".to_string(),
            signed_start: crate::storage::sas::format_time(starts_on),
            signed_expiry: crate::storage::sas::format_time(expires_on),
            signed_service: "b".to_string(),
            signed_version: crate::storage::sas::SAS_VERSION.to_string(),
            value: base64::encode([42u8; 32]),
        })
    }
}
