use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use url::Url;

use super::credential::TokenCredential;
use crate::storage::sas::{check_blob_name, format_time};
use crate::storage::{BlobStore, UserDelegationKey};

/// Azure REST API version used for all requests.
const AZURE_API_VERSION: &str = "2022-11-02";

/// Talks to Azure Blob Storage over its REST API.
///
/// Requests are authorised with Azure AD bearer tokens since user
/// delegation keys can't be issued with a shared account key.
pub struct AzureBlobBackend {
    client: reqwest::Client,
    account: String,
    endpoint: Url,
    credential: TokenCredential,
}

impl AzureBlobBackend {
    pub fn new(
        account: String,
        endpoint: Option<&str>,
        credential: super::CredentialConfig,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        let endpoint = match endpoint {
            Some(endpoint) => Url::parse(endpoint)?,
            None => Url::parse(&format!("https://{}.blob.core.windows.net/", account))?,
        };

        if endpoint.cannot_be_a_base() {
            return Err(anyhow!("blob storage endpoint {} is not a valid base url", endpoint));
        }

        info!("Azure blob backend initialised: account={} endpoint={}", &account, &endpoint);

        Ok(Self {
            credential: TokenCredential::new(client.clone(), credential),
            client,
            account,
            endpoint,
        })
    }

    /// Get the current UTC date in RFC 1123 format for Azure headers.
    fn rfc1123_date() -> String {
        Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    /// Map an Azure HTTP error to an anyhow error with context.
    fn map_azure_error(context: &str, status: StatusCode, body: &str) -> anyhow::Error {
        anyhow!("Azure {}: HTTP {} - {}", context, status, body)
    }
}

#[async_trait]
impl BlobStore for AzureBlobBackend {
    fn account_name(&self) -> &str {
        &self.account
    }

    fn blob_url(&self, container: &str, blob: &str) -> anyhow::Result<Url> {
        check_blob_name(blob)?;

        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("blob storage endpoint cannot be a base"))?
            .pop_if_empty()
            .push(container)
            .extend(blob.split('/'));

        Ok(url)
    }

    async fn exists(&self, container: &str, blob: &str) -> anyhow::Result<bool> {
        let url = self.blob_url(container, blob)?;
        let token = self.credential.token().await?;

        debug!("Checking blob @ {}", &url);
        let resp = self
            .client
            .head(url)
            .bearer_auth(token)
            .header("x-ms-date", Self::rfc1123_date())
            .header("x-ms-version", AZURE_API_VERSION)
            .send()
            .await
            .map_err(|e| anyhow!("Azure exists check failed: {}", e))?;

        let status = resp.status();
        if status.is_success() {
            Ok(true)
        } else if status == StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(Self::map_azure_error("exists", status, ""))
        }
    }

    async fn user_delegation_key(
        &self,
        starts_on: DateTime<Utc>,
        expires_on: DateTime<Utc>,
    ) -> anyhow::Result<UserDelegationKey> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("restype", "service")
            .append_pair("comp", "userdelegationkey");

        let body = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <KeyInfo><Start>{}</Start><Expiry>{}</Expiry></KeyInfo>",
            format_time(starts_on),
            format_time(expires_on),
        );

        let token = self.credential.token().await?;

        debug!("Requesting user delegation key for account {}", &self.account);
        let resp = self
            .client
            .post(url)
            .bearer_auth(token)
            .header("x-ms-date", Self::rfc1123_date())
            .header("x-ms-version", AZURE_API_VERSION)
            .header("Content-Type", "application/xml")
            .body(body)
            .send()
            .await
            .map_err(|e| anyhow!("Azure user delegation key request failed: {}", e))?;

        let status = resp.status();
        let body = resp.text().await;
        if !status.is_success() {
            let body = describe_body(body);
            return Err(Self::map_azure_error("user delegation key", status, &body));
        }

        let body = body.map_err(|e| anyhow!("Azure user delegation key response unreadable: {}", e))?;
        parse_delegation_key(&body)
    }
}

/// The body of a failed response, or why it couldn't be read.
pub(super) fn describe_body<E: std::fmt::Display>(body: Result<String, E>) -> String {
    body.unwrap_or_else(|e| format!("<unreadable body: {}>", e))
}

/// Extracts the text of the first `<tag>...</tag>` element.
fn extract_tag<'a>(body: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);

    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)?;
    Some(&body[start..start + end])
}

fn parse_delegation_key(body: &str) -> anyhow::Result<UserDelegationKey> {
    let field = |tag: &str| {
        extract_tag(body, tag)
            .map(String::from)
            .ok_or_else(|| anyhow!("user delegation key response is missing <{}>", tag))
    };

    Ok(UserDelegationKey {
        signed_oid: field("SignedOid")?,
        signed_tid: field("SignedTid")?,
        signed_start: field("SignedStart")?,
        signed_expiry: field("SignedExpiry")?,
        signed_service: field("SignedService")?,
        signed_version: field("SignedVersion")?,
        value: field("Value")?,
    })
}
