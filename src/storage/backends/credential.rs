use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer};
use tokio::sync::RwLock;

use super::azure::describe_body;

/// The OAuth scope granting access to Azure Storage.
const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";
const STORAGE_RESOURCE: &str = "https://storage.azure.com/";
const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "config")]
pub enum CredentialConfig {
    /// A service principal authenticating with a client secret.
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,

        #[serde(default = "default_authority_host")]
        authority_host: String,
    },

    /// The managed identity of the host, via the instance metadata service.
    ManagedIdentity {
        #[serde(default)]
        client_id: Option<String>,
    },

    /// A pre-issued token, mostly useful for local development.
    BearerToken { token: String },
}

fn default_authority_host() -> String {
    "https://login.microsoftonline.com".to_string()
}

#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_on: DateTime<Utc>,
}

impl AccessToken {
    /// Tokens are refreshed a little early so one never expires mid request.
    fn is_fresh(&self) -> bool {
        self.expires_on - Duration::minutes(2) > Utc::now()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,

    #[serde(deserialize_with = "seconds")]
    expires_in: i64,
}

/// The identity endpoints disagree on whether `expires_in` is a number
/// or a string.
fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(v) => Ok(v),
        Raw::Str(v) => v.parse().map_err(serde::de::Error::custom),
    }
}

/// Issues bearer tokens for the storage REST API.
pub struct TokenCredential {
    client: reqwest::Client,
    config: CredentialConfig,
    cached: RwLock<Option<AccessToken>>,
}

impl TokenCredential {
    pub fn new(client: reqwest::Client, config: CredentialConfig) -> Self {
        Self {
            client,
            config,
            cached: RwLock::new(None),
        }
    }

    pub async fn token(&self) -> anyhow::Result<String> {
        match &self.config {
            CredentialConfig::BearerToken { token } => Ok(token.clone()),
            CredentialConfig::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
                authority_host,
            } => {
                self.cached_token(|| {
                    let url = format!(
                        "{}/{}/oauth2/v2.0/token",
                        authority_host.trim_end_matches('/'),
                        tenant_id,
                    );

                    debug!("requesting storage token from {}", &url);
                    self.client.post(url).form(&[
                        ("grant_type", "client_credentials"),
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                        ("scope", STORAGE_SCOPE),
                    ])
                })
                .await
            },
            CredentialConfig::ManagedIdentity { client_id } => {
                self.cached_token(|| {
                    let mut query = vec![
                        ("api-version", "2018-02-01"),
                        ("resource", STORAGE_RESOURCE),
                    ];
                    if let Some(client_id) = client_id {
                        query.push(("client_id", client_id.as_str()));
                    }

                    debug!("requesting storage token from the instance metadata service");
                    self.client
                        .get(IMDS_ENDPOINT)
                        .header("Metadata", "true")
                        .query(&query)
                })
                .await
            },
        }
    }

    /// Returns the cached token, issuing `request` only when it has gone stale.
    async fn cached_token(
        &self,
        request: impl FnOnce() -> reqwest::RequestBuilder,
    ) -> anyhow::Result<String> {
        if let Some(cached) = self.cached.read().await.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.token.clone());
            }
        }

        let mut slot = self.cached.write().await;

        // Another request may have refreshed it while we waited on the lock.
        if let Some(cached) = slot.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.token.clone());
            }
        }

        let fetched = fetch_token(request()).await?;
        let token = fetched.token.clone();
        *slot = Some(fetched);

        Ok(token)
    }
}

async fn fetch_token(request: reqwest::RequestBuilder) -> anyhow::Result<AccessToken> {
    let resp = request
        .send()
        .await
        .map_err(|e| anyhow!("token request failed: {}", e))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = describe_body(resp.text().await);
        return Err(anyhow!(
            "identity endpoint did not respond correctly, expected status 200 got {}: {}",
            status,
            body,
        ));
    }

    let body: TokenResponse = resp.json().await?;

    Ok(AccessToken {
        token: body.access_token,
        expires_on: Utc::now() + Duration::seconds(body.expires_in),
    })
}
