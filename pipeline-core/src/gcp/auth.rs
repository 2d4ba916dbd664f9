use anyhow::{Result, anyhow};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::debug;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// GCP tokens live one hour; refresh five minutes early.
const TOKEN_REFRESH_BUFFER_SECS: u64 = 300;

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
}

#[derive(Debug)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Access-token provider using Application Default Credentials.
///
/// Tries the metadata server first (GCE, GKE, Cloud Run), then falls back to
/// the `gcloud` CLI for local development. Tokens are cached until shortly
/// before expiry.
#[derive(Debug, Clone)]
pub struct GcpAuth {
    cached: Arc<RwLock<Option<CachedToken>>>,
    static_token: Option<String>,
    http: Client,
}

impl GcpAuth {
    pub fn new(http: Client) -> Self {
        Self {
            cached: Arc::new(RwLock::new(None)),
            static_token: None,
            http,
        }
    }

    /// Auth that always hands out a fixed token; lets the GCS and warehouse
    /// clients run against mock endpoints.
    pub(crate) fn with_static_token(token: impl Into<String>) -> Self {
        Self {
            cached: Arc::new(RwLock::new(None)),
            static_token: Some(token.into()),
            http: Client::new(),
        }
    }

    /// A valid access token, refreshed if the cached one is near expiry.
    pub async fn token(&self) -> Result<String> {
        if let Some(token) = &self.static_token {
            return Ok(token.clone());
        }

        {
            let cache = self.cached.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.expires_at > Instant::now() {
                    return Ok(cached.token.clone());
                }
            }
        }

        let token = self.fetch_token().await?;

        {
            let mut cache = self.cached.write().await;
            *cache = Some(CachedToken {
                token: token.clone(),
                expires_at: Instant::now() + Duration::from_secs(3600 - TOKEN_REFRESH_BUFFER_SECS),
            });
        }

        Ok(token)
    }

    async fn fetch_token(&self) -> Result<String> {
        if let Ok(token) = self.from_metadata_server().await {
            debug!("obtained GCP token from metadata server");
            return Ok(token);
        }

        if let Ok(token) = self.from_gcloud_cli().await {
            debug!("obtained GCP token from gcloud CLI");
            return Ok(token);
        }

        Err(anyhow!(
            "Failed to obtain a GCP access token.\n\
             Hint: on GCP this is automatic; locally run `gcloud auth application-default login`."
        ))
    }

    async fn from_metadata_server(&self) -> Result<String> {
        let res = self
            .http
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .timeout(Duration::from_secs(2))
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(anyhow!(
                "metadata server returned status {}",
                res.status()
            ));
        }

        let parsed: MetadataTokenResponse = res.json().await?;
        Ok(parsed.access_token)
    }

    async fn from_gcloud_cli(&self) -> Result<String> {
        let output = Command::new("gcloud")
            .args(["auth", "application-default", "print-access-token"])
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("gcloud auth failed: {stderr}"));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        if token.is_empty() {
            return Err(anyhow!("gcloud returned an empty token"));
        }

        Ok(token)
    }
}
