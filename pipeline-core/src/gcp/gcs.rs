use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Datelike;
use reqwest::Client;
use std::path::Path;
use tracing::{info, warn};

use crate::fetch::truncate_body;
use crate::gcp::auth::GcpAuth;
use crate::model::WeatherRecord;
use crate::outcome::{StageError, StageOutcome};

/// Production GCS endpoint.
pub const GCS_BASE_URL: &str = "https://storage.googleapis.com";

/// Seam over durable object storage so staging can be exercised without GCS.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` at `object_path`, overwriting any existing object
    /// (last-write-wins, no conflict detection).
    async fn put_object(&self, object_path: &str, bytes: Vec<u8>) -> Result<()>;

    /// Fully-qualified locator for an object path, e.g. `gs://bucket/path`.
    fn locator(&self, object_path: &str) -> String;
}

/// Object store backed by the GCS JSON API (simple media upload).
#[derive(Debug, Clone)]
pub struct GcsStore {
    bucket: String,
    base_url: String,
    http: Client,
    auth: GcpAuth,
}

impl GcsStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self::with_base_url(bucket, GCS_BASE_URL)
    }

    pub fn with_base_url(bucket: impl Into<String>, base_url: impl Into<String>) -> Self {
        let http = Client::new();
        Self {
            bucket: bucket.into(),
            base_url: base_url.into(),
            auth: GcpAuth::new(http.clone()),
            http,
        }
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn put_object(&self, object_path: &str, bytes: Vec<u8>) -> Result<()> {
        let token = self.auth.token().await?;
        let url = format!("{}/upload/storage/v1/b/{}/o", self.base_url, self.bucket);

        let res = self
            .http
            .post(&url)
            .query(&[("uploadType", "media"), ("name", object_path)])
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(bytes)
            .send()
            .await
            .context("Failed to send upload request to GCS")?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!(
                "GCS upload failed with status {}: {}",
                status,
                truncate_body(&body)
            ));
        }

        Ok(())
    }

    fn locator(&self, object_path: &str) -> String {
        format!("gs://{}/{}", self.bucket, object_path)
    }
}

/// Destination path for a record's artifact: day-partitioned under `raw/`,
/// keyed by the UTC date of the record's `timestamp` (the same instant the
/// local writer used, so the two can never disagree).
pub fn staged_object_path(record: &WeatherRecord, basename: &str) -> String {
    let date = record.timestamp.date_naive();
    format!(
        "raw/{}/{:02}/{:02}/{}",
        date.year(),
        date.month(),
        date.day(),
        basename
    )
}

/// Copy a local artifact into the object store.
///
/// `None` means object storage is not configured: the stage reports
/// `Skipped`, not an error. Upload failures are recoverable — the local
/// artifact remains the record of truth — so they surface as
/// `Failed(Storage)` rather than propagating.
pub async fn stage_artifact(
    store: Option<&dyn ObjectStore>,
    record: &WeatherRecord,
    local_path: &Path,
) -> StageOutcome<String> {
    let Some(store) = store else {
        return StageOutcome::skipped(
            "GCP project or bucket not configured; keeping the artifact local only",
        );
    };

    let bytes = match std::fs::read(local_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            return StageOutcome::Failed(StageError::Storage(format!(
                "failed to read artifact {}: {e}",
                local_path.display()
            )));
        }
    };

    let basename = local_path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .unwrap_or_else(|| record.artifact_basename());

    let object_path = staged_object_path(record, &basename);

    match store.put_object(&object_path, bytes).await {
        Ok(()) => {
            let locator = store.locator(&object_path);
            info!(%locator, "uploaded artifact to object storage");
            StageOutcome::Success(locator)
        }
        Err(e) => {
            warn!(error = format!("{e:#}"), "staging failed; local artifact remains");
            StageOutcome::Failed(StageError::Storage(format!("{e:#}")))
        }
    }
}
