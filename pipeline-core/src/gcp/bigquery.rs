use anyhow::{Context, Result, bail};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use crate::fetch::truncate_body;
use crate::gcp::auth::GcpAuth;
use crate::outcome::{StageError, StageOutcome};

/// Production BigQuery endpoint.
pub const BIGQUERY_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Fixed destination table name.
pub const TABLE_NAME: &str = "weather_raw";

const DATASET_LOCATION: &str = "EU";
const DATASET_DESCRIPTION: &str = "Weather data pipeline dataset";
const TABLE_DESCRIPTION: &str = "Raw weather data from OpenWeather API";
const JOB_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Source of one bulk load: a single staged object, or a wildcard over every
/// historical partition.
#[derive(Debug, Clone)]
pub enum LoadSource {
    Uri(String),
    AllPartitions { bucket: String },
}

impl LoadSource {
    pub fn uri(&self) -> String {
        match self {
            LoadSource::Uri(uri) => uri.clone(),
            LoadSource::AllPartitions { bucket } => format!("gs://{bucket}/raw/*/*/*/*.json"),
        }
    }
}

/// One column of the warehouse schema.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SchemaField {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub field_type: &'static str,
    pub mode: &'static str,
}

const fn field(name: &'static str, field_type: &'static str, mode: &'static str) -> SchemaField {
    SchemaField {
        name,
        field_type,
        mode,
    }
}

/// The fixed warehouse schema. Autodetection is disabled on load, so this is
/// the single source of truth for the table shape.
pub fn table_schema() -> Vec<SchemaField> {
    vec![
        field("city", "STRING", "REQUIRED"),
        field("country", "STRING", "REQUIRED"),
        field("timestamp", "TIMESTAMP", "REQUIRED"),
        field("date", "DATE", "REQUIRED"),
        field("time", "TIME", "REQUIRED"),
        field("temperature", "FLOAT", "REQUIRED"),
        field("feels_like", "FLOAT", "NULLABLE"),
        field("temp_min", "FLOAT", "NULLABLE"),
        field("temp_max", "FLOAT", "NULLABLE"),
        field("humidity", "INTEGER", "REQUIRED"),
        field("pressure", "INTEGER", "REQUIRED"),
        field("weather", "STRING", "REQUIRED"),
        field("weather_main", "STRING", "REQUIRED"),
        field("wind_speed", "FLOAT", "NULLABLE"),
        field("wind_deg", "INTEGER", "NULLABLE"),
        field("clouds", "INTEGER", "NULLABLE"),
        field("sunrise", "TIMESTAMP", "NULLABLE"),
        field("sunset", "TIMESTAMP", "NULLABLE"),
        field("visibility", "INTEGER", "NULLABLE"),
        field("coord_lat", "FLOAT", "NULLABLE"),
        field("coord_lon", "FLOAT", "NULLABLE"),
    ]
}

/// One row of the read-back verification query.
#[derive(Debug)]
pub struct LatestRow {
    pub city: String,
    pub timestamp: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: i64,
    pub weather: String,
    pub wind_speed: f64,
}

/// Append-only loader for the day-partitioned warehouse table.
///
/// The setup operations are idempotent: existence of the dataset or table is
/// success, never an error, so they are safe to repeat before every load.
#[derive(Debug, Clone)]
pub struct Warehouse {
    project_id: String,
    dataset: String,
    base_url: String,
    http: Client,
    auth: GcpAuth,
}

impl Warehouse {
    pub fn new(project_id: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self::with_base_url(project_id, dataset, BIGQUERY_BASE_URL)
    }

    pub fn with_base_url(
        project_id: impl Into<String>,
        dataset: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let http = Client::new();
        Self {
            project_id: project_id.into(),
            dataset: dataset.into(),
            base_url: base_url.into(),
            auth: GcpAuth::new(http.clone()),
            http,
        }
    }

    /// Fully-qualified table id, `project.dataset.weather_raw`.
    pub fn table_id(&self) -> String {
        format!("{}.{}.{}", self.project_id, self.dataset, TABLE_NAME)
    }

    /// Create the dataset if it does not exist. Existing = success.
    pub async fn ensure_dataset(&self) -> Result<()> {
        let token = self.auth.token().await?;
        let url = format!(
            "{}/projects/{}/datasets/{}",
            self.base_url, self.project_id, self.dataset
        );

        let res = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .context("Failed to query BigQuery for the dataset")?;

        match res.status() {
            status if status.is_success() => {
                debug!(dataset = %self.dataset, "dataset already exists");
                Ok(())
            }
            StatusCode::NOT_FOUND => self.create_dataset(&token).await,
            status => {
                let body = res.text().await.unwrap_or_default();
                bail!(
                    "dataset lookup failed with status {}: {}",
                    status,
                    truncate_body(&body)
                )
            }
        }
    }

    async fn create_dataset(&self, token: &str) -> Result<()> {
        let url = format!("{}/projects/{}/datasets", self.base_url, self.project_id);
        let body = json!({
            "datasetReference": {
                "projectId": self.project_id,
                "datasetId": self.dataset,
            },
            "location": DATASET_LOCATION,
            "description": DATASET_DESCRIPTION,
        });

        let res = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .context("Failed to send dataset creation request")?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            bail!(
                "dataset creation failed with status {}: {}",
                status,
                truncate_body(&body)
            );
        }

        info!(dataset = %self.dataset, "created dataset");
        Ok(())
    }

    /// Create the table with the fixed schema and day partitioning on
    /// `timestamp` if it does not exist. Existing = success.
    pub async fn ensure_table(&self) -> Result<()> {
        let token = self.auth.token().await?;
        let url = format!(
            "{}/projects/{}/datasets/{}/tables/{}",
            self.base_url, self.project_id, self.dataset, TABLE_NAME
        );

        let res = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .context("Failed to query BigQuery for the table")?;

        match res.status() {
            status if status.is_success() => {
                debug!(table = %self.table_id(), "table already exists");
                Ok(())
            }
            StatusCode::NOT_FOUND => self.create_table(&token).await,
            status => {
                let body = res.text().await.unwrap_or_default();
                bail!(
                    "table lookup failed with status {}: {}",
                    status,
                    truncate_body(&body)
                )
            }
        }
    }

    async fn create_table(&self, token: &str) -> Result<()> {
        let url = format!(
            "{}/projects/{}/datasets/{}/tables",
            self.base_url, self.project_id, self.dataset
        );
        let body = json!({
            "tableReference": {
                "projectId": self.project_id,
                "datasetId": self.dataset,
                "tableId": TABLE_NAME,
            },
            "description": TABLE_DESCRIPTION,
            "schema": { "fields": table_schema() },
            "timePartitioning": { "type": "DAY", "field": "timestamp" },
        });

        let res = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .context("Failed to send table creation request")?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            bail!(
                "table creation failed with status {}: {}",
                status,
                truncate_body(&body)
            );
        }

        info!(table = %self.table_id(), "created day-partitioned table");
        Ok(())
    }

    /// Submit an append-only load job and block until it finishes.
    ///
    /// The job never overwrites or merges: `WRITE_APPEND` with the fixed
    /// schema (`autodetect: false`). A wildcard that matches zero objects
    /// completes with zero rows loaded. Returns the number of rows loaded.
    pub async fn load(&self, source: &LoadSource) -> Result<u64> {
        let token = self.auth.token().await?;
        let uri = source.uri();
        let url = format!("{}/projects/{}/jobs", self.base_url, self.project_id);
        let body = json!({
            "configuration": {
                "load": {
                    "sourceUris": [uri],
                    "destinationTable": {
                        "projectId": self.project_id,
                        "datasetId": self.dataset,
                        "tableId": TABLE_NAME,
                    },
                    "sourceFormat": "NEWLINE_DELIMITED_JSON",
                    "autodetect": false,
                    "writeDisposition": "WRITE_APPEND",
                }
            }
        });

        let res = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .context("Failed to submit load job")?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            bail!(
                "load job submission failed with status {}: {}",
                status,
                truncate_body(&body)
            );
        }

        let mut job: JobResponse = res
            .json()
            .await
            .context("Failed to parse load job response")?;

        // Single suspension point for the caller: poll internally until the
        // job reaches DONE, with no intermediate progress surfaced.
        loop {
            if job.status.as_ref().is_some_and(|s| s.state == "DONE") {
                return Self::finished_job_rows(&job);
            }

            tokio::time::sleep(JOB_POLL_INTERVAL).await;
            job = self.get_job(&token, &job.job_reference.job_id).await?;
        }
    }

    fn finished_job_rows(job: &JobResponse) -> Result<u64> {
        if let Some(err) = job.status.as_ref().and_then(|s| s.error_result.as_ref()) {
            // A wildcard over an empty prefix is "no data", not a failure.
            if err.message.contains("matched no files") {
                return Ok(0);
            }
            bail!("load job failed: {} ({})", err.message, err.reason);
        }

        let rows = job
            .statistics
            .as_ref()
            .and_then(|s| s.load.as_ref())
            .and_then(|l| l.output_rows.as_deref())
            .map(str::parse::<u64>)
            .transpose()
            .context("load job reported a non-numeric row count")?
            .unwrap_or(0);

        Ok(rows)
    }

    async fn get_job(&self, token: &str, job_id: &str) -> Result<JobResponse> {
        let url = format!(
            "{}/projects/{}/jobs/{}",
            self.base_url, self.project_id, job_id
        );

        let res = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .context("Failed to poll load job")?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            bail!(
                "load job poll failed with status {}: {}",
                status,
                truncate_body(&body)
            );
        }

        res.json().await.context("Failed to parse load job state")
    }

    /// Stage-level wrapper around [`Warehouse::load`] with the uniform
    /// outcome shape; failures carry the remediation hint.
    pub async fn load_staged(&self, source: &LoadSource) -> StageOutcome<u64> {
        match self.load(source).await {
            Ok(rows) => {
                info!(rows, table = %self.table_id(), "loaded staged objects into warehouse");
                StageOutcome::Success(rows)
            }
            Err(e) => StageOutcome::Failed(StageError::Warehouse(format!("{e:#}"))),
        }
    }

    /// Read back the most recent rows, newest first. Verification only; not
    /// part of the write path.
    pub async fn latest(&self, limit: u32) -> Result<Vec<LatestRow>> {
        let token = self.auth.token().await?;
        let url = format!("{}/projects/{}/queries", self.base_url, self.project_id);
        let query = format!(
            "SELECT city, timestamp, temperature, feels_like, humidity, weather, wind_speed \
             FROM `{}` ORDER BY timestamp DESC LIMIT {limit}",
            self.table_id()
        );
        let body = json!({ "query": query, "useLegacySql": false });

        let res = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .context("Failed to submit verification query")?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            bail!(
                "verification query failed with status {}: {}",
                status,
                truncate_body(&body)
            );
        }

        let parsed: QueryResponse = res
            .json()
            .await
            .context("Failed to parse verification query response")?;

        Ok(parsed.rows.iter().map(LatestRow::from_row).collect())
    }
}

impl LatestRow {
    fn from_row(row: &QueryRow) -> Self {
        Self {
            city: row.cell_string(0),
            timestamp: row.cell_string(1),
            temperature: row.cell_f64(2),
            feels_like: row.cell_f64(3),
            humidity: row.cell_i64(4),
            weather: row.cell_string(5),
            wind_speed: row.cell_f64(6),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResponse {
    job_reference: JobReference,
    #[serde(default)]
    status: Option<JobStatus>,
    #[serde(default)]
    statistics: Option<JobStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    error_result: Option<JobError>,
}

#[derive(Debug, Deserialize)]
struct JobError {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct JobStatistics {
    #[serde(default)]
    load: Option<LoadStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStatistics {
    #[serde(default)]
    output_rows: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    rows: Vec<QueryRow>,
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    f: Vec<QueryCell>,
}

#[derive(Debug, Deserialize)]
struct QueryCell {
    #[serde(default)]
    v: serde_json::Value,
}

impl QueryRow {
    fn cell_string(&self, idx: usize) -> String {
        match self.f.get(idx).map(|cell| &cell.v) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    fn cell_f64(&self, idx: usize) -> f64 {
        self.cell_string(idx).parse().unwrap_or(0.0)
    }

    fn cell_i64(&self, idx: usize) -> i64 {
        self.cell_string(idx).parse().unwrap_or(0)
    }
}
