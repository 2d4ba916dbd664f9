use anyhow::{Result, anyhow};
use std::path::PathBuf;
use tracing::warn;

/// City queried when `WEATHER_CITY` is not set.
pub const DEFAULT_CITY: &str = "Paris";
/// Dataset used when `BIGQUERY_DATASET` is not set.
pub const DEFAULT_DATASET: &str = "weather_data";
/// Directory for local artifacts when `WEATHER_DATA_DIR` is not set.
pub const DEFAULT_DATA_DIR: &str = "data";
/// Production OpenWeather endpoint.
pub const OPENWEATHER_BASE_URL: &str = "https://api.openweathermap.org";

/// Identifiers that enable the cloud stages. Both must be present; with
/// either one missing the pipeline degrades gracefully to local-only.
#[derive(Debug, Clone)]
pub struct GcpConfig {
    pub project_id: String,
    pub bucket: String,
}

/// Configuration for one pipeline run, built once at process start.
///
/// Stages receive this by reference and never read ambient environment state
/// themselves, so tests can inject any configuration via [`Config::from_lookup`].
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub city: String,
    /// Base URL of the weather provider; overridable so tests can point the
    /// fetcher at a mock server.
    pub api_base_url: String,
    pub data_dir: PathBuf,
    pub dataset: String,
    pub gcp: Option<GcpConfig>,
}

impl Config {
    /// Build configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// Recognized variables: `OPENWEATHER_API_KEY` (required), `WEATHER_CITY`,
    /// `WEATHER_DATA_DIR`, `GCP_PROJECT_ID`, `GCS_BUCKET_NAME`,
    /// `BIGQUERY_DATASET`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("OPENWEATHER_API_KEY")
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "OPENWEATHER_API_KEY environment variable is not set.\n\
                     Hint: export OPENWEATHER_API_KEY=<your key> before running the pipeline."
                )
            })?;

        let city = lookup("WEATHER_CITY").unwrap_or_else(|| DEFAULT_CITY.to_string());
        let data_dir =
            PathBuf::from(lookup("WEATHER_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()));
        let dataset = lookup("BIGQUERY_DATASET").unwrap_or_else(|| DEFAULT_DATASET.to_string());

        let gcp = match (lookup("GCP_PROJECT_ID"), lookup("GCS_BUCKET_NAME")) {
            (Some(project_id), Some(bucket)) => Some(GcpConfig { project_id, bucket }),
            (None, None) => None,
            _ => {
                warn!(
                    "GCP_PROJECT_ID and GCS_BUCKET_NAME must both be set to enable the cloud stages; \
                     continuing local-only"
                );
                None
            }
        };

        Ok(Self {
            api_key,
            city,
            api_base_url: OPENWEATHER_BASE_URL.to_string(),
            data_dir,
            dataset,
            gcp,
        })
    }

    /// Whether the staging and warehouse stages are enabled.
    pub fn gcp_enabled(&self) -> bool {
        self.gcp.is_some()
    }
}
