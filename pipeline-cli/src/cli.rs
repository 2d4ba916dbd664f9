use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use pipeline_core::config::{Config, GcpConfig};
use pipeline_core::fetch::Fetcher;
use pipeline_core::gcp::bigquery::{LoadSource, Warehouse};
use pipeline_core::gcp::gcs::{GcsStore, stage_artifact};
use pipeline_core::outcome::StageOutcome;
use pipeline_core::pipeline::Pipeline;
use pipeline_core::store::LocalStore;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-pipeline", version, about = "Weather ingestion pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the full pipeline: fetch, write locally, stage, load.
    Run,

    /// Fetch the current observation and write the local artifact only.
    Fetch,

    /// Re-stage an existing local artifact to object storage.
    Upload {
        /// Path to a local artifact produced by `fetch` or `run`.
        artifact: PathBuf,
    },

    /// Create the warehouse dataset and table (idempotent).
    Setup,

    /// Bulk-load one staged object, or every historical partition when no
    /// URI is given.
    Load {
        /// Staged object locator, e.g. `gs://bucket/raw/2024/03/07/weather_x.json`.
        uri: Option<String>,
    },

    /// Show the latest rows in the warehouse.
    Inspect,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = Config::from_env()?;

        match self.command {
            Command::Run => run_pipeline(&config).await,
            Command::Fetch => fetch_only(&config).await,
            Command::Upload { artifact } => upload(&config, &artifact).await,
            Command::Setup => setup(&config).await,
            Command::Load { uri } => load(&config, uri).await,
            Command::Inspect => inspect(&config).await,
        }
    }
}

fn require_gcp(config: &Config) -> Result<&GcpConfig> {
    match config.gcp.as_ref() {
        Some(gcp) => Ok(gcp),
        None => bail!(
            "GCP_PROJECT_ID and GCS_BUCKET_NAME must both be set for this command."
        ),
    }
}

async fn run_pipeline(config: &Config) -> Result<()> {
    let pipeline = Pipeline::from_config(config);
    let report = pipeline.run().await?;

    match &report.fetched {
        StageOutcome::Success(record) => {
            println!(
                "Fetched {} ({}): {:.1}°C (feels like {:.1}°C), {}% humidity, {}",
                record.city,
                record.timestamp,
                record.temperature,
                record.feels_like,
                record.humidity,
                record.weather
            );
        }
        StageOutcome::Skipped(reason) => {
            println!("Fetch skipped: {reason}");
            return Ok(());
        }
        StageOutcome::Failed(err) => {
            println!("Pipeline stopped: could not fetch weather data ({err})");
            return Ok(());
        }
    }

    if let Some(path) = &report.local_path {
        println!("Saved locally: {}", path.display());
    }

    match &report.staged {
        StageOutcome::Success(locator) => println!("Uploaded to GCS: {locator}"),
        StageOutcome::Skipped(reason) => println!("Upload skipped: {reason}"),
        StageOutcome::Failed(err) => println!("Upload failed: {err}"),
    }

    match &report.loaded {
        StageOutcome::Success(rows) => println!("Loaded {rows} row(s) into the warehouse"),
        StageOutcome::Skipped(reason) => println!("Warehouse load skipped: {reason}"),
        StageOutcome::Failed(err) => println!("Warehouse load failed: {err}"),
    }

    Ok(())
}

async fn fetch_only(config: &Config) -> Result<()> {
    let fetcher = Fetcher::from_config(config);
    let store = LocalStore::new(&config.data_dir);

    match fetcher.fetch_current().await {
        StageOutcome::Success(record) => {
            println!(
                "Fetched {} ({}): {:.1}°C, {}% humidity, {}",
                record.city, record.timestamp, record.temperature, record.humidity, record.weather
            );
            let path = store.write(&record)?;
            println!("Saved locally: {}", path.display());
        }
        StageOutcome::Skipped(reason) => println!("Fetch skipped: {reason}"),
        StageOutcome::Failed(err) => println!("Fetch failed: {err}"),
    }

    Ok(())
}

async fn upload(config: &Config, artifact: &std::path::Path) -> Result<()> {
    let gcp = require_gcp(config)?;
    let record = LocalStore::read(artifact)?;
    let store = GcsStore::new(&gcp.bucket);

    match stage_artifact(Some(&store), &record, artifact).await {
        StageOutcome::Success(locator) => println!("Uploaded to GCS: {locator}"),
        StageOutcome::Skipped(reason) => println!("Upload skipped: {reason}"),
        StageOutcome::Failed(err) => println!("Upload failed: {err}"),
    }

    Ok(())
}

async fn setup(config: &Config) -> Result<()> {
    let gcp = require_gcp(config)?;
    let warehouse = Warehouse::new(&gcp.project_id, &config.dataset);

    warehouse.ensure_dataset().await?;
    println!("Dataset {} is ready", config.dataset);

    warehouse.ensure_table().await?;
    println!("Table {} is ready", warehouse.table_id());

    Ok(())
}

async fn load(config: &Config, uri: Option<String>) -> Result<()> {
    let gcp = require_gcp(config)?;
    let warehouse = Warehouse::new(&gcp.project_id, &config.dataset);

    let source = match uri {
        Some(uri) => LoadSource::Uri(uri),
        None => LoadSource::AllPartitions {
            bucket: gcp.bucket.clone(),
        },
    };

    println!("Loading {} into {}...", source.uri(), warehouse.table_id());

    match warehouse.load_staged(&source).await {
        StageOutcome::Success(rows) => println!("Loaded {rows} row(s)"),
        StageOutcome::Skipped(reason) => println!("Load skipped: {reason}"),
        StageOutcome::Failed(err) => println!("Load failed: {err}"),
    }

    Ok(())
}

async fn inspect(config: &Config) -> Result<()> {
    let gcp = require_gcp(config)?;
    let warehouse = Warehouse::new(&gcp.project_id, &config.dataset);

    let rows = warehouse.latest(10).await?;
    if rows.is_empty() {
        println!("The warehouse table is empty.");
        return Ok(());
    }

    println!("Latest {} weather record(s):", rows.len());
    for row in rows {
        println!(
            "{} | {} | {:.1}°C (feels like {:.1}°C) | {}% | {} | wind {:.1} m/s",
            row.timestamp,
            row.city,
            row.temperature,
            row.feels_like,
            row.humidity,
            row.weather,
            row.wind_speed
        );
    }

    Ok(())
}
