use anyhow::Result;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::fetch::Fetcher;
use crate::gcp::bigquery::{LoadSource, Warehouse};
use crate::gcp::gcs::{GcsStore, ObjectStore, stage_artifact};
use crate::model::WeatherRecord;
use crate::outcome::StageOutcome;
use crate::store::LocalStore;

/// Outcome of one full pipeline run, one entry per stage.
#[derive(Debug)]
pub struct RunReport {
    pub fetched: StageOutcome<WeatherRecord>,
    pub local_path: Option<PathBuf>,
    pub staged: StageOutcome<String>,
    pub loaded: StageOutcome<u64>,
}

/// Sequences fetch → local write → object staging → warehouse load.
///
/// Stages degrade gracefully rather than forming a transaction: a missing
/// record short-circuits with nothing persisted, the local write is the only
/// fatal stage, and staging or loading failures leave the earlier outputs in
/// place as the durable fallback.
pub struct Pipeline {
    fetcher: Fetcher,
    store: LocalStore,
    object_store: Option<Box<dyn ObjectStore>>,
    warehouse: Option<Warehouse>,
}

impl Pipeline {
    pub fn from_config(config: &Config) -> Self {
        if !config.gcp_enabled() {
            info!("cloud stages not configured; running local-only");
        }

        let object_store = config
            .gcp
            .as_ref()
            .map(|gcp| Box::new(GcsStore::new(&gcp.bucket)) as Box<dyn ObjectStore>);
        let warehouse = config
            .gcp
            .as_ref()
            .map(|gcp| Warehouse::new(&gcp.project_id, &config.dataset));

        Self::new(
            Fetcher::from_config(config),
            LocalStore::new(&config.data_dir),
            object_store,
            warehouse,
        )
    }

    pub fn new(
        fetcher: Fetcher,
        store: LocalStore,
        object_store: Option<Box<dyn ObjectStore>>,
        warehouse: Option<Warehouse>,
    ) -> Self {
        Self {
            fetcher,
            store,
            object_store,
            warehouse,
        }
    }

    /// Run every stage once, sequentially, and report per-stage outcomes.
    ///
    /// Returns `Err` only for the local persistence failure; everything else
    /// is carried in the report.
    pub async fn run(&self) -> Result<RunReport> {
        let fetched = self.fetcher.fetch_current().await;

        let record = match &fetched {
            StageOutcome::Success(record) => record.clone(),
            StageOutcome::Skipped(reason) => {
                warn!(%reason, "fetch skipped; nothing to persist");
                return Ok(Self::short_circuit(fetched));
            }
            StageOutcome::Failed(err) => {
                error!(error = %err, "fetch failed; pipeline short-circuits with nothing persisted");
                return Ok(Self::short_circuit(fetched));
            }
        };

        let local_path = self.store.write(&record)?;

        let staged = stage_artifact(self.object_store.as_deref(), &record, &local_path).await;

        let loaded = match (&staged, &self.warehouse) {
            (StageOutcome::Success(uri), Some(warehouse)) => {
                warehouse.load_staged(&LoadSource::Uri(uri.clone())).await
            }
            (StageOutcome::Success(_), None) => {
                StageOutcome::skipped("warehouse not configured")
            }
            (StageOutcome::Skipped(_), _) => {
                StageOutcome::skipped("no staged object to load")
            }
            (StageOutcome::Failed(_), _) => StageOutcome::skipped(
                "staging failed; the local artifact remains the record of truth",
            ),
        };

        Ok(RunReport {
            fetched,
            local_path: Some(local_path),
            staged,
            loaded,
        })
    }

    fn short_circuit(fetched: StageOutcome<WeatherRecord>) -> RunReport {
        RunReport {
            fetched,
            local_path: None,
            staged: StageOutcome::skipped("no record fetched"),
            loaded: StageOutcome::skipped("no record fetched"),
        }
    }
}
