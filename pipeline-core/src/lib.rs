//! Core library for the `weather-pipeline` CLI.
//!
//! This crate defines:
//! - Configuration built once from the environment and passed into stages
//! - The canonical observation record and the per-stage outcome contract
//! - The pipeline stages: fetch, local artifact write, object staging,
//!   append-only warehouse load
//!
//! It is used by `pipeline-cli`, but can also be reused by other binaries or services.

pub mod config;
pub mod fetch;
pub mod gcp;
pub mod model;
pub mod outcome;
pub mod pipeline;
pub mod store;

pub use config::{Config, GcpConfig};
pub use fetch::Fetcher;
pub use model::WeatherRecord;
pub use outcome::{StageError, StageOutcome};
pub use pipeline::{Pipeline, RunReport};
pub use store::LocalStore;
