//! Google Cloud collaborators: access-token bootstrapping, object staging
//! and the warehouse loader. Both services are reached through their REST
//! APIs; there is deliberately no cloud SDK abstraction in between.

pub mod auth;
pub mod bigquery;
pub mod gcs;
