//! Natural-language to SQL gateway.
//!
//! Questions are screened against trained context, turned into SQL by a chat
//! model, checked against the schema known from stored DDL and the temporal
//! filter contract, and only then executed.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod dialect;
pub mod error;
pub mod execution;
pub mod llm;
pub mod prompt;
pub mod recovery;
pub mod registry;
pub mod retrieval;
pub mod schema_knowledge;
pub mod service;
pub mod sql_scan;
pub mod temporal;
pub mod training;
pub mod validation;
pub mod vector_store;

pub use config::{DatabaseConfig, ServiceConfig};
pub use dialect::{DatabaseContext, Dialect};
pub use error::{Result, Text2SqlError};
pub use registry::ServiceRegistry;
pub use service::{AskResponse, Collaborators, ServiceSettings, SqlGeneration, Text2SqlService};
pub use sql_scan::extract_candidate_columns;
pub use training::{TrainingKind, TrainingRecord, TrainingRequest};
pub use validation::{ValidationOutcome, ValidationStage};

/// Install the `tracing` subscriber used by both binaries (`RUST_LOG`,
/// default `info`).
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
