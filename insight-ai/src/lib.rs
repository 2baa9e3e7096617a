//! insight-ai library interface
//!
//! Asynchronous analysis pipeline: records are queued, analyzed one at a time
//! through an external inference service, and their outcome persisted.

pub mod analyzers;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;
pub mod workflow;

pub use crate::error::{AnalysisError, AnalysisResult};

use chrono::{DateTime, Utc};
use insight_common::config::TomlConfig;
use insight_common::events::EventBus;
use insight_common::SystemClock;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::analyzers::{AnalysisContext, AnalyzerRegistry};
use crate::db::SqliteRecordStore;
use crate::services::{BackendError, HttpInferenceBackend, InferenceBackend, InferenceClient};
use crate::store::RecordStore;
use crate::workflow::Scheduler;

/// Wired-up pipeline shared by the worker and any collaborator layer
#[derive(Clone)]
pub struct Pipeline {
    /// Database connection pool
    pub db: SqlitePool,
    pub store: Arc<dyn RecordStore>,
    pub scheduler: Arc<Scheduler>,
    pub event_bus: EventBus,
    pub startup_time: DateTime<Utc>,
}

impl Pipeline {
    /// Build the production pipeline over an initialized database
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        toml_config: &TomlConfig,
        api_key: Option<String>,
        store_max_lock_wait_ms: u64,
    ) -> Result<Self, BackendError> {
        let mut inference_config = toml_config.inference.clone();
        inference_config.api_key = api_key;
        let backend: Arc<dyn InferenceBackend> = Arc::new(HttpInferenceBackend::new(inference_config)?);

        let store: Arc<dyn RecordStore> =
            Arc::new(SqliteRecordStore::new(db.clone(), store_max_lock_wait_ms));

        Ok(Self::with_backend(db, store, backend, event_bus, toml_config))
    }

    /// Build over an explicit store and inference backend
    pub fn with_backend(
        db: SqlitePool,
        store: Arc<dyn RecordStore>,
        backend: Arc<dyn InferenceBackend>,
        event_bus: EventBus,
        toml_config: &TomlConfig,
    ) -> Self {
        config::warn_unknown_policy_sections(toml_config);

        let inference = InferenceClient::new(backend, config::retry_policy(&toml_config.worker));
        let context = AnalysisContext::new(Arc::clone(&store), inference);
        let registry =
            AnalyzerRegistry::standard(|analyzer| config::evidence_policy(toml_config, analyzer));

        let scheduler = Arc::new(Scheduler::new(
            context,
            registry,
            Arc::new(SystemClock),
            event_bus.clone(),
            config::scheduler_config(&toml_config.worker),
        ));

        Self {
            db,
            store,
            scheduler,
            event_bus,
            startup_time: Utc::now(),
        }
    }
}
