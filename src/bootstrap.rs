//! Wiring of concrete adapters from configuration.

use crate::config::{load_tenants, DatabaseConfig, ServiceConfig};
use crate::dialect::Dialect;
use crate::error::{Result, Text2SqlError};
use crate::execution::ClickHouseExecutor;
use crate::llm::{CompletionProvider, EmbeddingProvider, OpenAiCompatClient, OpenAiEmbedder};
use crate::registry::ServiceRegistry;
use crate::service::{Collaborators, ServiceSettings, Text2SqlService};
use crate::vector_store::QdrantStore;
use std::sync::Arc;
use tracing::info;

/// Adapters shared by every tenant: the model clients and the vector store.
#[derive(Clone)]
pub struct SharedAdapters {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub llm: Arc<dyn CompletionProvider>,
    pub store: Arc<QdrantStore>,
}

impl SharedAdapters {
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        if config.llm.api_key.is_empty() {
            return Err(Text2SqlError::Config(
                "QWEN_API_KEY (or DASHSCOPE_API_KEY / OPENAI_API_KEY) must be set".to_string(),
            ));
        }
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(OpenAiEmbedder::new(&config.llm, config.qdrant.dimension));
        let llm: Arc<dyn CompletionProvider> = Arc::new(OpenAiCompatClient::new(&config.llm));
        let store = Arc::new(QdrantStore::new(&config.qdrant, Arc::clone(&embedder)));
        Ok(Self {
            embedder,
            llm,
            store,
        })
    }

    pub fn collaborators(&self, database: &DatabaseConfig) -> Collaborators {
        Collaborators {
            embedder: Arc::clone(&self.embedder),
            search: self.store.clone(),
            store: self.store.clone(),
            llm: Arc::clone(&self.llm),
            executor: Arc::new(ClickHouseExecutor::new(database)),
        }
    }
}

pub fn settings(config: &ServiceConfig) -> ServiceSettings {
    ServiceSettings {
        validation: config.validation,
        timeouts: config.timeouts,
        ..ServiceSettings::default()
    }
}

/// Service for one database, with the configured table context applied.
pub fn build_service(
    adapters: &SharedAdapters,
    database: &DatabaseConfig,
    dialect: Dialect,
    settings: ServiceSettings,
    table_context: Option<&str>,
) -> Result<Text2SqlService> {
    let service = Text2SqlService::new(adapters.collaborators(database), dialect, settings)?;
    Ok(match table_context {
        Some(tables) => service.with_table_context(tables),
        None => service,
    })
}

/// Default service plus a registry holding any configured tenants.
pub fn build_registry(config: &ServiceConfig) -> Result<ServiceRegistry> {
    let shared = SharedAdapters::from_config(config)?;
    let default_service = Arc::new(build_service(
        &shared,
        &config.database,
        config.dialect,
        settings(config),
        config.table_context.as_deref(),
    )?);

    let tenant_settings = settings(config);
    let dialect = config.dialect;
    let table_context = config.table_context.clone();
    let factory_adapters = shared.clone();
    let registry = ServiceRegistry::new(Arc::new(move |tenant_id: &str, database: &DatabaseConfig| {
        info!("Building service for tenant {} ({}:{})", tenant_id, database.host, database.port);
        build_service(
            &factory_adapters,
            database,
            dialect,
            tenant_settings.clone(),
            table_context.as_deref(),
        )
    }))
    .with_default(default_service);

    if let Some(path) = &config.tenant_config_path {
        let tenants = load_tenants(path)?;
        info!("Loaded {} tenants from {}", tenants.len(), path.display());
        registry.register_all(tenants);
    }
    Ok(registry)
}
