//! Per-tenant service registry.
//!
//! Tenants are registered with their database settings; a service is built
//! for a tenant the first time it is requested and dropped on removal.

use crate::config::DatabaseConfig;
use crate::error::{Result, Text2SqlError};
use crate::service::Text2SqlService;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

pub type ServiceFactory = dyn Fn(&str, &DatabaseConfig) -> Result<Text2SqlService> + Send + Sync;

struct Registration {
    config: DatabaseConfig,
    generation: u64,
}

struct TenantService {
    service: Arc<Text2SqlService>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantStats {
    pub tenant_id: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub registered: usize,
    pub active: usize,
    pub tenants: Vec<TenantStats>,
}

pub struct ServiceRegistry {
    configs: DashMap<String, Registration>,
    generations: AtomicU64,
    services: DashMap<String, TenantService>,
    factory: Arc<ServiceFactory>,
    default_service: RwLock<Option<Arc<Text2SqlService>>>,
}

impl ServiceRegistry {
    pub fn new(factory: Arc<ServiceFactory>) -> Self {
        Self {
            configs: DashMap::new(),
            generations: AtomicU64::new(0),
            services: DashMap::new(),
            factory,
            default_service: RwLock::new(None),
        }
    }

    /// Service used when a request names no tenant.
    pub fn with_default(self, service: Arc<Text2SqlService>) -> Self {
        if let Ok(mut slot) = self.default_service.write() {
            *slot = Some(service);
        }
        self
    }

    /// Point the default service at another database. The replacement keeps
    /// the current default's dialect; requests already holding the old
    /// service finish on it.
    pub fn replace_default(&self, config: &DatabaseConfig) -> Result<Arc<Text2SqlService>> {
        let service = (self.factory)("default", config)?;
        let mut slot = self
            .default_service
            .write()
            .map_err(|_| Text2SqlError::Config("default service lock poisoned".to_string()))?;
        if let Some(previous) = slot.as_ref() {
            service.set_database_type(previous.database_type().name())?;
        }
        let service = Arc::new(service);
        *slot = Some(Arc::clone(&service));
        info!("Default database set to {}:{}", config.host, config.port);
        Ok(service)
    }

    /// Register or replace a tenant. A running service for it is dropped and
    /// rebuilt with the new settings on next use.
    pub fn register_tenant(&self, tenant_id: &str, config: DatabaseConfig) {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        self.configs
            .insert(tenant_id.to_string(), Registration { config, generation });
        // after the config swap, so a build of the old config can't outlive it
        self.services.remove(tenant_id);
        info!("Registered tenant {}", tenant_id);
    }

    pub fn register_all(&self, tenants: HashMap<String, DatabaseConfig>) {
        for (tenant_id, config) in tenants {
            self.register_tenant(&tenant_id, config);
        }
    }

    pub fn get_service(&self, tenant_id: Option<&str>) -> Result<Arc<Text2SqlService>> {
        let tenant_id = match tenant_id {
            Some(id) => id,
            None => {
                return self
                    .default_service
                    .read()
                    .map_err(|_| Text2SqlError::Config("default service lock poisoned".to_string()))?
                    .clone()
                    .ok_or_else(|| Text2SqlError::NotFound("default service".to_string()))
            }
        };

        loop {
            if let Some(existing) = self.services.get(tenant_id) {
                return Ok(Arc::clone(&existing.service));
            }

            let (config, generation) = self
                .configs
                .get(tenant_id)
                .map(|r| (r.config.clone(), r.generation))
                .ok_or_else(|| Text2SqlError::NotFound(format!("tenant {}", tenant_id)))?;

            let built = Arc::new((self.factory)(tenant_id, &config)?);

            // Publish only while the registration we built from is still
            // current; the config guard is held across the insert.
            let current = self
                .configs
                .get(tenant_id)
                .ok_or_else(|| Text2SqlError::NotFound(format!("tenant {}", tenant_id)))?;
            if current.generation != generation {
                debug!("Tenant {} re-registered during build, rebuilding", tenant_id);
                continue;
            }
            let entry = self
                .services
                .entry(tenant_id.to_string())
                .or_insert_with(|| {
                    info!("Created service for tenant {}", tenant_id);
                    TenantService {
                        service: built,
                        created_at: Utc::now(),
                    }
                });
            return Ok(Arc::clone(&entry.service));
        }
    }

    /// Drop a tenant and its service. Returns false if it was unknown.
    pub fn remove_tenant(&self, tenant_id: &str) -> bool {
        let had_config = self.configs.remove(tenant_id).is_some();
        let had_service = self.services.remove(tenant_id).is_some();
        if had_service || had_config {
            info!("Removed tenant {}", tenant_id);
        }
        had_service || had_config
    }

    pub fn tenants(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.configs.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn stats(&self) -> RegistryStats {
        let tenants: Vec<TenantStats> = self
            .tenants()
            .into_iter()
            .map(|tenant_id| {
                let created_at = self.services.get(&tenant_id).map(|s| s.created_at);
                TenantStats {
                    active: created_at.is_some(),
                    created_at,
                    tenant_id,
                }
            })
            .collect();
        RegistryStats {
            registered: tenants.len(),
            active: self.services.len(),
            tenants,
        }
    }

    /// Drop every running tenant service; registrations stay.
    pub fn cleanup_all(&self) {
        let count = self.services.len();
        self.services.clear();
        info!("Cleaned up {} tenant services", count);
    }
}
