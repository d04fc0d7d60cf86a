//! Tenant Directory
//!
//! The governor asks the tenant directory for a tenant's plan the first time
//! it sees the tenant, and for its fleets when a quota warning must be
//! addressed. Tenant records themselves are owned elsewhere.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Read access to tenant records
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Name of the tenant's current plan
    async fn plan_for(&self, tenant_id: &str) -> Result<String>;

    /// Fleets scoped to the tenant
    async fn fleets_for(&self, tenant_id: &str) -> Result<Vec<String>>;
}

/// Directory entry for one tenant
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantEntry {
    pub plan: String,
    pub fleets: Vec<String>,
}

/// In-memory tenant directory, usually populated from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticTenantDirectory {
    tenants: Arc<RwLock<HashMap<String, TenantEntry>>>,
}

impl StaticTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: HashMap<String, TenantEntry>) -> Self {
        Self {
            tenants: Arc::new(RwLock::new(entries)),
        }
    }

    /// Add or replace a tenant
    pub fn insert(&self, tenant_id: &str, entry: TenantEntry) {
        let mut tenants = self
            .tenants
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        tenants.insert(tenant_id.to_string(), entry);
    }

    fn entry(&self, tenant_id: &str) -> Option<TenantEntry> {
        let tenants = self
            .tenants
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        tenants.get(tenant_id).cloned()
    }
}

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn plan_for(&self, tenant_id: &str) -> Result<String> {
        self.entry(tenant_id)
            .map(|e| e.plan)
            .ok_or_else(|| anyhow::anyhow!("Tenant not found: {}", tenant_id))
    }

    async fn fleets_for(&self, tenant_id: &str) -> Result<Vec<String>> {
        Ok(self.entry(tenant_id).map(|e| e.fleets).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_known_tenant() {
        let directory = StaticTenantDirectory::new();
        directory.insert(
            "acme",
            TenantEntry {
                plan: "team".to_string(),
                fleets: vec!["edge".to_string()],
            },
        );

        assert_eq!(directory.plan_for("acme").await.unwrap(), "team");
        assert_eq!(directory.fleets_for("acme").await.unwrap(), vec!["edge"]);
    }

    #[tokio::test]
    async fn test_unknown_tenant() {
        let directory = StaticTenantDirectory::new();
        assert!(directory.plan_for("ghost").await.is_err());
        assert!(directory.fleets_for("ghost").await.unwrap().is_empty());
    }
}
