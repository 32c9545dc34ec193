//! Per-tenant ordered VM inventory.
//!
//! Each tenant's records live in one `vps-<tenantId>` document. Every write is
//! a read-modify-write of the latest persisted snapshot, serialized by a
//! per-tenant async mutex. [`InventoryStore::lock`] hands out that mutex as a
//! [`TenantInventory`] session so a multi-step caller can read, call the
//! hypervisor, and commit without another writer interleaving.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, instrument};

use crate::error::Result;
use crate::models::{VmPatch, VmRecord};
use crate::store::{self, DocumentStore};

pub const INVENTORY_PREFIX: &str = "vps-";

pub fn inventory_document(tenant_id: &str) -> String {
    format!("{}{}", INVENTORY_PREFIX, tenant_id)
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct InventoryDocument {
    #[serde(default)]
    tenant_id: String,
    #[serde(default)]
    vms: Vec<VmRecord>,
}

#[derive(Clone)]
pub struct InventoryStore {
    store: Arc<dyn DocumentStore>,
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl InventoryStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn tenant_mutex(&self, tenant_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Acquire the tenant's mutex. Held until the returned session is dropped.
    pub async fn lock(&self, tenant_id: &str) -> TenantInventory {
        let guard = self.tenant_mutex(tenant_id).lock_owned().await;
        TenantInventory {
            store: self.store.clone(),
            tenant_id: tenant_id.to_string(),
            _guard: guard,
        }
    }

    pub async fn list_vms(&self, tenant_id: &str) -> Result<Vec<VmRecord>> {
        self.lock(tenant_id).await.list()
    }

    pub async fn append_vm(&self, tenant_id: &str, record: VmRecord) -> Result<usize> {
        self.lock(tenant_id).await.append(record)
    }

    /// `false` when `index` is out of bounds.
    pub async fn update_vm_at(&self, tenant_id: &str, index: usize, patch: &VmPatch) -> Result<bool> {
        Ok(self.lock(tenant_id).await.update_at(index, patch)?.is_some())
    }

    /// `false` when `index` is out of bounds.
    pub async fn remove_vm_at(&self, tenant_id: &str, index: usize) -> Result<bool> {
        Ok(self.lock(tenant_id).await.remove_at(index)?.is_some())
    }

    /// Tenants that have an inventory document.
    pub fn tenants(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .list_documents(INVENTORY_PREFIX)?
            .into_iter()
            .filter_map(|name| name.strip_prefix(INVENTORY_PREFIX).map(str::to_string))
            .collect())
    }
}

/// A tenant's inventory with its mutex held.
pub struct TenantInventory {
    store: Arc<dyn DocumentStore>,
    tenant_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl TenantInventory {
    fn load(&self) -> Result<InventoryDocument> {
        store::load(self.store.as_ref(), &inventory_document(&self.tenant_id))
    }

    fn save(&self, mut doc: InventoryDocument) -> Result<()> {
        doc.tenant_id = self.tenant_id.clone();
        store::save(self.store.as_ref(), &inventory_document(&self.tenant_id), &doc)
    }

    pub fn list(&self) -> Result<Vec<VmRecord>> {
        Ok(self.load()?.vms)
    }

    pub fn get(&self, index: usize) -> Result<Option<VmRecord>> {
        Ok(self.load()?.vms.into_iter().nth(index))
    }

    /// Append and return the new record's index.
    #[instrument(skip(self, record), fields(tenant_id = %self.tenant_id, vm_name = %record.vm_name))]
    pub fn append(&self, record: VmRecord) -> Result<usize> {
        let mut doc = self.load()?;
        doc.vms.push(record);
        let index = doc.vms.len() - 1;
        self.save(doc)?;
        Ok(index)
    }

    /// Apply `patch` and return the updated record, `None` when out of bounds.
    #[instrument(skip(self, patch), fields(tenant_id = %self.tenant_id))]
    pub fn update_at(&self, index: usize, patch: &VmPatch) -> Result<Option<VmRecord>> {
        let mut doc = self.load()?;
        let Some(record) = doc.vms.get_mut(index) else {
            debug!(index, "update out of bounds");
            return Ok(None);
        };
        patch.apply(record);
        let updated = record.clone();
        self.save(doc)?;
        Ok(Some(updated))
    }

    /// Remove and return the record, `None` when out of bounds.
    #[instrument(skip(self), fields(tenant_id = %self.tenant_id))]
    pub fn remove_at(&self, index: usize) -> Result<Option<VmRecord>> {
        let mut doc = self.load()?;
        if index >= doc.vms.len() {
            debug!(index, "remove out of bounds");
            return Ok(None);
        }
        let removed = doc.vms.remove(index);
        self.save(doc)?;
        Ok(Some(removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FleetError;
    use crate::models::VmStatus;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use std::time::Duration;
    use vps_hypervisor::VmSpecs;

    fn record(name: &str) -> VmRecord {
        VmRecord {
            vm_name: name.to_string(),
            specs: VmSpecs {
                ram_gib: 1,
                vcpu: 1,
                disk_gib: 10,
            },
            status: VmStatus::Running,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_preserves_insertion_order() {
        let inventory = InventoryStore::new(Arc::new(MemoryStore::new()));
        assert_eq!(inventory.append_vm("7", record("a")).await.unwrap(), 0);
        assert_eq!(inventory.append_vm("7", record("b")).await.unwrap(), 1);

        let names: Vec<_> = inventory
            .list_vms("7")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.vm_name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(inventory.list_vms("8").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_bounds_is_false_not_error() {
        let inventory = InventoryStore::new(Arc::new(MemoryStore::new()));
        inventory.append_vm("7", record("a")).await.unwrap();

        let patch = VmPatch::status(VmStatus::Stopped);
        assert!(!inventory.update_vm_at("7", 1, &patch).await.unwrap());
        assert!(!inventory.remove_vm_at("7", 5).await.unwrap());
        assert_eq!(inventory.list_vms("7").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let inventory = InventoryStore::new(Arc::new(MemoryStore::new()));
        inventory.append_vm("7", record("a")).await.unwrap();
        inventory.append_vm("7", record("b")).await.unwrap();

        assert!(inventory
            .update_vm_at("7", 1, &VmPatch::status(VmStatus::Stopped))
            .await
            .unwrap());
        assert!(inventory.remove_vm_at("7", 0).await.unwrap());

        let vms = inventory.list_vms("7").await.unwrap();
        assert_eq!(vms.len(), 1);
        assert_eq!(vms[0].vm_name, "b");
        assert_eq!(vms[0].status, VmStatus::Stopped);
    }

    #[tokio::test]
    async fn test_storage_failure_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        let inventory = InventoryStore::new(store.clone());
        store.fail_writes_with_prefix(INVENTORY_PREFIX);

        let err = inventory.append_vm("7", record("a")).await.unwrap_err();
        assert!(matches!(err, FleetError::Storage(_)));
    }

    #[tokio::test]
    async fn test_tenants_lists_inventory_documents() {
        let store = Arc::new(MemoryStore::new());
        let inventory = InventoryStore::new(store.clone());
        inventory.append_vm("7", record("a")).await.unwrap();
        inventory.append_vm("9", record("b")).await.unwrap();
        store::save(store.as_ref(), "accounts", &serde_json::json!({})).unwrap();

        assert_eq!(inventory.tenants().unwrap(), vec!["7", "9"]);
    }

    #[tokio::test]
    async fn test_session_blocks_other_writers() {
        let inventory = InventoryStore::new(Arc::new(MemoryStore::new()));
        let session = inventory.lock("7").await;

        let contender = inventory.clone();
        let handle = tokio::spawn(async move { contender.append_vm("7", record("b")).await });

        session.append(record("a")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.list().unwrap().len(), 1);
        drop(session);

        handle.await.unwrap().unwrap();
        let names: Vec<_> = inventory
            .list_vms("7")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.vm_name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_other_tenants_not_blocked() {
        let inventory = InventoryStore::new(Arc::new(MemoryStore::new()));
        let _held = inventory.lock("7").await;

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            inventory.append_vm("8", record("x")),
        )
        .await;
        assert!(result.is_ok());
    }
}
