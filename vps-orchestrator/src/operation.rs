//! Append-only history of lifecycle calls.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::store::{self, DocumentStore};

pub const OPERATIONS_DOCUMENT: &str = "operations";

/// Entries kept in the log; older ones are dropped.
pub const OPERATION_LOG_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_name: Option<String>,
    pub operation_type: OperationType,
    pub status: OperationStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Operation {
    pub fn begin(tenant_id: &str, operation_type: OperationType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            vm_name: None,
            operation_type,
            status: OperationStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn with_vm(mut self, vm_name: &str) -> Self {
        self.vm_name = Some(vm_name.to_string());
        self
    }

    pub fn succeeded(mut self) -> Self {
        self.status = OperationStatus::Success;
        self.completed_at = Some(Utc::now());
        self
    }

    pub fn failed(mut self, error: impl ToString) -> Self {
        self.status = OperationStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.to_string());
        self
    }

    /// Outcome unknown (the driver call timed out). `completed_at` stays empty.
    pub fn pending(mut self, error: impl ToString) -> Self {
        self.status = OperationStatus::Pending;
        self.error = Some(error.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Start,
    Stop,
    Delete,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OperationsDocument {
    operations: Vec<Operation>,
}

/// Capped operation history stored newest first in one document.
#[derive(Clone)]
pub struct OperationLog {
    store: Arc<dyn DocumentStore>,
    write_lock: Arc<Mutex<()>>,
}

impl OperationLog {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Append an entry. Failures are logged and swallowed; history never
    /// changes the outcome of the call being recorded.
    pub async fn record(&self, operation: Operation) {
        let _guard = self.write_lock.lock().await;
        if let Err(e) = self.prepend(operation.clone()) {
            warn!(
                operation_id = %operation.id,
                tenant_id = %operation.tenant_id,
                "failed to record operation: {}",
                e
            );
        }
    }

    fn prepend(&self, operation: Operation) -> Result<()> {
        let mut doc: OperationsDocument = store::load(self.store.as_ref(), OPERATIONS_DOCUMENT)?;
        doc.operations.insert(0, operation);
        doc.operations.truncate(OPERATION_LOG_CAPACITY);
        store::save(self.store.as_ref(), OPERATIONS_DOCUMENT, &doc)
    }

    /// Entries newest first, optionally for one tenant.
    pub async fn list(&self, tenant_id: Option<&str>) -> Result<Vec<Operation>> {
        let doc: OperationsDocument = store::load(self.store.as_ref(), OPERATIONS_DOCUMENT)?;
        Ok(doc
            .operations
            .into_iter()
            .filter(|op| tenant_id.map_or(true, |t| op.tenant_id == t))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_record_and_list_newest_first() {
        let log = OperationLog::new(Arc::new(MemoryStore::new()));

        log.record(Operation::begin("1", OperationType::Create).succeeded())
            .await;
        log.record(Operation::begin("2", OperationType::Start).failed("boom"))
            .await;

        let all = log.list(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].tenant_id, "2");
        assert_eq!(all[0].status, OperationStatus::Failed);
        assert_eq!(all[0].error.as_deref(), Some("boom"));
        assert_eq!(all[1].operation_type, OperationType::Create);

        let only_one = log.list(Some("1")).await.unwrap();
        assert_eq!(only_one.len(), 1);
        assert_eq!(only_one[0].status, OperationStatus::Success);
    }

    #[tokio::test]
    async fn test_log_is_capped() {
        let log = OperationLog::new(Arc::new(MemoryStore::new()));
        for i in 0..OPERATION_LOG_CAPACITY + 5 {
            log.record(Operation::begin(&i.to_string(), OperationType::Stop))
                .await;
        }

        let all = log.list(None).await.unwrap();
        assert_eq!(all.len(), OPERATION_LOG_CAPACITY);
        assert_eq!(all[0].tenant_id, (OPERATION_LOG_CAPACITY + 4).to_string());
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let store = Arc::new(MemoryStore::new());
        store.fail_writes_with_prefix(OPERATIONS_DOCUMENT);
        let log = OperationLog::new(store.clone());

        log.record(Operation::begin("1", OperationType::Delete))
            .await;

        store.clear_failures();
        assert!(log.list(None).await.unwrap().is_empty());
    }

    #[test]
    fn test_pending_has_no_completion_time() {
        let op = Operation::begin("1", OperationType::Start)
            .with_vm("vps-1")
            .pending("timed out");
        assert_eq!(op.status, OperationStatus::Pending);
        assert!(op.completed_at.is_none());
        assert_eq!(op.vm_name.as_deref(), Some("vps-1"));
    }
}
