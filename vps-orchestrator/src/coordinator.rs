//! Lifecycle coordination: authorization, credential issuance, hypervisor
//! calls, and inventory commits, in that order.
//!
//! The coordinator keeps no VM state between calls. Every start, stop, and
//! delete re-reads the record under the tenant's inventory lock, drives the
//! hypervisor, and commits only after the driver reported success. A failed or
//! timed-out driver call leaves the persisted record as it was.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use vps_core::validation::{validate_positive, validate_tenant_id, validate_vm_name};
use vps_hypervisor::{DomainState, Hypervisor, VmSpecs};

use crate::admin::AdminSet;
use crate::credentials::{CredentialIssuer, IssuedCredentials};
use crate::error::{FleetError, Result};
use crate::inventory::InventoryStore;
use crate::models::{VmPatch, VmRecord, VmStatus};
use crate::operation::{Operation, OperationLog, OperationType};
use crate::store::DocumentStore;

/// Default bound on a single hypervisor invocation
pub const DEFAULT_DRIVER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// First component of generated VM names
    pub name_prefix: String,
    pub driver_timeout: Duration,
    /// Probe the domain after create and warn if it is not running
    pub verify_after_create: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            name_prefix: "vps".to_string(),
            driver_timeout: DEFAULT_DRIVER_TIMEOUT,
            verify_after_create: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub record: VmRecord,
    /// Position of the new record in the target's inventory
    pub index: usize,
    pub credentials: IssuedCredentials,
}

/// A create that failed after the target's account was issued.
///
/// When the account is new, `credentials` carries its one-time secret: the
/// account stays persisted, so this is the only chance to show it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error}")]
pub struct CreateFailure {
    pub error: FleetError,
    pub credentials: Option<IssuedCredentials>,
}

impl From<FleetError> for CreateFailure {
    fn from(error: FleetError) -> Self {
        Self {
            error,
            credentials: None,
        }
    }
}

impl From<CreateFailure> for FleetError {
    fn from(failure: CreateFailure) -> Self {
        failure.error
    }
}

#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    pub record: VmRecord,
    /// Destroy sub-steps that failed; the record was removed regardless
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FleetStats {
    /// Tenants owning at least one VM
    pub tenants: usize,
    pub vms: usize,
    pub running: usize,
    pub stopped: usize,
}

#[derive(Clone)]
pub struct LifecycleCoordinator {
    config: CoordinatorConfig,
    admins: Arc<AdminSet>,
    credentials: CredentialIssuer,
    inventory: InventoryStore,
    operations: OperationLog,
    driver: Arc<dyn Hypervisor>,
}

impl LifecycleCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        admins: AdminSet,
        store: Arc<dyn DocumentStore>,
        driver: Arc<dyn Hypervisor>,
    ) -> Self {
        Self {
            config,
            admins: Arc::new(admins),
            credentials: CredentialIssuer::new(store.clone()),
            inventory: InventoryStore::new(store.clone()),
            operations: OperationLog::new(store),
            driver,
        }
    }

    pub fn credentials(&self) -> &CredentialIssuer {
        &self.credentials
    }

    pub fn is_admin(&self, tenant_id: &str) -> bool {
        self.admins.is_admin(tenant_id)
    }

    fn require_admin(&self, caller_id: &str, action: &str) -> Result<()> {
        if self.admins.is_admin(caller_id) {
            Ok(())
        } else {
            debug!(caller_id, action, "rejected non-admin caller");
            Err(FleetError::Authorization(format!(
                "only admins can {} VPS instances",
                action
            )))
        }
    }

    /// `<prefix>-<tenant>-<millis>-<8 hex>`; the random suffix keeps names
    /// distinct within one millisecond.
    fn generate_vm_name(&self, tenant_id: &str) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "{}-{}-{}-{}",
            self.config.name_prefix,
            tenant_id,
            Utc::now().timestamp_millis(),
            &suffix[..8]
        )
    }

    /// Run one driver call on the blocking pool, bounded by the driver timeout.
    async fn drive<T, F>(&self, action: &'static str, vm_name: &str, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Hypervisor, &str) -> vps_hypervisor::Result<T> + Send + 'static,
    {
        let driver = self.driver.clone();
        let name = vm_name.to_string();
        let task = tokio::task::spawn_blocking(move || call(driver.as_ref(), &name));

        match tokio::time::timeout(self.config.driver_timeout, task).await {
            Ok(Ok(result)) => result.map_err(FleetError::from),
            Ok(Err(join_error)) => Err(FleetError::Driver(format!(
                "{} of {} aborted: {}",
                action, vm_name, join_error
            ))),
            Err(_) => Err(FleetError::Timeout(format!(
                "{} of {} did not finish within {}s; its state is unknown",
                action,
                vm_name,
                self.config.driver_timeout.as_secs()
            ))),
        }
    }

    async fn finish(&self, op: Operation, result: &Result<()>) {
        let op = match result {
            Ok(()) => op.succeeded(),
            Err(e @ FleetError::Timeout(_)) => op.pending(e),
            Err(e) => op.failed(e),
        };
        self.operations.record(op).await;
    }

    fn log_failure(&self, action: OperationType, err: &FleetError) {
        if err.is_user_error() {
            debug!(%action, "{}", err);
        } else {
            error!(%action, kind = err.kind(), "{}", err);
        }
    }

    /// Provision a VM for `target_id`. Admin only.
    ///
    /// Credentials are issued before the hypervisor is touched; if that fails
    /// nothing is created. A driver failure writes no inventory. Failures after
    /// issuance hand a new account's secret back in [`CreateFailure`].
    #[instrument(skip(self))]
    pub async fn create(
        &self,
        caller_id: &str,
        target_id: &str,
        specs: VmSpecs,
    ) -> std::result::Result<CreateOutcome, CreateFailure> {
        let result = self.try_create(caller_id, target_id, specs).await;
        if let Err(failure) = &result {
            self.log_failure(OperationType::Create, &failure.error);
        }
        result
    }

    async fn try_create(
        &self,
        caller_id: &str,
        target_id: &str,
        specs: VmSpecs,
    ) -> std::result::Result<CreateOutcome, CreateFailure> {
        self.check_create(caller_id, target_id, &specs)?;
        let credentials = self.credentials.issue_if_absent(target_id).await?;

        match self.provision(target_id, specs).await {
            Ok((record, index)) => {
                info!(vm_name = %record.vm_name, index, new_account = credentials.is_new(), "VM created");
                Ok(CreateOutcome {
                    record,
                    index,
                    credentials,
                })
            }
            Err(error) => Err(CreateFailure {
                error,
                credentials: credentials.is_new().then_some(credentials),
            }),
        }
    }

    /// Authorization is checked before any input.
    fn check_create(&self, caller_id: &str, target_id: &str, specs: &VmSpecs) -> Result<()> {
        self.require_admin(caller_id, "create")?;
        validate_tenant_id(target_id)?;
        validate_positive("RAM", specs.ram_gib.into())?;
        validate_positive("CPU", specs.vcpu.into())?;
        validate_positive("Disk", specs.disk_gib.into())?;
        Ok(())
    }

    /// Define the domain and append its record under the target's lock.
    async fn provision(&self, target_id: &str, specs: VmSpecs) -> Result<(VmRecord, usize)> {
        let session = self.inventory.lock(target_id).await;
        let vm_name = self.generate_vm_name(target_id);
        validate_vm_name(&vm_name)?;

        let mut record = VmRecord {
            vm_name: vm_name.clone(),
            specs,
            status: VmStatus::Provisioning,
            created_at: Utc::now(),
        };
        let op = Operation::begin(target_id, OperationType::Create).with_vm(&vm_name);

        info!(vm_name = %vm_name, %specs, "creating VM");
        let created = self
            .drive("create", &vm_name, move |driver, name| driver.create(name, &specs))
            .await
            .map_err(|e| match e {
                FleetError::Driver(msg) => FleetError::Provision(msg),
                other => other,
            });
        if let Err(e) = created {
            self.finish(op, &Err(e.clone())).await;
            return Err(e);
        }

        if self.config.verify_after_create {
            match self.drive("state probe", &vm_name, |d, n| d.domain_state(n)).await {
                Ok(DomainState::Running) => {}
                Ok(state) => warn!(vm_name = %vm_name, ?state, "VM created but not running"),
                Err(e) => warn!(vm_name = %vm_name, "could not verify new VM: {}", e),
            }
        }

        record.status = record
            .status
            .after(OperationType::Create)
            .unwrap_or(VmStatus::Running);

        let index = match session.append(record.clone()) {
            Ok(index) => index,
            Err(e) => {
                // No unrecorded domain may stay behind
                error!(vm_name = %vm_name, "failed to record new VM, destroying it: {}", e);
                if let Err(cleanup) = self
                    .drive("destroy", &vm_name, |d, n| Ok(d.destroy(n)))
                    .await
                {
                    warn!(vm_name = %vm_name, "cleanup after failed commit: {}", cleanup);
                }
                self.finish(op, &Err(e.clone())).await;
                return Err(e);
            }
        };
        drop(session);

        self.finish(op, &Ok(())).await;
        Ok((record, index))
    }

    /// Boot the VM at `index` in the caller's own inventory.
    #[instrument(skip(self))]
    pub async fn start(&self, caller_id: &str, index: usize) -> Result<VmRecord> {
        self.power(caller_id, index, OperationType::Start).await
    }

    /// Power off the VM at `index` in the caller's own inventory.
    #[instrument(skip(self))]
    pub async fn stop(&self, caller_id: &str, index: usize) -> Result<VmRecord> {
        self.power(caller_id, index, OperationType::Stop).await
    }

    async fn power(&self, caller_id: &str, index: usize, action: OperationType) -> Result<VmRecord> {
        let result = self.try_power(caller_id, index, action).await;
        if let Err(e) = &result {
            self.log_failure(action, e);
        }
        result
    }

    async fn try_power(&self, caller_id: &str, index: usize, action: OperationType) -> Result<VmRecord> {
        validate_tenant_id(caller_id)?;

        let session = self.inventory.lock(caller_id).await;
        let record = session
            .get(index)?
            .ok_or_else(|| FleetError::NotFound(format!("no VPS at index {}", index)))?;
        let next = record.status.after(action).ok_or_else(|| {
            FleetError::Validation(format!(
                "cannot {} a VPS that is {}",
                action, record.status
            ))
        })?;

        let op = Operation::begin(caller_id, action).with_vm(&record.vm_name);
        let driven = match action {
            OperationType::Start => self.drive("start", &record.vm_name, |d, n| d.start(n)).await,
            _ => self.drive("stop", &record.vm_name, |d, n| d.stop(n)).await,
        };
        if let Err(e) = driven {
            self.finish(op, &Err(e.clone())).await;
            return Err(e);
        }

        let committed = session.update_at(index, &VmPatch::status(next));
        let updated = match committed {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                let e = FleetError::NotFound(format!("no VPS at index {}", index));
                self.finish(op, &Err(e.clone())).await;
                return Err(e);
            }
            Err(e) => {
                self.finish(op, &Err(e.clone())).await;
                return Err(e);
            }
        };
        drop(session);

        self.finish(op, &Ok(())).await;
        info!(vm_name = %updated.vm_name, %action, status = %updated.status, "VM power state changed");
        Ok(updated)
    }

    /// Destroy the VM at `index` in the caller's own inventory. Admin only.
    pub async fn delete(&self, caller_id: &str, index: usize) -> Result<DeleteOutcome> {
        self.delete_for(caller_id, caller_id, index).await
    }

    /// Destroy the VM at `index` in `target_id`'s inventory. Admin only.
    ///
    /// Destroy sub-step failures become warnings and the record is removed
    /// regardless. Only a timeout keeps the record, because the domain may
    /// still exist.
    #[instrument(skip(self))]
    pub async fn delete_for(&self, caller_id: &str, target_id: &str, index: usize) -> Result<DeleteOutcome> {
        let result = self.try_delete(caller_id, target_id, index).await;
        if let Err(e) = &result {
            self.log_failure(OperationType::Delete, e);
        }
        result
    }

    async fn try_delete(&self, caller_id: &str, target_id: &str, index: usize) -> Result<DeleteOutcome> {
        self.require_admin(caller_id, "delete")?;
        validate_tenant_id(target_id)?;

        let session = self.inventory.lock(target_id).await;
        let record = session
            .get(index)?
            .ok_or_else(|| FleetError::NotFound(format!("no VPS at index {}", index)))?;
        record.status.after(OperationType::Delete).ok_or_else(|| {
            FleetError::Validation(format!("cannot delete a VPS that is {}", record.status))
        })?;

        let mut op = Operation::begin(target_id, OperationType::Delete).with_vm(&record.vm_name);
        let warnings = match self.drive("destroy", &record.vm_name, |d, n| Ok(d.destroy(n))).await {
            Ok(report) => report
                .failures()
                .into_iter()
                .map(|(step, msg)| format!("{} failed: {}", step, msg))
                .collect(),
            Err(e @ FleetError::Timeout(_)) => {
                self.finish(op, &Err(e.clone())).await;
                return Err(e);
            }
            Err(e) => vec![e.to_string()],
        };

        if let Err(e) = session.remove_at(index) {
            self.finish(op, &Err(e.clone())).await;
            return Err(e);
        }
        drop(session);

        for warning in &warnings {
            warn!(vm_name = %record.vm_name, "{}", warning);
        }
        if !warnings.is_empty() {
            op.error = Some(warnings.join("; "));
        }
        self.finish(op, &Ok(())).await;
        info!(vm_name = %record.vm_name, clean = warnings.is_empty(), "VM deleted");

        Ok(DeleteOutcome { record, warnings })
    }

    /// The caller's inventory in creation order.
    pub async fn list(&self, caller_id: &str) -> Result<Vec<VmRecord>> {
        validate_tenant_id(caller_id)?;
        self.inventory.list_vms(caller_id).await
    }

    /// Fleet-wide counts. Admin only.
    pub async fn stats(&self, caller_id: &str) -> Result<FleetStats> {
        self.require_admin(caller_id, "view stats for")?;

        let mut stats = FleetStats::default();
        for tenant_id in self.inventory.tenants()? {
            let vms = self.inventory.list_vms(&tenant_id).await?;
            if vms.is_empty() {
                continue;
            }
            stats.tenants += 1;
            stats.vms += vms.len();
            stats.running += vms.iter().filter(|v| v.status == VmStatus::Running).count();
            stats.stopped += vms.iter().filter(|v| v.status == VmStatus::Stopped).count();
        }
        Ok(stats)
    }

    /// Operation history, newest first. Admins see every tenant.
    pub async fn operations(&self, caller_id: &str) -> Result<Vec<Operation>> {
        if self.admins.is_admin(caller_id) {
            self.operations.list(None).await
        } else {
            self.operations.list(Some(caller_id)).await
        }
    }
}
