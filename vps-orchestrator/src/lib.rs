//! VPS fleet lifecycle management
//!
//! This crate owns the tenant to VM inventory, issues panel credentials, and
//! sequences hypervisor calls for create, start, stop, and delete. It is
//! consumed by the vps-api HTTP service but can also be driven directly by
//! other front ends through [`CommandDispatcher`].

pub mod admin;
pub mod coordinator;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod inventory;
pub mod models;
pub mod operation;
pub mod store;

pub use admin::AdminSet;
pub use coordinator::{
    CoordinatorConfig, CreateFailure, CreateOutcome, DeleteOutcome, FleetStats,
    LifecycleCoordinator,
};
pub use credentials::{CredentialIssuer, IssuedCredentials};
pub use dispatch::{CommandDispatcher, PanelCredentials, UserFacingResult};
pub use error::{FleetError, Result};
pub use inventory::{InventoryStore, TenantInventory};
pub use models::{TenantAccount, VmPatch, VmRecord, VmStatus};
pub use operation::{Operation, OperationLog, OperationStatus, OperationType};
pub use store::{DocumentStore, JsonFileStore, MemoryStore};

#[cfg(feature = "test-utils")]
pub mod test_utils;
