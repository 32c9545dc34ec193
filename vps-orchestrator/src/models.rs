use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use vps_hypervisor::VmSpecs;

use crate::operation::OperationType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmStatus {
    Provisioning,
    Running,
    Stopped,
    Deleted,
}

impl VmStatus {
    /// Status reached by applying `op` from `self`, or `None` if the
    /// transition is not allowed.
    pub fn after(self, op: OperationType) -> Option<VmStatus> {
        use OperationType as Op;
        use VmStatus::*;

        match (self, op) {
            (Provisioning, Op::Create) => Some(Running),
            (Running | Stopped, Op::Start) => Some(Running),
            (Running | Stopped, Op::Stop) => Some(Stopped),
            (Running | Stopped, Op::Delete) => Some(Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for VmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Provisioning => "provisioning",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// One VM in a tenant's inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmRecord {
    pub vm_name: String,
    pub specs: VmSpecs,
    pub status: VmStatus,
    pub created_at: DateTime<Utc>,
}

/// Partial update applied to a stored record. `vm_name` is immutable and has no field here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmPatch {
    pub status: Option<VmStatus>,
}

impl VmPatch {
    pub fn status(status: VmStatus) -> Self {
        Self {
            status: Some(status),
        }
    }

    pub fn apply(&self, record: &mut VmRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantAccount {
    pub tenant_id: String,
    pub panel_username: String,
    pub panel_password_hash: String,
    pub created_at: DateTime<Utc>,
}
