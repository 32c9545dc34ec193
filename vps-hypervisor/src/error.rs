//! Error types for hypervisor operations.

use thiserror::Error;
use vps_core::CoreError;

/// Errors reported by a hypervisor driver.
///
/// `Command` carries the backend's diagnostic text unchanged so operators can
/// see exactly what libvirt or qemu-img said.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HypervisorError {
    #[error("{0}")]
    Command(String),

    #[error("{0}")]
    Timeout(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Dependency not found: {0}")]
    DependencyNotFound(String),
}

impl From<CoreError> for HypervisorError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Command(msg) => Self::Command(msg),
            CoreError::Timeout(msg) => Self::Timeout(msg),
            CoreError::Validation(msg) => Self::InvalidRequest(msg),
            CoreError::Dependency(msg) => Self::DependencyNotFound(msg),
            other => Self::Command(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, HypervisorError>;
