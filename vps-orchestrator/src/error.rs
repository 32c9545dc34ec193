use thiserror::Error;
use vps_core::CoreError;
use vps_hypervisor::HypervisorError;

pub type Result<T> = std::result::Result<T, FleetError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FleetError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("VM creation failed: {0}")]
    Provision(String),

    #[error("Hypervisor error: {0}")]
    Driver(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl FleetError {
    /// Errors the caller can fix themselves. These are answered, not logged as failures.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Authorization(_) | Self::NotFound(_)
        )
    }

    /// Short machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Authorization(_) => "authorization",
            Self::NotFound(_) => "not_found",
            Self::Provision(_) => "provision",
            Self::Driver(_) => "driver",
            Self::Timeout(_) => "timeout",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<CoreError> for FleetError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::Validation(msg),
            CoreError::Timeout(msg) => Self::Timeout(msg),
            CoreError::Command(msg) => Self::Driver(msg),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<HypervisorError> for FleetError {
    fn from(err: HypervisorError) -> Self {
        match err {
            HypervisorError::Timeout(msg) => Self::Timeout(msg),
            HypervisorError::InvalidRequest(msg) => Self::Validation(msg),
            other => Self::Driver(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for FleetError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("Serialization error: {}", err))
    }
}

impl From<std::io::Error> for FleetError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(format!("I/O error: {}", err))
    }
}
