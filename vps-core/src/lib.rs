//! Foundation layer shared by the hypervisor driver, orchestrator, and API.

pub mod command_stream;
pub mod error;
pub mod secrets;
pub mod validation;

pub use error::{CoreError, Result};
