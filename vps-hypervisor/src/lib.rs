//! Hypervisor driver abstraction.
//!
//! A [`Hypervisor`] executes imperative lifecycle commands against an external
//! virtualization backend. Drivers report success or failure and pass the
//! backend's output through; they never retry and never verify that the
//! resulting domain state matches intent. That reconciliation belongs to the
//! caller.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub mod error;
pub mod kvm;

// When the `test-helpers` feature is enabled, include the mock hypervisor.
#[cfg(feature = "test-helpers")]
pub mod mock;

pub use error::{HypervisorError, Result};
pub use kvm::{KvmConfig, KvmHypervisor};

/// Resources requested for a VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmSpecs {
    pub ram_gib: u32,
    pub vcpu: u32,
    pub disk_gib: u32,
}

impl fmt::Display for VmSpecs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}GB RAM, {} CPU, {}GB Disk",
            self.ram_gib, self.vcpu, self.disk_gib
        )
    }
}

/// Domain state as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainState {
    Running,
    Paused,
    ShutOff,
    Crashed,
    Other(String),
}

impl DomainState {
    /// Parse the output of `virsh domstate`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "running" => Self::Running,
            "paused" | "pmsuspended" => Self::Paused,
            "shut off" => Self::ShutOff,
            "crashed" => Self::Crashed,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One sub-step of a destroy sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyStepKind {
    Stop,
    Undefine,
    RemoveStorage,
}

impl fmt::Display for DestroyStepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stop => "stop",
            Self::Undefine => "undefine",
            Self::RemoveStorage => "remove storage",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done(String),
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestroyStep {
    pub kind: DestroyStepKind,
    pub outcome: StepOutcome,
}

/// Outcome of every sub-step of a best-effort destroy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestroyReport {
    pub steps: Vec<DestroyStep>,
}

impl DestroyReport {
    fn record(&mut self, kind: DestroyStepKind, result: Result<String>) {
        let outcome = match result {
            Ok(output) => StepOutcome::Done(output),
            Err(e) => StepOutcome::Failed(e.to_string()),
        };
        self.steps.push(DestroyStep { kind, outcome });
    }

    /// Failed sub-steps that matter. A failed stop is expected for a domain
    /// that was already down and is not reported.
    pub fn failures(&self) -> Vec<(DestroyStepKind, &str)> {
        self.steps
            .iter()
            .filter(|s| s.kind != DestroyStepKind::Stop)
            .filter_map(|s| match &s.outcome {
                StepOutcome::Failed(msg) => Some((s.kind, msg.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failures().is_empty()
    }
}

/// The contract every virtualization backend implements.
///
/// Every method is a single blocking external invocation. Callers are expected
/// to run them off the async executor.
pub trait Hypervisor: Send + Sync {
    /// Get the name of the driver (e.g., "kvm", "mock").
    fn name(&self) -> &'static str;

    /// Allocate storage for and define + boot a new domain.
    fn create(&self, vm_name: &str, specs: &VmSpecs) -> Result<String>;

    /// Boot an existing, stopped domain.
    fn start(&self, vm_name: &str) -> Result<String>;

    /// Power off a running domain.
    fn stop(&self, vm_name: &str) -> Result<String>;

    /// Remove the domain definition.
    fn undefine(&self, vm_name: &str) -> Result<String>;

    /// Delete the domain's backing disk.
    fn remove_storage(&self, vm_name: &str) -> Result<String>;

    /// Query the current domain state.
    fn domain_state(&self, vm_name: &str) -> Result<DomainState>;

    /// Best-effort teardown: stop if running (failure ignored), undefine,
    /// remove storage. A failing sub-step never prevents the later ones.
    fn destroy(&self, vm_name: &str) -> DestroyReport {
        let mut report = DestroyReport::default();

        match self.domain_state(vm_name) {
            Ok(DomainState::ShutOff) => report.steps.push(DestroyStep {
                kind: DestroyStepKind::Stop,
                outcome: StepOutcome::Skipped,
            }),
            _ => report.record(DestroyStepKind::Stop, self.stop(vm_name)),
        }

        report.record(DestroyStepKind::Undefine, self.undefine(vm_name));
        report.record(DestroyStepKind::RemoveStorage, self.remove_storage(vm_name));

        if report.is_clean() {
            info!(vm_name, driver = self.name(), "domain destroyed");
        } else {
            for (kind, msg) in report.failures() {
                warn!(vm_name, step = %kind, "destroy step failed: {}", msg);
            }
        }

        report
    }
}
