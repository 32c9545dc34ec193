//! In-process hypervisor for tests: records calls, simulates domain state,
//! and can be told to fail or stall specific operations.

use std::collections::HashMap;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::{DomainState, Hypervisor, HypervisorError, Result, VmSpecs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Create,
    Start,
    Stop,
    Undefine,
    RemoveStorage,
    DomainState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub op: MockOp,
    pub vm_name: String,
}

#[derive(Debug, Default)]
struct MockInner {
    calls: Vec<MockCall>,
    failures: HashMap<MockOp, String>,
    delays: HashMap<MockOp, Duration>,
    domains: HashMap<String, DomainState>,
}

#[derive(Debug, Default)]
pub struct MockHypervisor {
    inner: Mutex<MockInner>,
}

impl MockHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future call of `op` fail with `message`.
    pub fn fail_on(&self, op: MockOp, message: &str) {
        self.lock().failures.insert(op, message.to_string());
    }

    pub fn clear_failure(&self, op: MockOp) {
        self.lock().failures.remove(&op);
    }

    /// Block every future call of `op` for `delay` before it completes.
    pub fn delay_on(&self, op: MockOp, delay: Duration) {
        self.lock().delays.insert(op, delay);
    }

    pub fn state_of(&self, vm_name: &str) -> Option<DomainState> {
        self.lock().domains.get(vm_name).cloned()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, op: MockOp) -> usize {
        self.lock().calls.iter().filter(|c| c.op == op).count()
    }

    /// Lifecycle calls only, ignoring state probes.
    pub fn total_mutations(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op != MockOp::DomainState)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockInner> {
        // A panicking test thread must not hide the recorded calls from the rest
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, op: MockOp, vm_name: &str) -> Result<()> {
        let (delay, failure) = {
            let mut inner = self.lock();
            inner.calls.push(MockCall {
                op,
                vm_name: vm_name.to_string(),
            });
            (inner.delays.get(&op).copied(), inner.failures.get(&op).cloned())
        };

        if let Some(delay) = delay {
            thread::sleep(delay);
        }

        match failure {
            Some(message) => Err(HypervisorError::Command(message)),
            None => Ok(()),
        }
    }

    fn transition(&self, vm_name: &str, state: Option<DomainState>) {
        let mut inner = self.lock();
        match state {
            Some(state) => {
                inner.domains.insert(vm_name.to_string(), state);
            }
            None => {
                inner.domains.remove(vm_name);
            }
        }
    }
}

impl Hypervisor for MockHypervisor {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn create(&self, vm_name: &str, specs: &VmSpecs) -> Result<String> {
        self.enter(MockOp::Create, vm_name)?;
        self.transition(vm_name, Some(DomainState::Running));
        Ok(format!("Domain '{}' created ({})", vm_name, specs))
    }

    fn start(&self, vm_name: &str) -> Result<String> {
        self.enter(MockOp::Start, vm_name)?;
        self.transition(vm_name, Some(DomainState::Running));
        Ok(format!("Domain '{}' started", vm_name))
    }

    fn stop(&self, vm_name: &str) -> Result<String> {
        self.enter(MockOp::Stop, vm_name)?;
        self.transition(vm_name, Some(DomainState::ShutOff));
        Ok(format!("Domain '{}' destroyed", vm_name))
    }

    fn undefine(&self, vm_name: &str) -> Result<String> {
        self.enter(MockOp::Undefine, vm_name)?;
        self.transition(vm_name, None);
        Ok(format!("Domain '{}' has been undefined", vm_name))
    }

    fn remove_storage(&self, vm_name: &str) -> Result<String> {
        self.enter(MockOp::RemoveStorage, vm_name)?;
        Ok(format!("removed {}.qcow2", vm_name))
    }

    fn domain_state(&self, vm_name: &str) -> Result<DomainState> {
        self.enter(MockOp::DomainState, vm_name)?;
        self.state_of(vm_name).ok_or_else(|| {
            HypervisorError::Command(format!(
                "error: failed to get domain '{}'",
                vm_name
            ))
        })
    }
}
