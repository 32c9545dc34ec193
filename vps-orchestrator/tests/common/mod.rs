//! Shared fixture for orchestrator integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use vps_hypervisor::mock::MockHypervisor;
use vps_hypervisor::VmSpecs;
use vps_orchestrator::{
    AdminSet, CommandDispatcher, CoordinatorConfig, LifecycleCoordinator, MemoryStore,
};

pub const ROOT: &str = "1000";
pub const ADMIN: &str = "2000";
pub const TENANT_A: &str = "111";
pub const TENANT_B: &str = "222";

pub struct Fleet {
    pub store: Arc<MemoryStore>,
    pub driver: Arc<MockHypervisor>,
    pub coordinator: LifecycleCoordinator,
}

impl Fleet {
    pub fn dispatcher(&self) -> CommandDispatcher {
        CommandDispatcher::new(
            self.coordinator.clone(),
            Some("http://panel.test:3001".to_string()),
        )
    }
}

pub fn fleet() -> Fleet {
    fleet_with_timeout(Duration::from_secs(5))
}

pub fn fleet_with_timeout(driver_timeout: Duration) -> Fleet {
    let store = Arc::new(MemoryStore::new());
    let driver = Arc::new(MockHypervisor::new());
    let config = CoordinatorConfig {
        driver_timeout,
        ..Default::default()
    };
    let coordinator = LifecycleCoordinator::new(
        config,
        AdminSet::new(ROOT, vec![ADMIN.to_string()]),
        store.clone(),
        driver.clone(),
    );
    Fleet {
        store,
        driver,
        coordinator,
    }
}

pub fn specs(ram_gib: u32, vcpu: u32, disk_gib: u32) -> VmSpecs {
    VmSpecs {
        ram_gib,
        vcpu,
        disk_gib,
    }
}

pub fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
