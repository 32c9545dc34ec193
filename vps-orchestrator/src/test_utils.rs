use std::sync::Arc;
use std::time::Duration;

use vps_hypervisor::mock::MockHypervisor;

use crate::admin::AdminSet;
use crate::coordinator::{CoordinatorConfig, LifecycleCoordinator};
use crate::dispatch::CommandDispatcher;
use crate::store::MemoryStore;

/// Root admin identity used by [`TestFleet`]
pub const ROOT_ADMIN: &str = "1000";

/// A coordinator wired to an in-memory store and the mock hypervisor.
pub struct TestFleet {
    pub store: Arc<MemoryStore>,
    pub driver: Arc<MockHypervisor>,
    pub coordinator: LifecycleCoordinator,
}

impl TestFleet {
    pub fn new() -> Self {
        Self::with_config(CoordinatorConfig {
            driver_timeout: Duration::from_secs(5),
            ..Default::default()
        })
    }

    pub fn with_config(config: CoordinatorConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let driver = Arc::new(MockHypervisor::new());
        let coordinator = LifecycleCoordinator::new(
            config,
            AdminSet::new(ROOT_ADMIN, Vec::new()),
            store.clone(),
            driver.clone(),
        );
        Self {
            store,
            driver,
            coordinator,
        }
    }

    pub fn dispatcher(&self, panel_url: Option<&str>) -> CommandDispatcher {
        CommandDispatcher::new(self.coordinator.clone(), panel_url.map(str::to_string))
    }
}

impl Default for TestFleet {
    fn default() -> Self {
        Self::new()
    }
}
