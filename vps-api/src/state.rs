use std::sync::Arc;

use vps_orchestrator::{CommandDispatcher, DocumentStore, LifecycleCoordinator};

use crate::auth::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: LifecycleCoordinator,
    pub dispatcher: CommandDispatcher,
    pub sessions: SessionStore,
    pub store: Arc<dyn DocumentStore>,
    pub dispatch_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        coordinator: LifecycleCoordinator,
        store: Arc<dyn DocumentStore>,
        panel_url: Option<String>,
        dispatch_token: Option<String>,
    ) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(coordinator.clone(), panel_url),
            coordinator,
            sessions: SessionStore::default(),
            store,
            dispatch_token: dispatch_token.map(Arc::from),
        }
    }
}
