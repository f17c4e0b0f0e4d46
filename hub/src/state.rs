use std::sync::Arc;

use sweep_bridge::{DomInputDriver, DomResultReader, connect_page};
use sweep_core::{Optimizer, RunLock, SweepSettings};

use crate::config::HubConfig;
use crate::jobs::JobStore;
use crate::ws::broadcast::BroadcastHub;

/// Optimizer over the shared page collaborators.
pub type PageOptimizer = Optimizer<Arc<DomInputDriver>, Arc<DomResultReader>>;

/// Shared application state, passed to all route handlers via `axum::extract::State`.
pub struct AppState {
    pub config: HubConfig,
    pub broadcast: BroadcastHub,
    pub driver: Arc<DomInputDriver>,
    pub reader: Arc<DomResultReader>,
    /// Single claim on the page, shared by every optimizer this hub builds.
    pub page_lock: RunLock,
    pub jobs: Arc<JobStore>,
}

impl AppState {
    pub fn new(config: HubConfig) -> Arc<Self> {
        let (driver, reader) = connect_page(config.bridge.clone());
        Arc::new(Self {
            config,
            broadcast: BroadcastHub::new(),
            driver: Arc::new(driver),
            reader: Arc::new(reader),
            page_lock: RunLock::new(),
            jobs: JobStore::new(),
        })
    }

    /// Optimizer with per-request settings that contends on the shared page lock.
    pub fn optimizer(&self, settings: SweepSettings) -> PageOptimizer {
        Optimizer::new(Arc::clone(&self.driver), Arc::clone(&self.reader))
            .with_settings(settings)
            .with_lock(self.page_lock.clone())
    }
}

/// State pointed at an agent socket that does not exist, with near-zero delays.
#[cfg(test)]
pub(crate) fn test_state(dir: &std::path::Path) -> Arc<AppState> {
    use sweep_bridge::BridgeSettings;

    let config = HubConfig {
        bind: "127.0.0.1".into(),
        port: 0,
        token: String::new(),
        bridge: BridgeSettings {
            socket_path: dir.join("absent.sock"),
            element_timeout_ms: 20,
            poll_interval_ms: 5,
            post_apply_ms: 0,
            rpc_timeout_ms: 100,
        },
        sweep: SweepSettings {
            settle_ms: 0,
            ..Default::default()
        },
    };
    AppState::new(config)
}
