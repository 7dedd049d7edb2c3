#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use studiolink_catalog::{BindingDescriptor, Catalog};
use studiolink_lib::{ConnectionState, ControlSurface, Engine, EngineConfig};
use studiolink_test::MockStudio;

/// Surface that records every call.
#[derive(Default)]
pub struct RecordingSurface {
    pub definitions: Mutex<Vec<usize>>,
    pub checks: Mutex<Vec<Vec<String>>>,
    pub refreshes: AtomicUsize,
    pub statuses: Mutex<Vec<ConnectionState>>,
}

impl RecordingSurface {
    pub fn checked(&self, control_id: &str) -> bool {
        self.checks
            .lock()
            .iter()
            .any(|ids| ids.iter().any(|id| id == control_id))
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn saw_status(&self, state: ConnectionState) -> bool {
        self.statuses.lock().contains(&state)
    }
}

impl ControlSurface for RecordingSurface {
    fn define_controls(&self, descriptors: &[BindingDescriptor]) {
        self.definitions.lock().push(descriptors.len());
    }

    fn check_controls(&self, control_ids: &[String]) {
        self.checks.lock().push(control_ids.to_vec());
    }

    fn refresh_all(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn status_changed(&self, state: ConnectionState, _message: Option<&str>) {
        self.statuses.lock().push(state);
    }
}

pub fn fixture_catalog() -> Catalog {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../tests/fixtures/catalog.json");
    Catalog::load(&path).expect("fixture catalog")
}

pub fn config_for(studio: &MockStudio) -> EngineConfig {
    EngineConfig::new()
        .with_endpoint(studio.host(), studio.port())
        .with_reconnect_delay(Duration::from_millis(100))
        .with_connect_timeout(Duration::from_secs(2))
        .with_request_timeout(Some(Duration::from_secs(2)))
}

/// Engine connected to `studio`, with its recording surface.
pub async fn connected_engine(studio: &MockStudio) -> (Arc<Engine>, Arc<RecordingSurface>) {
    connected_engine_with(config_for(studio)).await
}

pub async fn connected_engine_with(config: EngineConfig) -> (Arc<Engine>, Arc<RecordingSurface>) {
    let surface = Arc::new(RecordingSurface::default());
    let engine = Arc::new(Engine::new(config, fixture_catalog(), surface.clone()));
    engine.init().await.expect("engine connects");
    // Resync after open ends with the first refresh.
    let metrics = engine.metrics();
    assert!(wait_for(Duration::from_secs(2), || metrics.refreshes_total.get() >= 1).await);
    (engine, surface)
}

/// Poll `check` until it holds or the timeout passes.
pub async fn wait_for(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
