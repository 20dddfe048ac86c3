use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use ultrai_core::{Coordinator, RunHandle};
use ultrai_gateway::Gateway;
use ultrai_store::ArtifactStore;

mod http;

pub use http::{app_router, serve};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    /// Runs currently executing in this process, by run ID. Entries are
    /// removed when the coordinator task finishes; the artifact directory is
    /// the durable record.
    pub active_runs: Arc<RwLock<HashMap<String, RunHandle>>>,
}

impl AppState {
    pub fn new(store: ArtifactStore, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            coordinator: Arc::new(Coordinator::new(store, gateway)),
            active_runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}
