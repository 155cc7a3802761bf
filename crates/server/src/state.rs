use std::sync::Arc;

use services::services::deliverable_sync::DeliverableSyncService;

#[derive(Clone)]
pub struct AppState {
    sync: Arc<DeliverableSyncService>,
}

impl AppState {
    pub fn new(sync: Arc<DeliverableSyncService>) -> Self {
        Self { sync }
    }

    pub fn sync(&self) -> &DeliverableSyncService {
        &self.sync
    }
}
