use std::sync::Arc;

use dt_store::EncounterStore;

use crate::config::Config;
use crate::encounter_lock::EncounterLockMap;
use crate::hub::EncounterHub;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn EncounterStore>,
    pub hub: Arc<EncounterHub>,
    pub encounter_locks: Arc<EncounterLockMap>,
}
