//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the store, the stateful failure classifier, the dashboard
//! subscriber registry (robot id -> client id -> outbound sender), and the
//! registry of currently connected agents.

use std::collections::HashMap;
use std::sync::Arc;

use events::{DashboardEvent, HeartbeatData};
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock, mpsc};
use uuid::Uuid;

use crate::services::classifier::FailureClassifier;
use crate::store::Store;

// =============================================================================
// CONNECTED ROBOT
// =============================================================================

/// Live view of one connected agent. Keyed by robot id in `AppState::robots`.
#[derive(Debug, Clone)]
pub struct ConnectedRobot {
    /// Identifies the socket that owns this entry; a reconnecting agent
    /// replaces it, and the stale socket's close must not remove the new one.
    pub connection_id: Uuid,
    pub session_id: Option<Uuid>,
    pub connected_at: OffsetDateTime,
    pub last_seen: OffsetDateTime,
    pub heartbeat: Option<HeartbeatData>,
}

/// Dashboard client senders for one robot, keyed by client id.
pub type Subscribers = HashMap<Uuid, mpsc::Sender<DashboardEvent>>;

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Copy.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub classifier: Arc<Mutex<FailureClassifier>>,
    pub subscribers: Arc<RwLock<HashMap<String, Subscribers>>>,
    pub robots: Arc<RwLock<HashMap<String, ConnectedRobot>>>,
    /// Outbound queue depth for each dashboard socket.
    pub dashboard_channel_capacity: usize,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, dashboard_channel_capacity: usize) -> Self {
        Self {
            store,
            classifier: Arc::new(Mutex::new(FailureClassifier::new())),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            robots: Arc::new(RwLock::new(HashMap::new())),
            dashboard_channel_capacity: dashboard_channel_capacity.max(1),
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
