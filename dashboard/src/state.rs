//! Shared application state for the dashboard server.

use crate::broker::EventBroker;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub broker: EventBroker,
}

impl AppState {
    pub fn new(broker: EventBroker) -> Self {
        Self { broker }
    }
}
