//! Application state shared across handlers.

use concierge::Concierge;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The booking concierge.
    pub concierge: Concierge,
    /// Shared secret for the messaging webhook handshake.
    pub verify_token: String,
}

impl AppState {
    /// Create new application state.
    pub fn new(concierge: Concierge, verify_token: String) -> Self {
        Self {
            concierge,
            verify_token,
        }
    }
}
