//! Conversation session state, distributed locks and phone normalization.
//!
//! This crate holds the pieces of Tikiti that key everything off a user's
//! phone number: the canonical phone form itself, the per-user conversation
//! session (Redis-backed with an in-process fallback), and the short-lived
//! reservation locks taken during the quantity → payment window.
//!
//! # Example
//!
//! ```no_run
//! use session::{connect_redis, ConvState, SessionStore};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let redis = connect_redis("redis://127.0.0.1:6379").await;
//! let store = SessionStore::new(redis, Duration::from_secs(600));
//!
//! let phone = session::phone::normalize("0712 345 678").unwrap();
//! let session = store.get(&phone).await;
//! assert_eq!(session.state, ConvState::Idle);
//! # }
//! ```

pub mod locks;
pub mod phone;
pub mod store;

pub use locks::LockRegistry;
pub use phone::{mask, normalize, PhoneError};
pub use store::{ConvState, Session, SessionData, SessionStore};

use redis::aio::ConnectionManager;
use tracing::warn;

/// Connect to Redis, returning `None` (degraded mode) when unreachable.
///
/// Both [`SessionStore`] and [`LockRegistry`] accept the result: with `None`
/// the store runs on its in-process fallback map and the registry degrades
/// open. The process keeps serving either way.
pub async fn connect_redis(url: &str) -> Option<ConnectionManager> {
    let client = match redis::Client::open(url) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Invalid Redis URL, running without Redis");
            return None;
        }
    };

    match ConnectionManager::new(client).await {
        Ok(conn) => Some(conn),
        Err(e) => {
            warn!(error = %e, "Redis unreachable, running without Redis");
            None
        }
    }
}
