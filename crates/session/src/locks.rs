//! Short-lived named locks with owner tags.
//!
//! Backed by Redis `SET NX EX`. The lock is a UX throttle for the
//! quantity → payment window, not a correctness primitive: the authoritative
//! consistency barrier is the conditional status update in the booking
//! engine. That is why [`LockRegistry::acquire`] degrades open when Redis is
//! unreachable.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ExistenceCheck, SetExpiry, SetOptions};
use tracing::warn;

#[derive(Clone)]
enum Backend {
    Redis(Option<ConnectionManager>),
    /// Refuses every acquire. Exercises the contended path in tests.
    Deny,
}

/// Registry of named locks with TTL and owner-checked release.
#[derive(Clone)]
pub struct LockRegistry {
    backend: Backend,
}

impl LockRegistry {
    /// Create a registry over an optional Redis connection.
    pub fn new(redis: Option<ConnectionManager>) -> Self {
        Self {
            backend: Backend::Redis(redis),
        }
    }

    /// A registry that denies every acquire.
    pub fn denying() -> Self {
        Self {
            backend: Backend::Deny,
        }
    }

    fn key(resource: &str) -> String {
        format!("lock:{resource}")
    }

    /// Try to take the lock: set-if-absent with expiry.
    ///
    /// Returns `true` when Redis is unavailable (degrade-open). Safe because
    /// the booking engine's conditional update is the real serialization
    /// point; a missing lock only costs the "high demand" UX throttle.
    pub async fn acquire(&self, resource: &str, ttl: Duration, owner: &str) -> bool {
        let conn = match &self.backend {
            Backend::Deny => return false,
            Backend::Redis(None) => return true,
            Backend::Redis(Some(conn)) => conn,
        };
        let mut conn = conn.clone();

        let options = SetOptions::default()
            .conditional_set(ExistenceCheck::NX)
            .with_expiration(SetExpiry::EX(ttl.as_secs()));

        match conn
            .set_options::<_, _, Option<String>>(Self::key(resource), owner, options)
            .await
        {
            Ok(reply) => reply.is_some(),
            Err(e) => {
                warn!(resource, error = %e, "Lock acquire failed, degrading open");
                true
            }
        }
    }

    /// Release the lock only if `owner` still holds it.
    ///
    /// Read-then-delete is enough here: the guarantee needed is "the releaser
    /// was the owner at some point", not mutual exclusion with a concurrent
    /// acquire.
    pub async fn release_owned(&self, resource: &str, owner: &str) -> bool {
        let conn = match &self.backend {
            Backend::Deny => return false,
            Backend::Redis(None) => return true,
            Backend::Redis(Some(conn)) => conn,
        };
        let mut conn = conn.clone();
        let key = Self::key(resource);

        let current: Option<String> = match conn.get(&key).await {
            Ok(v) => v,
            Err(e) => {
                warn!(resource, error = %e, "Lock owner read failed");
                return false;
            }
        };

        if current.as_deref() != Some(owner) {
            return false;
        }

        match conn.del::<_, ()>(&key).await {
            Ok(()) => true,
            Err(e) => {
                warn!(resource, error = %e, "Lock release failed");
                false
            }
        }
    }

    /// Unconditionally drop the lock.
    pub async fn force_release(&self, resource: &str) {
        let conn = match &self.backend {
            Backend::Deny | Backend::Redis(None) => return,
            Backend::Redis(Some(conn)) => conn,
        };
        let mut conn = conn.clone();
        if let Err(e) = conn.del::<_, ()>(Self::key(resource)).await {
            warn!(resource, error = %e, "Lock force-release failed");
        }
    }
}

/// Build the reservation lock resource for a tier/user pair.
///
/// The key embeds the user phone on purpose: two different users may race on
/// the same tier. This is a per-user throttle; the database is the barrier
/// that prevents overselling.
pub fn reservation_resource(tier_id: &uuid::Uuid, phone: &str) -> String {
    format!("tier:{tier_id}:user:{phone}")
}
