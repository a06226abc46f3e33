//! Per-user conversation session store.
//!
//! Sessions live in Redis under `session:<phone>` with a sliding TTL. When
//! Redis is unreachable the store falls back to an in-process map with the
//! same TTL semantics rather than raising. The fallback is last-resort
//! availability at the cost of affinity: it is process-local, so sessions do
//! not survive restarts and are invisible to sibling processes. Operators
//! should treat fallback-active periods as degraded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Conversation states of the booking dialog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConvState {
    #[default]
    Idle,
    SelectingCategory,
    BrowsingEvents,
    SelectingTier,
    SelectingQuantity,
    AwaitingPaymentMethod,
    AwaitingPaymentPhone,
    AwaitingStkPush,
}

/// The typed data bag carried across dialog steps.
///
/// Every field is optional; [`SessionData::merge`] applies a patch with
/// right-biased shallow-merge semantics, so a step only has to mention the
/// keys it sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_booking_id: Option<Uuid>,
}

impl SessionData {
    /// Right-biased shallow merge: defined keys of `patch` win.
    pub fn merge(mut self, patch: SessionData) -> SessionData {
        if patch.event_id.is_some() {
            self.event_id = patch.event_id;
        }
        if patch.selected_category.is_some() {
            self.selected_category = patch.selected_category;
        }
        if patch.tier_id.is_some() {
            self.tier_id = patch.tier_id;
        }
        if patch.quantity.is_some() {
            self.quantity = patch.quantity;
        }
        if patch.total_amount.is_some() {
            self.total_amount = patch.total_amount;
        }
        if patch.payment_method.is_some() {
            self.payment_method = patch.payment_method;
        }
        if patch.temp_booking_id.is_some() {
            self.temp_booking_id = patch.temp_booking_id;
        }
        self
    }
}

/// One user's conversation session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub state: ConvState,
    #[serde(default)]
    pub data: SessionData,
}

struct FallbackEntry {
    session: Session,
    expires_at: Instant,
}

/// Session store keyed by normalized phone number.
#[derive(Clone)]
pub struct SessionStore {
    redis: Option<ConnectionManager>,
    ttl: Duration,
    fallback: Arc<Mutex<HashMap<String, FallbackEntry>>>,
}

impl SessionStore {
    /// Create a store over an optional Redis connection.
    ///
    /// With `None` every operation runs against the in-process fallback map.
    pub fn new(redis: Option<ConnectionManager>, ttl: Duration) -> Self {
        if redis.is_none() {
            warn!("Session store running on in-process fallback only; sessions will not survive restarts");
        }
        Self {
            redis,
            ttl,
            fallback: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn key(phone: &str) -> String {
        format!("session:{phone}")
    }

    /// Fetch the session for a phone, defaulting to `IDLE/{}`.
    ///
    /// Never raises: a missing key, an unreachable backend and a corrupt
    /// payload all yield the default session.
    pub async fn get(&self, phone: &str) -> Session {
        if let Some(conn) = &self.redis {
            match self.redis_get(conn.clone(), phone).await {
                Ok(session) => return session,
                Err(e) => warn!(error = %e, "Redis get failed, using fallback session map"),
            }
        }
        self.fallback_get(phone)
    }

    /// Transition the session: set `state`, shallow-merge `patch` into the
    /// data bag, reset the TTL. Returns the stored session.
    pub async fn update(&self, phone: &str, state: ConvState, patch: SessionData) -> Session {
        if let Some(conn) = &self.redis {
            match self.redis_update(conn.clone(), phone, state, patch.clone()).await {
                Ok(session) => return session,
                Err(e) => warn!(error = %e, "Redis update failed, using fallback session map"),
            }
        }
        self.fallback_update(phone, state, patch)
    }

    /// Reset the session to `IDLE/{}`.
    ///
    /// Writes an idle session rather than deleting the key, so TTL-based
    /// cleanup ordering is preserved.
    pub async fn clear(&self, phone: &str) {
        if let Some(conn) = &self.redis {
            match self.redis_set(conn.clone(), phone, &Session::default()).await {
                Ok(()) => return,
                Err(e) => warn!(error = %e, "Redis clear failed, using fallback session map"),
            }
        }
        self.fallback_set(phone, Session::default());
    }

    async fn redis_get(
        &self,
        mut conn: ConnectionManager,
        phone: &str,
    ) -> Result<Session, redis::RedisError> {
        let raw: Option<String> = conn.get(Self::key(phone)).await?;
        Ok(raw
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default())
    }

    async fn redis_update(
        &self,
        conn: ConnectionManager,
        phone: &str,
        state: ConvState,
        patch: SessionData,
    ) -> Result<Session, redis::RedisError> {
        let current = self.redis_get(conn.clone(), phone).await?;
        let session = Session {
            state,
            data: current.data.merge(patch),
        };
        self.redis_set(conn, phone, &session).await?;
        Ok(session)
    }

    async fn redis_set(
        &self,
        mut conn: ConnectionManager,
        phone: &str,
        session: &Session,
    ) -> Result<(), redis::RedisError> {
        // Serialization of Session cannot fail; the type is plain data.
        let payload = serde_json::to_string(session).unwrap_or_default();
        conn.set_ex(Self::key(phone), payload, self.ttl.as_secs())
            .await
    }

    fn fallback_get(&self, phone: &str) -> Session {
        let mut map = self.fallback.lock().unwrap();
        Self::sweep(&mut map);
        map.get(phone)
            .map(|e| e.session.clone())
            .unwrap_or_default()
    }

    fn fallback_update(&self, phone: &str, state: ConvState, patch: SessionData) -> Session {
        let mut map = self.fallback.lock().unwrap();
        Self::sweep(&mut map);
        let data = map
            .get(phone)
            .map(|e| e.session.data.clone())
            .unwrap_or_default()
            .merge(patch);
        let session = Session { state, data };
        map.insert(
            phone.to_string(),
            FallbackEntry {
                session: session.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        session
    }

    fn fallback_set(&self, phone: &str, session: Session) {
        let mut map = self.fallback.lock().unwrap();
        Self::sweep(&mut map);
        map.insert(
            phone.to_string(),
            FallbackEntry {
                session,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop expired entries; called lazily on every fallback access.
    fn sweep(map: &mut HashMap<String, FallbackEntry>) {
        let now = Instant::now();
        map.retain(|_, entry| entry.expires_at > now);
    }
}
