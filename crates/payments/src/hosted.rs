//! Hosted redirect adapter.
//!
//! Minting a payment link is a three-step protocol: obtain an access token
//! (cached, refreshed 30 s before expiry), obtain a notification endpoint id
//! (registered lazily on first use, then memoized), submit the order and
//! receive the redirect URL. Both caches are per-process and best-effort; a
//! new process simply re-earns them, and a concurrent first use at worst
//! wastes one refresh.

use std::env;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{PaymentError, PaymentProvider};

const DEFAULT_BASE: &str = "https://pay.pesapal.com/v3";

/// How long before expiry a cached token is refreshed.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 30;

/// Hosted adapter configuration.
#[derive(Debug, Clone)]
pub struct HostedConfig {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    /// Where the provider redirects the payer's browser afterwards.
    pub callback_url: String,
    /// Where the provider posts payment notifications (defaults to the
    /// callback URL when unset).
    pub ipn_url: String,
}

impl HostedConfig {
    /// Load from `HOSTED_BASE_URL`, `HOSTED_CONSUMER_KEY`,
    /// `HOSTED_CONSUMER_SECRET`, `HOSTED_CALLBACK_URL`, `HOSTED_IPN_URL`.
    pub fn from_env() -> Result<Self, PaymentError> {
        let base_url =
            env::var("HOSTED_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE.to_string());
        let consumer_key = env::var("HOSTED_CONSUMER_KEY")
            .map_err(|_| PaymentError::Config("HOSTED_CONSUMER_KEY is required".to_string()))?;
        let consumer_secret = env::var("HOSTED_CONSUMER_SECRET")
            .map_err(|_| PaymentError::Config("HOSTED_CONSUMER_SECRET is required".to_string()))?;
        let callback_url = env::var("HOSTED_CALLBACK_URL")
            .map_err(|_| PaymentError::Config("HOSTED_CALLBACK_URL is required".to_string()))?;
        let ipn_url = env::var("HOSTED_IPN_URL").unwrap_or_else(|_| callback_url.clone());

        Ok(Self {
            base_url,
            consumer_key,
            consumer_secret,
            callback_url,
            ipn_url,
        })
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) > now
    }
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    consumer_key: &'a str,
    consumer_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default, rename = "expiryDate")]
    expiry_date: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct RegisterIpnRequest<'a> {
    url: &'a str,
    ipn_notification_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct RegisterIpnResponse {
    ipn_id: String,
}

#[derive(Debug, Serialize)]
struct SubmitOrderRequest<'a> {
    id: &'a str,
    currency: &'static str,
    amount: f64,
    description: &'a str,
    callback_url: &'a str,
    notification_id: &'a str,
    billing_address: BillingAddress<'a>,
}

#[derive(Debug, Serialize)]
struct BillingAddress<'a> {
    phone_number: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitOrderResponse {
    #[serde(default)]
    order_tracking_id: Option<String>,
    #[serde(default)]
    redirect_url: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// An order to mint a hosted payment link for.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Merchant reference; the booking id.
    pub id: String,
    pub amount: Decimal,
    pub description: String,
    /// Payer phone for the billing address.
    pub phone_number: String,
}

/// A minted hosted payment link.
#[derive(Debug, Clone)]
pub struct PaymentLink {
    pub redirect_url: String,
    pub order_tracking_id: String,
}

/// Transaction status as reported by the provider.
///
/// Field names vary across provider versions; the accessors below try each
/// known spelling in order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionStatus {
    #[serde(default)]
    pub payment_status_description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub order_merchant_reference: Option<String>,
    #[serde(default)]
    pub merchant_reference: Option<String>,
    #[serde(default)]
    pub confirmation_code: Option<String>,
    #[serde(default)]
    pub order_tracking_id: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

impl TransactionStatus {
    /// Whether the payment completed.
    pub fn is_completed(&self) -> bool {
        self.payment_status_description
            .as_deref()
            .or(self.status.as_deref())
            .map(|s| s.eq_ignore_ascii_case("completed"))
            .unwrap_or(false)
    }

    /// The merchant reference: the booking id.
    pub fn booking_reference(&self) -> Option<&str> {
        self.order_merchant_reference
            .as_deref()
            .or(self.merchant_reference.as_deref())
            .or(self.confirmation_code.as_deref())
    }

    /// The provider-side payment reference.
    pub fn payment_reference(&self) -> Option<&str> {
        self.confirmation_code
            .as_deref()
            .or(self.order_tracking_id.as_deref())
    }

    /// The payer's phone, when reported.
    pub fn payer_phone(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }
}

/// Client for the hosted redirect provider.
pub struct HostedClient {
    http: Client,
    config: HostedConfig,
    token: RwLock<Option<CachedToken>>,
    ipn_id: RwLock<Option<String>>,
}

impl HostedClient {
    /// Create a client. Fails when credentials are missing.
    pub fn new(config: HostedConfig) -> Result<Self, PaymentError> {
        if config.consumer_key.is_empty() || config.consumer_secret.is_empty() {
            return Err(PaymentError::Config(
                "hosted consumer key and secret are required".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PaymentError::Unavailable {
                provider: PaymentProvider::Hosted,
                source: e,
            })?;

        Ok(Self {
            http,
            config,
            token: RwLock::new(None),
            ipn_id: RwLock::new(None),
        })
    }

    /// Create a client from environment variables.
    pub fn from_env() -> Result<Self, PaymentError> {
        Self::new(HostedConfig::from_env()?)
    }

    /// Mint a hosted payment URL for an order.
    pub async fn payment_link(&self, order: &OrderRequest) -> Result<PaymentLink, PaymentError> {
        let notification_id = self.notification_id().await?;
        let url = format!("{}/api/Transactions/SubmitOrderRequest", self.config.base_url);

        let amount = order.amount.to_f64().ok_or_else(|| PaymentError::Malformed {
            provider: PaymentProvider::Hosted,
            message: format!("amount not representable: {}", order.amount),
        })?;
        let request = SubmitOrderRequest {
            id: &order.id,
            currency: "KES",
            amount,
            description: &order.description,
            callback_url: &self.config.callback_url,
            notification_id: &notification_id,
            billing_address: BillingAddress {
                phone_number: &order.phone_number,
            },
        };

        let response = self.post_with_auth(&url, &request).await?;
        let body: SubmitOrderResponse = Self::decode(response).await?;

        if let Some(error) = body.error {
            if !error.is_null() {
                return Err(Self::provider_error(error));
            }
        }

        match (body.redirect_url, body.order_tracking_id) {
            (Some(redirect_url), Some(order_tracking_id)) => {
                info!(order_id = %order.id, tracking_id = %order_tracking_id, "Minted hosted payment link");
                Ok(PaymentLink {
                    redirect_url,
                    order_tracking_id,
                })
            }
            _ => Err(PaymentError::Malformed {
                provider: PaymentProvider::Hosted,
                message: "order response missing redirect_url or order_tracking_id".to_string(),
            }),
        }
    }

    /// Query the status of a transaction by its tracking id.
    pub async fn transaction_status(
        &self,
        order_tracking_id: &str,
    ) -> Result<TransactionStatus, PaymentError> {
        let url = format!(
            "{}/api/Transactions/GetTransactionStatus?orderTrackingId={}",
            self.config.base_url, order_tracking_id
        );

        let response = self.get_with_auth(&url).await?;
        Self::decode(response).await
    }

    /// A valid access token, fetched or refreshed as needed.
    async fn access_token(&self) -> Result<String, PaymentError> {
        let now = Utc::now();
        if let Some(cached) = self.token.read().await.as_ref() {
            if cached.is_fresh(now) {
                return Ok(cached.token.clone());
            }
        }

        let mut slot = self.token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = slot.as_ref() {
            if cached.is_fresh(now) {
                return Ok(cached.token.clone());
            }
        }

        let url = format!("{}/api/Auth/RequestToken", self.config.base_url);
        let request = TokenRequest {
            consumer_key: &self.config.consumer_key,
            consumer_secret: &self.config.consumer_secret,
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PaymentError::Unavailable {
                provider: PaymentProvider::Hosted,
                source: e,
            })?;
        let body: TokenResponse = Self::decode(response).await?;

        let token = match body.token {
            Some(token) if !token.is_empty() => token,
            _ => {
                return Err(Self::provider_error(
                    body.error.unwrap_or(serde_json::Value::Null),
                ))
            }
        };

        let expires_at = body
            .expiry_date
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| {
                warn!("Token response carried no parsable expiry; assuming 5 minutes");
                Utc::now() + chrono::Duration::minutes(5)
            });

        debug!(%expires_at, "Fetched hosted provider access token");
        *slot = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });
        Ok(token)
    }

    async fn invalidate_token(&self) {
        *self.token.write().await = None;
    }

    /// The registered notification endpoint id, registering it on first use.
    async fn notification_id(&self) -> Result<String, PaymentError> {
        if let Some(id) = self.ipn_id.read().await.as_ref() {
            return Ok(id.clone());
        }

        let mut slot = self.ipn_id.write().await;
        if let Some(id) = slot.as_ref() {
            return Ok(id.clone());
        }

        let url = format!("{}/api/URLSetup/RegisterIPN", self.config.base_url);
        let request = RegisterIpnRequest {
            url: &self.config.ipn_url,
            ipn_notification_type: "POST",
        };

        let response = self.post_with_auth(&url, &request).await?;
        let body: RegisterIpnResponse = Self::decode(response).await?;

        info!(ipn_id = %body.ipn_id, "Registered notification endpoint");
        *slot = Some(body.ipn_id.clone());
        Ok(body.ipn_id)
    }

    /// POST with bearer auth, transparently re-authenticating once on 401.
    async fn post_with_auth<T: Serialize>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<reqwest::Response, PaymentError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&token)
            .json(body)
            .send()
            .await
            .map_err(|e| PaymentError::Unavailable {
                provider: PaymentProvider::Hosted,
                source: e,
            })?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        self.invalidate_token().await;
        let token = self.access_token().await?;
        self.http
            .post(url)
            .bearer_auth(&token)
            .json(body)
            .send()
            .await
            .map_err(|e| PaymentError::Unavailable {
                provider: PaymentProvider::Hosted,
                source: e,
            })
    }

    /// GET with bearer auth, transparently re-authenticating once on 401.
    async fn get_with_auth(&self, url: &str) -> Result<reqwest::Response, PaymentError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| PaymentError::Unavailable {
                provider: PaymentProvider::Hosted,
                source: e,
            })?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        self.invalidate_token().await;
        let token = self.access_token().await?;
        self.http
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| PaymentError::Unavailable {
                provider: PaymentProvider::Hosted,
                source: e,
            })
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PaymentError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PaymentError::Provider {
                provider: PaymentProvider::Hosted,
                code: status.as_u16().to_string(),
                message,
            });
        }
        response.json().await.map_err(|e| PaymentError::Malformed {
            provider: PaymentProvider::Hosted,
            message: e.to_string(),
        })
    }

    fn provider_error(error: serde_json::Value) -> PaymentError {
        let code = error
            .get("code")
            .and_then(|c| c.as_str())
            .unwrap_or("unknown")
            .to_string();
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("provider rejected the request")
            .to_string();
        PaymentError::Provider {
            provider: PaymentProvider::Hosted,
            code,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_token_freshness_margin() {
        let now = Utc::now();
        let fresh = CachedToken {
            token: "t".to_string(),
            expires_at: now + chrono::Duration::seconds(120),
        };
        assert!(fresh.is_fresh(now));

        // Inside the 30 s refresh margin counts as stale.
        let nearly_expired = CachedToken {
            token: "t".to_string(),
            expires_at: now + chrono::Duration::seconds(20),
        };
        assert!(!nearly_expired.is_fresh(now));
    }

    #[test]
    fn test_transaction_status_completed_variants() {
        let a: TransactionStatus = serde_json::from_str(
            r#"{"payment_status_description":"Completed","confirmation_code":"C-1"}"#,
        )
        .unwrap();
        assert!(a.is_completed());

        let b: TransactionStatus = serde_json::from_str(r#"{"status":"COMPLETED"}"#).unwrap();
        assert!(b.is_completed());

        let c: TransactionStatus =
            serde_json::from_str(r#"{"payment_status_description":"Failed"}"#).unwrap();
        assert!(!c.is_completed());

        let empty: TransactionStatus = serde_json::from_str("{}").unwrap();
        assert!(!empty.is_completed());
    }

    #[test]
    fn test_transaction_status_reference_fallbacks() {
        let status: TransactionStatus = serde_json::from_str(
            r#"{"merchant_reference":"booking-9","order_tracking_id":"OT-1"}"#,
        )
        .unwrap();
        assert_eq!(status.booking_reference(), Some("booking-9"));
        assert_eq!(status.payment_reference(), Some("OT-1"));

        let preferred: TransactionStatus = serde_json::from_str(
            r#"{"order_merchant_reference":"booking-1","merchant_reference":"booking-2",
                "confirmation_code":"C-1","order_tracking_id":"OT-1"}"#,
        )
        .unwrap();
        assert_eq!(preferred.booking_reference(), Some("booking-1"));
        assert_eq!(preferred.payment_reference(), Some("C-1"));
    }

    #[test]
    fn test_order_payload_shape() {
        let req = SubmitOrderRequest {
            id: "booking-1",
            currency: "KES",
            amount: 1500.0,
            description: "2 x Regular",
            callback_url: "https://example.com/return",
            notification_id: "ipn-1",
            billing_address: BillingAddress {
                phone_number: "254712345678",
            },
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["currency"], "KES");
        assert_eq!(v["amount"], 1500.0);
        assert_eq!(v["billing_address"]["phone_number"], "254712345678");
    }

    #[test]
    fn test_new_requires_credentials() {
        let config = HostedConfig {
            base_url: DEFAULT_BASE.to_string(),
            consumer_key: String::new(),
            consumer_secret: "s".to_string(),
            callback_url: "https://example.com/return".to_string(),
            ipn_url: "https://example.com/ipn".to_string(),
        };
        assert!(matches!(
            HostedClient::new(config),
            Err(PaymentError::Config(_))
        ));
    }
}
