//! Mobile STK push adapter.
//!
//! One operation: push a payment prompt to the user's handset. The booking id
//! travels as `api_ref` and comes back on the provider's webhook as the
//! correlation key.

use std::env;
use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PaymentError, PaymentProvider, BUSINESS_NOT_ELIGIBLE};

const SANDBOX_BASE: &str = "https://sandbox.intasend.com";
const LIVE_BASE: &str = "https://payment.intasend.com";

/// STK adapter configuration.
#[derive(Debug, Clone)]
pub struct StkConfig {
    pub publishable_key: String,
    pub secret_key: String,
    /// Sandbox when true.
    pub is_test: bool,
    /// Override for the provider base URL (tests).
    pub base_url: Option<String>,
}

impl StkConfig {
    /// Load from `STK_PUBLISHABLE_KEY`, `STK_SECRET_KEY`, `STK_IS_TEST`.
    pub fn from_env() -> Result<Self, PaymentError> {
        let publishable_key = env::var("STK_PUBLISHABLE_KEY")
            .map_err(|_| PaymentError::Config("STK_PUBLISHABLE_KEY is required".to_string()))?;
        let secret_key = env::var("STK_SECRET_KEY")
            .map_err(|_| PaymentError::Config("STK_SECRET_KEY is required".to_string()))?;
        let is_test = env::var("STK_IS_TEST")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        Ok(Self {
            publishable_key,
            secret_key,
            is_test,
            base_url: None,
        })
    }

    fn base(&self) -> String {
        if let Some(base) = &self.base_url {
            return base.clone();
        }
        if self.is_test {
            SANDBOX_BASE.to_string()
        } else {
            LIVE_BASE.to_string()
        }
    }
}

#[derive(Debug, Serialize)]
struct StkPushRequest<'a> {
    amount: String,
    phone_number: &'a str,
    api_ref: &'a str,
}

#[derive(Debug, Deserialize)]
struct StkPushResponse {
    invoice: InvoiceBody,
}

#[derive(Debug, Deserialize)]
struct InvoiceBody {
    invoice_id: String,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Deserialize)]
struct StkErrorResponse {
    #[serde(default)]
    errors: Vec<StkErrorItem>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StkErrorItem {
    #[serde(default)]
    code: String,
    #[serde(default)]
    detail: String,
}

/// Result of initiating an STK push.
#[derive(Debug, Clone)]
pub struct StkPush {
    /// Provider invoice identifier, echoed on the webhook as `invoice_id`.
    pub invoice_id: String,
    /// Provider-side state at initiation time (usually "PENDING").
    pub state: String,
}

/// Client for the STK push provider.
#[derive(Clone)]
pub struct StkClient {
    http: Client,
    config: StkConfig,
}

impl StkClient {
    /// Create a client. Fails when credentials are missing.
    pub fn new(config: StkConfig) -> Result<Self, PaymentError> {
        if config.publishable_key.is_empty() || config.secret_key.is_empty() {
            return Err(PaymentError::Config(
                "STK publishable and secret keys are required".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PaymentError::Unavailable {
                provider: PaymentProvider::Stk,
                source: e,
            })?;

        Ok(Self { http, config })
    }

    /// Create a client from environment variables.
    pub fn from_env() -> Result<Self, PaymentError> {
        Self::new(StkConfig::from_env()?)
    }

    /// Push a payment prompt to `phone` for `amount`.
    ///
    /// `api_ref` is the booking id; the provider echoes it on its webhook.
    pub async fn initiate(
        &self,
        phone: &str,
        amount: &Decimal,
        api_ref: &str,
    ) -> Result<StkPush, PaymentError> {
        if !valid_msisdn(phone) {
            return Err(PaymentError::InvalidPhone(phone.to_string()));
        }

        let url = format!("{}/api/v1/payment/mpesa-stk-push/", self.config.base());
        let request = StkPushRequest {
            amount: amount.to_string(),
            phone_number: phone,
            api_ref,
        };

        debug!(api_ref, "Initiating STK push");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PaymentError::Unavailable {
                provider: PaymentProvider::Stk,
                source: e,
            })?;

        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        let body: StkPushResponse =
            response
                .json()
                .await
                .map_err(|e| PaymentError::Malformed {
                    provider: PaymentProvider::Stk,
                    message: e.to_string(),
                })?;

        info!(api_ref, invoice_id = %body.invoice.invoice_id, "STK push accepted");
        Ok(StkPush {
            invoice_id: body.invoice.invoice_id,
            state: body.invoice.state,
        })
    }

    async fn provider_error(response: reqwest::Response) -> PaymentError {
        let status = response.status();
        let parsed = response.json::<StkErrorResponse>().await.ok();

        let (code, message) = parsed
            .map(|e| {
                if let Some(item) = e.errors.into_iter().next() {
                    (item.code, item.detail)
                } else {
                    (status.as_u16().to_string(), e.detail.unwrap_or_default())
                }
            })
            .unwrap_or_else(|| (status.as_u16().to_string(), format!("HTTP {status}")));

        // Surface the distinguished "business not eligible" rejection under
        // its stable code whatever casing the provider used.
        let code = if code.eq_ignore_ascii_case(BUSINESS_NOT_ELIGIBLE)
            || message.to_ascii_lowercase().contains("not eligible")
        {
            BUSINESS_NOT_ELIGIBLE.to_string()
        } else {
            code
        };

        PaymentError::Provider {
            provider: PaymentProvider::Stk,
            code,
            message,
        }
    }
}

/// Basic MSISDN shape check: `254` plus nine digits.
fn valid_msisdn(phone: &str) -> bool {
    phone.len() == 12 && phone.starts_with("254") && phone.chars().all(|c| c.is_ascii_digit())
}
