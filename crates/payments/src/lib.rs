//! Payment provider adapters.
//!
//! Two providers with divergent flows share one outward contract:
//!
//! - **STK push** ([`StkClient`]): the provider pushes a payment prompt to
//!   the user's handset in-chat; confirmation arrives later on the provider's
//!   webhook, correlated by the booking id (`api_ref`).
//! - **Hosted redirect** ([`HostedClient`]): the user follows a minted URL to
//!   the provider's hosted page; confirmation arrives on the provider's IPN
//!   webhook, resolved via a transaction-status query.
//!
//! Both fail with [`PaymentError`]; callers branch on the provider only for
//! message construction.

pub mod error;
pub mod hosted;
pub mod stk;

pub use error::{PaymentError, PaymentProvider};
pub use hosted::{HostedClient, HostedConfig, OrderRequest, PaymentLink, TransactionStatus};
pub use stk::{StkClient, StkConfig, StkPush};
