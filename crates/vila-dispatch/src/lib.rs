//! VILA Dispatch - The matching engine
//!
//! Takes a client's request for a ride/delivery, fans it out to eligible
//! online providers of the matching category, runs a bounded acceptance
//! window per provider view, and guarantees that a request is matched to
//! at most one provider even when providers race to accept concurrently.
//!
//! # Architecture
//!
//! ```text
//! client ──submit──▶ RequestStore ──events──▶ ProviderSession (one per provider)
//!                        ▲                        │ accept / decline
//!                        │ conditional CAS        ▼
//!                  AcceptanceArbiter ◀──────── boundary (DispatchService)
//!                        │
//!                  CreditLedger (charge hold / refund)
//! ```
//!
//! The only correctness-critical operation is the `Pending -> Accepted`
//! transition; see [`AcceptanceArbiter`] for the charge-then-CAS protocol.

pub mod arbiter;
pub mod directory;
pub mod eligibility;
pub mod expiry;
pub mod service;
pub mod session;

pub use arbiter::AcceptanceArbiter;
pub use directory::ProviderDirectory;
pub use eligibility::is_eligible;
pub use expiry::ExpirationScheduler;
pub use service::{DispatchConfig, DispatchService};
pub use session::{AlertSink, NullAlertSink, OfferUpdate, ProviderSession, WithdrawReason};
