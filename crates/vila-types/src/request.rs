//! Service request records and their lifecycle
//!
//! The request store exclusively owns `ServiceRequest` records; everyone
//! else holds ids and transient views. All edges out of `Pending` are
//! conditional writes, so only one of them can ever win.

use crate::{ClientId, Price, ProviderId, RequestId, ServiceCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a service request
///
/// ```text
///         create                 accept(p)
///  [none] ------> Pending  --------------------> Accepted (terminal)
///                   | \
///        cancel()   |  \ expire()
///                   v    v
///              Cancelled  Expired   (both terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Waiting for a provider to accept
    Pending,
    /// Assigned to exactly one provider
    Accepted,
    /// Offer window elapsed with no accept
    Expired,
    /// Withdrawn by the requesting client
    Cancelled,
}

impl RequestStatus {
    /// Terminal statuses admit no further transition
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Input for creating a request (everything the client fills in)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRequest {
    /// Requested service category
    pub category: ServiceCategory,
    /// Requesting client (lookup key, not ownership)
    pub client: ClientId,
    /// Free-text pickup descriptor
    pub origin: String,
    /// Free-text destination descriptor
    pub destination: String,
    /// Fixed fare or negotiable
    pub price: Price,
}

/// A client's ask for a category of service
///
/// Invariant: at most one provider is ever attached as
/// `assigned_provider`; once set it never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    /// Unique id, assigned at creation, immutable
    pub id: RequestId,
    /// Requested service category
    pub category: ServiceCategory,
    /// Requesting client
    pub client: ClientId,
    /// Free-text pickup descriptor
    pub origin: String,
    /// Free-text destination descriptor
    pub destination: String,
    /// Fixed fare or negotiable
    pub price: Price,
    /// Current lifecycle status
    pub status: RequestStatus,
    /// Set only on transition to `Accepted`
    pub assigned_provider: Option<ProviderId>,
    /// When the request was created
    pub created_at: DateTime<Utc>,
    /// Authoritative deadline; anyone may trigger expiry once passed
    pub expires_at: DateTime<Utc>,
}

impl ServiceRequest {
    /// Whether the offer window has elapsed at `now`
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Outcome of an accept attempt
///
/// `Conflict` and `InsufficientBalance` are expected, frequent, and
/// recoverable; they are outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AcceptOutcome {
    /// This provider won the race; the request is assigned to it
    Granted { request: ServiceRequest },
    /// Another actor resolved the request first
    Conflict,
    /// The provider has no credits or trust credits left
    InsufficientBalance,
}

impl AcceptOutcome {
    /// Whether the accept was granted
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Accepted.is_terminal());
        assert!(RequestStatus::Expired.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_overdue() {
        let now = Utc::now();
        let request = ServiceRequest {
            id: RequestId::new(),
            category: ServiceCategory::MotoTaxi,
            client: ClientId::new(),
            origin: "Centro".to_string(),
            destination: "Deslocamento Urbano".to_string(),
            price: Price::reais(8, 0),
            status: RequestStatus::Pending,
            assigned_provider: None,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(60),
        };
        assert!(!request.is_overdue(now));
        assert!(request.is_overdue(now + chrono::Duration::seconds(61)));
    }
}
