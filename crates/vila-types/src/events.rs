//! Request lifecycle events
//!
//! Events are broadcast to all subscribers (provider sessions, client
//! watchers, the expiration scheduler). Each event carries a snapshot of
//! the record as of the transition, so subscribers never have to re-read
//! the store on the hot path.

use crate::ServiceRequest;
use serde::{Deserialize, Serialize};

/// Events emitted by the request store on every lifecycle transition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RequestEvent {
    /// A new request entered `Pending`
    Created { request: ServiceRequest },

    /// A provider won the acceptance race
    Accepted { request: ServiceRequest },

    /// The offer window elapsed with no accept
    Expired { request: ServiceRequest },

    /// The requesting client withdrew the request
    Cancelled { request: ServiceRequest },
}

impl RequestEvent {
    /// The request snapshot carried by this event
    pub fn request(&self) -> &ServiceRequest {
        match self {
            Self::Created { request }
            | Self::Accepted { request }
            | Self::Expired { request }
            | Self::Cancelled { request } => request,
        }
    }

    /// Get a short description for logging
    pub fn summary(&self) -> String {
        match self {
            Self::Created { request } => {
                format!("Request created: {} ({}, {})", request.id, request.category, request.price)
            }
            Self::Accepted { request } => match &request.assigned_provider {
                Some(provider) => format!("Request {} accepted by {}", request.id, provider),
                None => format!("Request {} accepted", request.id),
            },
            Self::Expired { request } => format!("Request {} expired", request.id),
            Self::Cancelled { request } => format!("Request {} cancelled", request.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClientId, Price, RequestId, RequestStatus, ServiceCategory};
    use chrono::Utc;

    fn test_request() -> ServiceRequest {
        let now = Utc::now();
        ServiceRequest {
            id: RequestId::new(),
            category: ServiceCategory::MotoTaxi,
            client: ClientId::new(),
            origin: "Centro".to_string(),
            destination: "Juazeiro".to_string(),
            price: Price::reais(10, 0),
            status: RequestStatus::Pending,
            assigned_provider: None,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(60),
        }
    }

    #[test]
    fn test_event_serialization() {
        let event = RequestEvent::Created { request: test_request() };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("Created"));
        assert!(json.contains("Juazeiro"));

        let back: RequestEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.summary(), event.summary());
    }

    #[test]
    fn test_event_summary() {
        let request = test_request();
        let id = request.id.clone();
        let event = RequestEvent::Expired { request };
        assert!(event.summary().contains(&id.to_string()));
    }
}
