//! VILA Types - Canonical domain types for the service dispatch engine
//!
//! This crate contains all foundational types for VILA with zero dependencies
//! on other vila crates. It defines the complete type system for:
//!
//! - Identity types (RequestId, ProviderId, ClientId, EntryId)
//! - Service categories and the closed provider-role mapping
//! - Prices in the local BRL comma format (fixed or negotiable)
//! - Service request records and their lifecycle statuses
//! - Provider profiles and credit/trust balance snapshots
//! - Request lifecycle events broadcast to subscribers
//!
//! # Architectural Invariants
//!
//! These types support the core dispatch invariants:
//!
//! 1. A request is assigned to at most one provider, ever
//! 2. Terminal statuses (`Accepted`, `Expired`, `Cancelled`) are final
//! 3. A provider with zero combined balance is never online
//! 4. Category matching is a closed enumeration, never string matching

pub mod category;
pub mod error;
pub mod events;
pub mod identity;
pub mod price;
pub mod provider;
pub mod request;

pub use category::*;
pub use error::*;
pub use events::*;
pub use identity::*;
pub use price::*;
pub use provider::*;
pub use request::*;

/// Version of the VILA types schema
pub const TYPES_VERSION: &str = "0.1.0";
