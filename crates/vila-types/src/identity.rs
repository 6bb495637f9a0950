//! Identity types for VILA
//!
//! Strongly typed UUID wrappers so a request id can never be passed
//! where a provider id is expected. The Display form carries a short
//! prefix ("req_", "prov_", ...) that also survives parsing.

use crate::error::DispatchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Macro to generate ID types with common implementations
macro_rules! define_id_type {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// The Display prefix of this id family
            pub const fn prefix() -> &'static str {
                $prefix
            }

            /// Get the inner UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = DispatchError;

            /// Accepts the prefixed Display form or a bare UUID
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bare = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Uuid::parse_str(bare).map(Self).map_err(|_| {
                    DispatchError::validation("id", format!("not a valid {} id: {s:?}", $prefix))
                })
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }
    };
}

// Core identity types
define_id_type!(RequestId, "req", "Unique identifier for a service request");
define_id_type!(ProviderId, "prov", "Unique identifier for a service provider");
define_id_type!(ClientId, "client", "Unique identifier for a requesting client");

// Ledger identity types
define_id_type!(EntryId, "entry", "Unique identifier for a balance ledger entry");
