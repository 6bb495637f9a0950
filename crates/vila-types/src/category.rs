//! Service categories and the provider-role mapping
//!
//! The mapping between what a provider registered as and which requests it
//! may see is a closed enumeration. The original product matched category
//! strings by substring, which silently broke when a category was renamed;
//! here both sides are enums and the mapping is a total `match`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of service a client can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceCategory {
    /// Moto-taxi ride (two wheels, fixed urban fare)
    MotoTaxi,
    /// Private car ride
    CarRide,
    /// Residential gas-cylinder delivery
    GasDelivery,
}

impl ServiceCategory {
    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MotoTaxi => "Mototaxi",
            Self::CarRide => "Motorista Particular",
            Self::GasDelivery => "Entrega de Gás",
        }
    }

    /// All categories, for iteration in filters and demos
    pub fn all() -> [ServiceCategory; 3] {
        [Self::MotoTaxi, Self::CarRide, Self::GasDelivery]
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// What a provider registered as (one role per provider)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderRole {
    /// Moto-taxi rider
    Mototaxista,
    /// Private driver
    Motorista,
    /// Gas-cylinder distributor
    DistribuidorGas,
}

impl ProviderRole {
    /// The single category this role serves
    pub fn category(&self) -> ServiceCategory {
        match self {
            Self::Mototaxista => ServiceCategory::MotoTaxi,
            Self::Motorista => ServiceCategory::CarRide,
            Self::DistribuidorGas => ServiceCategory::GasDelivery,
        }
    }

    /// Whether this role may see and accept requests of `category`
    pub fn serves(&self, category: ServiceCategory) -> bool {
        self.category() == category
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Mototaxista => "Mototaxista",
            Self::Motorista => "Motorista Particular",
            Self::DistribuidorGas => "Distribuidor de Gás",
        }
    }
}

impl fmt::Display for ProviderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
