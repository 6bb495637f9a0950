//! Price representation
//!
//! Fares are either fixed (stored in centavos) or the "A combinar"
//! sentinel when client and provider negotiate after pickup. Display and
//! parsing keep the local comma decimal format ("8,00").

use crate::error::{DispatchError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel string for a negotiable fare
pub const NEGOTIABLE_LABEL: &str = "A combinar";

/// Fare attached to a service request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Price {
    /// Fixed fare in centavos
    Fixed(u32),
    /// To be negotiated between client and provider
    Negotiable,
}

impl Price {
    /// Fixed fare from whole reais and centavos
    ///
    /// Saturates at the u32 centavos ceiling instead of wrapping.
    pub fn reais(reais: u32, centavos: u32) -> Self {
        Self::Fixed(reais.saturating_mul(100).saturating_add(centavos))
    }

    /// Parse the local display format: "8,00", "100,00" or "A combinar"
    pub fn parse_brl(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(NEGOTIABLE_LABEL) {
            return Ok(Self::Negotiable);
        }
        let (whole, cents) = match s.split_once(',') {
            Some((w, c)) => (w, c),
            None => (s, "00"),
        };
        if whole.is_empty() || cents.len() != 2 {
            return Err(DispatchError::validation("price", format!("malformed amount: {s:?}")));
        }
        let whole: u32 = whole
            .parse()
            .map_err(|_| DispatchError::validation("price", format!("malformed amount: {s:?}")))?;
        let cents: u32 = cents
            .parse()
            .map_err(|_| DispatchError::validation("price", format!("malformed amount: {s:?}")))?;
        let centavos = whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(cents))
            .ok_or_else(|| DispatchError::validation("price", format!("amount too large: {s:?}")))?;
        Ok(Self::Fixed(centavos))
    }

    /// Whether the fare is fixed
    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed(_))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(centavos) => write!(f, "{},{:02}", centavos / 100, centavos % 100),
            Self::Negotiable => write!(f, "{}", NEGOTIABLE_LABEL),
        }
    }
}
