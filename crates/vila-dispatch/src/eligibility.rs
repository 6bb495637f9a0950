//! Eligibility predicate
//!
//! A provider may see and accept a request iff its role serves the
//! request's category, it is online, and its combined balance is
//! positive. The predicate is enforced twice: once by each provider
//! session's subscription scoping, and again by the arbiter rejecting
//! accept attempts from ineligible providers.

use vila_types::{BalanceSnapshot, ProviderProfile, ServiceRequest};

/// Whether `provider` may see and accept `request`
pub fn is_eligible(
    request: &ServiceRequest,
    provider: &ProviderProfile,
    balance: &BalanceSnapshot,
) -> bool {
    provider.role.serves(request.category) && provider.online && balance.is_spendable()
}

/// Filter a directory snapshot down to the providers eligible for `request`
pub fn eligible_providers<'a>(
    request: &ServiceRequest,
    providers: impl IntoIterator<Item = (&'a ProviderProfile, BalanceSnapshot)>,
) -> Vec<&'a ProviderProfile> {
    providers
        .into_iter()
        .filter(|(profile, balance)| is_eligible(request, profile, balance))
        .map(|(profile, _)| profile)
        .collect()
}
