//! Deterministic provider selection.
//!
//! Priority, first available wins:
//! 1. the caller's preferred provider
//! 2. the configured default
//! 3. the configured fallback
//! 4. any other available provider, in ascending id order

use std::collections::{BTreeMap, BTreeSet};

use common::ProviderId;

/// Inputs of one selection.
#[derive(Debug, Clone, Default)]
pub struct SelectionPolicy<'a> {
    pub preferred: Option<&'a ProviderId>,
    pub default: Option<&'a ProviderId>,
    pub fallback: Option<&'a ProviderId>,
    /// Providers that must not be chosen (e.g. one that just failed).
    pub excluded: BTreeSet<ProviderId>,
}

/// Pick a provider from an availability map.
///
/// Ids missing from `availability` count as unavailable.
pub fn select_provider(
    availability: &BTreeMap<ProviderId, bool>,
    policy: &SelectionPolicy<'_>,
) -> Option<ProviderId> {
    let usable = |id: &ProviderId| {
        !policy.excluded.contains(id) && availability.get(id).copied().unwrap_or(false)
    };

    [policy.preferred, policy.default, policy.fallback]
        .into_iter()
        .flatten()
        .find(|id| usable(id))
        .cloned()
        .or_else(|| {
            availability
                .keys()
                .find(|id| usable(id))
                .cloned()
        })
}
