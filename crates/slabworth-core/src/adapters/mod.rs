//! Concrete provider adapters.
//!
//! Each adapter wraps one external service behind the [`Provider`] trait.
//! With a real transport they call and parse the upstream API; with the
//! default mock transport they synthesize deterministic data seeded from the
//! query text, so aggregation logic stays testable offline. The dispatch is
//! the transport's `is_mock()` flag and is invisible to the aggregators.
//!
//! | Adapter | id | sales | population | card search | validation |
//! |---------|----|-------|------------|-------------|------------|
//! | [`EbayAdapter`] | `ebay` | ✓ | – | ✓ | – |
//! | [`PsaAdapter`] | `psa` | – | ✓ (authoritative) | – | ✓ |
//! | [`SportsCardsProAdapter`] | `sportscardspro` | ✓ | ✓ | – | – |
//! | [`CardLadderAdapter`] | `cardladder` | ✓ | – | ✓ | ✓ |
//! | [`LocalStoreAdapter`] | `local_store` | – | – | ✓ | – |
//!
//! [`Provider`]: crate::provider::Provider

mod cardladder;
mod ebay;
mod local_store;
mod psa;
mod sportscardspro;

pub use cardladder::CardLadderAdapter;
pub use ebay::EbayAdapter;
pub use local_store::LocalStoreAdapter;
pub use psa::PsaAdapter;
pub use sportscardspro::SportsCardsProAdapter;

use crate::CardCandidate;

/// Keep the catalog entries whose rendered text contains every query token.
pub(crate) fn filter_catalog(
    catalog: Vec<CardCandidate>,
    query: &str,
    limit: usize,
) -> Vec<CardCandidate> {
    let tokens: Vec<String> = query
        .split_whitespace()
        .map(|token| token.to_ascii_lowercase())
        .collect();

    catalog
        .into_iter()
        .filter(|candidate| {
            let haystack = candidate_haystack(candidate);
            tokens.iter().all(|token| haystack.contains(token.as_str()))
        })
        .take(limit)
        .collect()
}

pub(crate) fn candidate_haystack(candidate: &CardCandidate) -> String {
    let mut text = String::new();
    if let Some(year) = candidate.year {
        text.push_str(&year.to_string());
        text.push(' ');
    }
    for part in [
        candidate.set_name.as_deref(),
        Some(candidate.player.as_str()),
        candidate.manufacturer.as_deref(),
        candidate.variant.as_deref(),
    ]
    .into_iter()
    .flatten()
    {
        text.push_str(part);
        text.push(' ');
    }
    if let Some(card_number) = &candidate.card_number {
        text.push('#');
        text.push_str(card_number);
    }
    text.to_ascii_lowercase()
}
