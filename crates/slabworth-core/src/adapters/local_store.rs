use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use super::{candidate_haystack, filter_catalog};
use crate::provider::{
    CandidateBatch, Capability, CapabilitySet, CardSearchRequest, PopulationRequest, Provider,
    ProviderError, SalesBatch, SalesRequest, ValidationRequest,
};
use crate::{
    CardCandidate, PopulationReport, ProviderFuture, ProviderId, ResolvedCard, ValidationVerdict,
};

/// Offline card index: every identity the resolver accepts is remembered
/// here, so repeat lookups keep working when every remote provider is down.
///
/// Keyed by the candidate composite key; remembering the same card twice
/// overwrites in place.
#[derive(Debug, Default)]
pub struct LocalStoreAdapter {
    index: RwLock<HashMap<String, CardCandidate>>,
}

impl LocalStoreAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index an accepted identity for future fallback lookups.
    pub fn remember(&self, card: &ResolvedCard) {
        let candidate = card.to_candidate();
        let key = candidate.composite_key();
        debug!(%key, "remembering resolved card in offline store");
        self.index
            .write()
            .expect("local store lock is not poisoned")
            .insert(key, candidate);
    }

    pub fn len(&self) -> usize {
        self.index
            .read()
            .expect("local store lock is not poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Provider for LocalStoreAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::LocalStore
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new(false, false, true, false)
    }

    fn search_sales<'a>(&'a self, req: SalesRequest) -> ProviderFuture<'a, SalesBatch> {
        Box::pin(async move {
            let _ = req;
            Err(ProviderError::unsupported_capability(Capability::Sales))
        })
    }

    fn population<'a>(&'a self, req: PopulationRequest) -> ProviderFuture<'a, PopulationReport> {
        Box::pin(async move {
            let _ = req;
            Err(ProviderError::unsupported_capability(Capability::Population))
        })
    }

    fn search_cards<'a>(&'a self, req: CardSearchRequest) -> ProviderFuture<'a, CandidateBatch> {
        Box::pin(async move {
            let snapshot: Vec<CardCandidate> = {
                let index = self
                    .index
                    .read()
                    .expect("local store lock is not poisoned");
                index.values().cloned().collect()
            };

            let mut candidates = filter_catalog(snapshot, &req.query, req.limit);
            // HashMap iteration order is arbitrary; keep the output stable.
            candidates.sort_by_key(candidate_haystack);
            Ok(CandidateBatch { candidates })
        })
    }

    fn validate<'a>(&'a self, req: ValidationRequest) -> ProviderFuture<'a, ValidationVerdict> {
        Box::pin(async move {
            let _ = req;
            Err(ProviderError::unsupported_capability(Capability::Validation))
        })
    }
}
