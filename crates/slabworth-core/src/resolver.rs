//! Card identity resolution across all card-search-capable providers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::adapters::LocalStoreAdapter;
use crate::cache::{CacheStore, CARD_SEARCH_TTL, RESOLVED_CARD_TTL};
use crate::error::AggregationError;
use crate::provider::{CardSearchRequest, ValidationRequest};
use crate::registry::{split_results, ProviderRegistry};
use crate::{CardCandidate, CardQuery, ProviderId, ResolvedCard, ValidationVerdict};

/// Candidates requested from each provider per lookup fan-out.
const LOOKUP_FETCH_LIMIT: usize = 25;

/// Scores provider candidates against the caller's query and merges the
/// answers into a best match, a ranked list, or an aggregate verdict.
pub struct CardResolver {
    registry: Arc<ProviderRegistry>,
    cache: CacheStore,
    offline: Option<Arc<LocalStoreAdapter>>,
    resolved_ttl: Duration,
    search_ttl: Duration,
}

impl CardResolver {
    pub fn new(registry: Arc<ProviderRegistry>, cache: CacheStore) -> Self {
        Self {
            registry,
            cache,
            offline: None,
            resolved_ttl: RESOLVED_CARD_TTL,
            search_ttl: CARD_SEARCH_TTL,
        }
    }

    /// Accepted matches are persisted here for offline fallback lookups.
    pub fn with_offline_store(mut self, store: Arc<LocalStoreAdapter>) -> Self {
        self.offline = Some(store);
        self
    }

    pub fn with_ttls(mut self, resolved_ttl: Duration, search_ttl: Duration) -> Self {
        self.resolved_ttl = resolved_ttl;
        self.search_ttl = search_ttl;
        self
    }

    /// Best single match for a partial identity, or `None` when no candidate
    /// clears the acceptance threshold.
    pub async fn lookup_card(
        &self,
        query: &CardQuery,
    ) -> Result<Option<ResolvedCard>, AggregationError> {
        let key = format!("resolve:{}", query.cache_key(None));
        if let Some(hit) = self.cache.get_value::<ResolvedCard>(&key).await {
            debug!(%key, "serving resolved card from cache");
            return Ok(Some(hit));
        }

        let request = CardSearchRequest::new(query.search_text(), LOOKUP_FETCH_LIMIT)?;
        let results = self.registry.fan_out_card_search(&request).await;
        let (successes, failures) = split_results(results);

        if successes.is_empty() && !failures.is_empty() {
            return Err(AggregationError::Exhausted { failures });
        }

        // Highest score wins; the first provider to report it wins ties, and
        // fan-out order is registration order, so the choice is stable.
        let mut best: Option<(u32, ProviderId, CardCandidate)> = None;
        for (provider, batch) in successes {
            for candidate in batch.candidates {
                let score = match_score(query, &candidate);
                if best.as_ref().map_or(true, |(top, _, _)| score > *top) {
                    best = Some((score, provider, candidate));
                }
            }
        }

        match best {
            Some((score, provider, candidate)) if score > ResolvedCard::ACCEPT_THRESHOLD => {
                let card = ResolvedCard::accept(candidate, score, provider)?;
                if let Some(offline) = &self.offline {
                    offline.remember(&card);
                }
                self.cache
                    .put_value(&key, &card, Some(self.resolved_ttl))
                    .await;
                debug!(%key, score, %provider, "accepted best match");
                Ok(Some(card))
            }
            best => {
                let top_score = best.map(|(score, _, _)| score).unwrap_or(0);
                debug!(%key, top_score, "no candidate above acceptance threshold");
                Ok(None)
            }
        }
    }

    /// Ranked, deduplicated candidate list for a free-text query.
    pub async fn search_cards(
        &self,
        request: &CardSearchRequest,
    ) -> Result<Vec<CardCandidate>, AggregationError> {
        let key = format!(
            "card_search:{}:{}",
            request.query.trim().to_ascii_lowercase(),
            request.limit
        );

        self.cache
            .wrap(&key, Some(self.search_ttl), || async {
                let results = self.registry.fan_out_card_search(request).await;
                let (successes, failures) = split_results(results);

                if successes.is_empty() && !failures.is_empty() {
                    return Err(AggregationError::Exhausted { failures });
                }

                let mut seen = HashSet::new();
                let mut candidates = Vec::new();
                for (_, batch) in successes {
                    for candidate in batch.candidates {
                        if seen.insert(candidate.composite_key()) {
                            candidates.push(candidate);
                        }
                    }
                }

                rank_candidates(&mut candidates, &request.query);
                candidates.truncate(request.limit);
                Ok(candidates)
            })
            .await
    }

    /// Aggregate plausibility verdict: valid when any provider confirms,
    /// mean confidence, unioned issues and suggestions.
    pub async fn validate_card(
        &self,
        query: &CardQuery,
    ) -> Result<ValidationVerdict, AggregationError> {
        let request = ValidationRequest::new(query.clone())?;
        let results = self.registry.fan_out_validation(&request).await;
        let (successes, failures) = split_results(results);

        if successes.is_empty() && !failures.is_empty() {
            return Err(AggregationError::Exhausted { failures });
        }

        let verdicts: Vec<ValidationVerdict> =
            successes.into_iter().map(|(_, verdict)| verdict).collect();
        Ok(merge_verdicts(verdicts))
    }
}

/// Score one candidate against the query.
///
/// +10 per exact player/year/set match, +5 for card number and manufacturer,
/// +2 per shared boolean attribute. Text comparison is case-insensitive and
/// trimmed.
pub fn match_score(query: &CardQuery, candidate: &CardCandidate) -> u32 {
    fn eq_fold(a: &str, b: &str) -> bool {
        a.trim().eq_ignore_ascii_case(b.trim())
    }

    fn opt_match(a: &Option<String>, b: &Option<String>) -> bool {
        matches!((a, b), (Some(a), Some(b)) if eq_fold(a, b))
    }

    let mut score = 0;

    if let Some(player) = &query.player {
        if eq_fold(player, &candidate.player) {
            score += 10;
        }
    }
    if let (Some(query_year), Some(candidate_year)) = (query.year, candidate.year) {
        if query_year == candidate_year {
            score += 10;
        }
    }
    if opt_match(&query.set_name, &candidate.set_name) {
        score += 10;
    }
    if opt_match(&query.card_number, &candidate.card_number) {
        score += 5;
    }
    if opt_match(&query.manufacturer, &candidate.manufacturer) {
        score += 5;
    }

    if query.attributes.rookie && candidate.attributes.rookie {
        score += 2;
    }
    if query.attributes.autograph && candidate.attributes.autograph {
        score += 2;
    }
    if query.attributes.patch && candidate.attributes.patch {
        score += 2;
    }

    score
}

/// Exact player-name matches first, then rookie/autograph specials, then
/// newest year.
fn rank_candidates(candidates: &mut [CardCandidate], query: &str) {
    let query_player = query.trim().to_ascii_lowercase();

    candidates.sort_by(|a, b| {
        let a_exact = a.player.trim().to_ascii_lowercase() == query_player;
        let b_exact = b.player.trim().to_ascii_lowercase() == query_player;
        let a_special = a.attributes.rookie || a.attributes.autograph;
        let b_special = b.attributes.rookie || b.attributes.autograph;

        b_exact
            .cmp(&a_exact)
            .then_with(|| b_special.cmp(&a_special))
            .then_with(|| b.year.cmp(&a.year))
    });
}

fn merge_verdicts(verdicts: Vec<ValidationVerdict>) -> ValidationVerdict {
    if verdicts.is_empty() {
        return ValidationVerdict {
            is_valid: false,
            confidence: 0,
            issues: vec![String::from("no provider could validate this card")],
            suggestions: Vec::new(),
        };
    }

    let is_valid = verdicts.iter().any(|verdict| verdict.is_valid);
    let confidence = (verdicts
        .iter()
        .map(|verdict| u32::from(verdict.confidence))
        .sum::<u32>() as f64
        / verdicts.len() as f64)
        .round() as u8;

    let mut issues: Vec<String> = verdicts
        .iter()
        .flat_map(|verdict| verdict.issues.iter().cloned())
        .collect();
    issues.sort();
    issues.dedup();

    let mut suggestions: Vec<String> = verdicts
        .into_iter()
        .flat_map(|verdict| verdict.suggestions)
        .collect();
    suggestions.sort();
    suggestions.dedup();

    ValidationVerdict {
        is_valid,
        confidence,
        issues,
        suggestions,
    }
}
