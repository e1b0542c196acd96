//! Market-value aggregation across all sales-capable providers.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheStore, MARKET_AGGREGATE_TTL, POPULATION_TTL};
use crate::error::AggregationError;
use crate::provider::{PopulationRequest, SalesRequest};
use crate::registry::{split_results, ProviderRegistry};
use crate::subscription::{AggregateCallback, Subscription, SubscriptionHub};
use crate::{CardQuery, MarketAggregate, PopulationReport, ProviderId, Sale, UtcDateTime};

/// Sales requested from each provider per fan-out; the merged view keeps
/// only the newest [`MarketAggregate::RECENT_SALES_CAP`].
const SALES_FETCH_LIMIT: usize = 50;

/// The grading service whose population report wins outright when present.
const AUTHORITATIVE_POPULATION: ProviderId = ProviderId::Psa;

/// Fans out market queries, merges the partial answers, and pushes fresh
/// aggregates to subscribers.
pub struct MarketAggregator {
    registry: Arc<ProviderRegistry>,
    cache: CacheStore,
    subscriptions: SubscriptionHub,
    market_ttl: Duration,
    population_ttl: Duration,
}

impl MarketAggregator {
    pub fn new(registry: Arc<ProviderRegistry>, cache: CacheStore) -> Self {
        Self {
            registry,
            cache,
            subscriptions: SubscriptionHub::new(),
            market_ttl: MARKET_AGGREGATE_TTL,
            population_ttl: POPULATION_TTL,
        }
    }

    pub fn with_ttls(mut self, market_ttl: Duration, population_ttl: Duration) -> Self {
        self.market_ttl = market_ttl;
        self.population_ttl = population_ttl;
        self
    }

    /// Merged market view for one card and optional target grade.
    ///
    /// Partial provider failures are tolerated and logged; the call fails
    /// only when every provider failed and nothing is cached, or when the
    /// query itself is invalid.
    pub async fn market_aggregate(
        &self,
        query: &CardQuery,
        grade: Option<&str>,
    ) -> Result<MarketAggregate, AggregationError> {
        let key = market_key(query, grade);
        if let Some(hit) = self.cache.get_value::<MarketAggregate>(&key).await {
            debug!(%key, "serving market aggregate from cache");
            return Ok(hit);
        }

        let request = SalesRequest::new(
            query.clone(),
            grade.map(str::to_owned),
            SALES_FETCH_LIMIT,
        )?;
        let results = self.registry.fan_out_sales(&request).await;
        let (successes, failures) = split_results(results);

        if successes.is_empty() && !failures.is_empty() {
            return Err(AggregationError::Exhausted { failures });
        }

        let sales: Vec<Sale> = successes
            .into_iter()
            .flat_map(|(_, batch)| batch.sales)
            .collect();
        let aggregate = MarketAggregate::from_sales(sales, UtcDateTime::now());

        self.cache
            .put_value(&key, &aggregate, Some(self.market_ttl))
            .await;
        let notified = self.subscriptions.publish(&key, &aggregate);
        debug!(
            %key,
            sales = aggregate.recent_sales.len(),
            sources = aggregate.data_sources.len(),
            notified,
            "market aggregate rebuilt"
        );

        Ok(aggregate)
    }

    /// Merged graded-population view for one card.
    pub async fn population_report(
        &self,
        query: &CardQuery,
    ) -> Result<PopulationReport, AggregationError> {
        let key = format!("population:{}", query.cache_key(None));
        self.cache
            .wrap(&key, Some(self.population_ttl), || async {
                let request = PopulationRequest::new(query.clone())?;
                let results = self.registry.fan_out_population(&request).await;
                let (successes, failures) = split_results(results);

                let reports: Vec<PopulationReport> =
                    successes.into_iter().map(|(_, report)| report).collect();
                let now = UtcDateTime::now();

                match PopulationReport::merge(reports, AUTHORITATIVE_POPULATION, now) {
                    Some(merged) => Ok(merged),
                    None if failures.is_empty() => Ok(PopulationReport::empty(now)),
                    None => Err(AggregationError::Exhausted { failures }),
                }
            })
            .await
    }

    /// Register a callback for every recomputed aggregate of this query/grade.
    pub fn subscribe(
        &self,
        query: &CardQuery,
        grade: Option<&str>,
        callback: AggregateCallback,
    ) -> Subscription {
        self.subscriptions.subscribe(market_key(query, grade), callback)
    }
}

fn market_key(query: &CardQuery, grade: Option<&str>) -> String {
    format!("market:{}", query.cache_key(grade))
}
