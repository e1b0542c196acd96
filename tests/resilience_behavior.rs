//! Behavior tests for the failure-isolation primitives working together:
//! circuit breaking, bounded retry, and cache expiry seen through the
//! aggregator.

use std::sync::Arc;
use std::time::Duration;

use slabworth_core::error::AggregationError;
use slabworth_core::{
    Backoff, CacheStore, CircuitBreakerConfig, GuardedProvider, MarketAggregator,
    ProviderErrorKind, ProviderRegistry, RetryPolicy,
};
use slabworth_tests::{sale, CardQuery, Provider, ProviderId, ScriptedProvider};

fn soto_query() -> CardQuery {
    CardQuery::for_player("Juan Soto").with_year(2018)
}

fn aggregator_with_guard(guard: GuardedProvider) -> MarketAggregator {
    MarketAggregator::new(
        Arc::new(ProviderRegistry::new(vec![guard])),
        CacheStore::new(Duration::from_secs(60)),
    )
}

fn no_retry() -> RetryPolicy {
    RetryPolicy::new(
        1,
        Backoff::Fixed {
            delay: Duration::from_millis(1),
        },
    )
}

#[tokio::test]
async fn five_failures_open_the_circuit_and_stop_network_attempts() {
    let scripted = Arc::new(ScriptedProvider::sales(ProviderId::Ebay, Vec::new()).always_failing());
    let guard = GuardedProvider::with_policies(
        Arc::clone(&scripted) as Arc<dyn Provider>,
        CircuitBreakerConfig {
            failure_threshold: 5,
            open_timeout: Duration::from_millis(50),
        },
        no_retry(),
        Duration::from_secs(1),
    );
    let aggregator = aggregator_with_guard(guard);

    // Five failing calls feed the breaker to its threshold.
    for _ in 0..5 {
        let error = aggregator
            .market_aggregate(&soto_query(), None)
            .await
            .expect_err("provider is down");
        assert!(matches!(error, AggregationError::Exhausted { .. }));
    }
    assert_eq!(scripted.call_count(), 5);

    // The sixth call fast-fails: circuit open, no provider invocation.
    let error = aggregator
        .market_aggregate(&soto_query(), None)
        .await
        .expect_err("circuit is open");
    match error {
        AggregationError::Exhausted { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].error.kind(), ProviderErrorKind::CircuitOpen);
        }
        other => panic!("expected Exhausted, got {other}"),
    }
    assert_eq!(scripted.call_count(), 5);

    // After the cooldown exactly one probe goes through.
    tokio::time::sleep(Duration::from_millis(60)).await;
    let _ = aggregator.market_aggregate(&soto_query(), None).await;
    assert_eq!(scripted.call_count(), 6);

    // The failed probe re-opened the circuit immediately.
    let _ = aggregator.market_aggregate(&soto_query(), None).await;
    assert_eq!(scripted.call_count(), 6);
}

#[tokio::test]
async fn a_call_that_recovers_on_the_third_attempt_succeeds() {
    let scripted = Arc::new(
        ScriptedProvider::sales(ProviderId::Ebay, vec![sale(100.0, 1, ProviderId::Ebay)])
            .failing_first(2),
    );
    let guard = GuardedProvider::with_policies(
        Arc::clone(&scripted) as Arc<dyn Provider>,
        CircuitBreakerConfig::default(),
        RetryPolicy::new(
            3,
            Backoff::Fixed {
                delay: Duration::from_millis(1),
            },
        ),
        Duration::from_secs(1),
    );
    let aggregator = aggregator_with_guard(guard);

    let aggregate = aggregator
        .market_aggregate(&soto_query(), None)
        .await
        .expect("third attempt succeeds");

    assert_eq!(aggregate.recent_sales.len(), 1);
    assert_eq!(scripted.call_count(), 3);
}

#[tokio::test]
async fn retries_exhausted_count_as_one_breaker_failure() {
    let scripted = Arc::new(ScriptedProvider::sales(ProviderId::Ebay, Vec::new()).always_failing());
    let guard = GuardedProvider::with_policies(
        Arc::clone(&scripted) as Arc<dyn Provider>,
        CircuitBreakerConfig::default(),
        RetryPolicy::new(
            3,
            Backoff::Fixed {
                delay: Duration::from_millis(1),
            },
        ),
        Duration::from_secs(1),
    );

    let request = slabworth_core::SalesRequest::new(soto_query(), None, 5).expect("valid request");
    let _ = guard.search_sales(&request).await;

    // Three provider attempts, one settled failure.
    assert_eq!(scripted.call_count(), 3);
    assert_eq!(guard.breaker().consecutive_failures(), 1);
}

#[tokio::test]
async fn expired_market_cache_triggers_a_fresh_fan_out() {
    let scripted = Arc::new(ScriptedProvider::sales(
        ProviderId::Ebay,
        vec![sale(100.0, 1, ProviderId::Ebay)],
    ));
    let guard = GuardedProvider::with_policies(
        Arc::clone(&scripted) as Arc<dyn Provider>,
        CircuitBreakerConfig::default(),
        no_retry(),
        Duration::from_secs(1),
    );
    let aggregator = MarketAggregator::new(
        Arc::new(ProviderRegistry::new(vec![guard])),
        CacheStore::new(Duration::from_secs(60)),
    )
    .with_ttls(Duration::from_millis(100), Duration::from_secs(60));

    aggregator
        .market_aggregate(&soto_query(), None)
        .await
        .expect("first computation");
    aggregator
        .market_aggregate(&soto_query(), None)
        .await
        .expect("cache hit");
    assert_eq!(scripted.call_count(), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    aggregator
        .market_aggregate(&soto_query(), None)
        .await
        .expect("recomputed after expiry");
    assert_eq!(scripted.call_count(), 2);
}
