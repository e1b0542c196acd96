//! Guarded provider set and fan-out.
//!
//! [`GuardedProvider`] pairs one provider with its own circuit breaker and
//! retry policy; [`ProviderRegistry`] owns the guarded set and dispatches a
//! request to every capability-matching provider concurrently, waiting for
//! all of them while tolerating individual failures.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::warn;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::ProviderFailure;
use crate::provider::{
    CandidateBatch, Capability, CapabilitySet, CardSearchRequest, PopulationRequest, Provider,
    ProviderError, ProviderFuture, SalesBatch, SalesRequest, ValidationRequest,
};
use crate::retry::RetryPolicy;
use crate::{PopulationReport, ProviderId, ValidationVerdict};

/// Deadline for one guarded provider call, retries included per attempt.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// One provider wrapped by its failure-isolation primitives.
///
/// The guard sequence per call: consult the breaker (an open circuit
/// fast-fails without touching the retry policy or the network), drive the
/// provider future under the retry policy with a per-attempt deadline, then
/// feed the breaker exactly one success or failure.
pub struct GuardedProvider {
    provider: Arc<dyn Provider>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl GuardedProvider {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self::with_policies(
            provider,
            CircuitBreakerConfig::default(),
            RetryPolicy::default(),
            DEFAULT_CALL_TIMEOUT,
        )
    }

    pub fn with_policies(
        provider: Arc<dyn Provider>,
        breaker_config: CircuitBreakerConfig,
        retry: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            breaker: Arc::new(CircuitBreaker::new(breaker_config)),
            retry,
            call_timeout,
        }
    }

    pub fn id(&self) -> ProviderId {
        self.provider.id()
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.provider.capabilities()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub async fn search_sales(&self, req: &SalesRequest) -> Result<SalesBatch, ProviderError> {
        self.call(|provider| provider.search_sales(req.clone()))
            .await
    }

    pub async fn population(
        &self,
        req: &PopulationRequest,
    ) -> Result<PopulationReport, ProviderError> {
        self.call(|provider| provider.population(req.clone())).await
    }

    pub async fn search_cards(
        &self,
        req: &CardSearchRequest,
    ) -> Result<CandidateBatch, ProviderError> {
        self.call(|provider| provider.search_cards(req.clone()))
            .await
    }

    pub async fn validate(
        &self,
        req: &ValidationRequest,
    ) -> Result<ValidationVerdict, ProviderError> {
        self.call(|provider| provider.validate(req.clone())).await
    }

    async fn call<'a, T, F>(&'a self, invoke: F) -> Result<T, ProviderError>
    where
        F: Fn(&'a dyn Provider) -> ProviderFuture<'a, T>,
    {
        if !self.breaker.allow_request() {
            return Err(ProviderError::circuit_open(self.provider.id()));
        }

        let result = self
            .retry
            .run(|| {
                let fut = invoke(self.provider.as_ref());
                let deadline = self.call_timeout;
                let provider = self.provider.id();
                async move {
                    match tokio::time::timeout(deadline, fut).await {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::network(format!(
                            "provider '{provider}' call exceeded the {}ms deadline",
                            deadline.as_millis()
                        ))),
                    }
                }
            })
            .await;

        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(_) => self.breaker.record_failure(),
        }
        result
    }
}

/// Explicit, injected set of guarded providers. Never a global.
pub struct ProviderRegistry {
    providers: Vec<GuardedProvider>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<GuardedProvider>) -> Self {
        Self { providers }
    }

    /// Wrap plain providers with default breaker/retry policies.
    pub fn from_providers(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self::new(providers.into_iter().map(GuardedProvider::new).collect())
    }

    pub fn providers(&self) -> &[GuardedProvider] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Providers exposing `capability`, in registration order.
    pub fn with_capability(&self, capability: Capability) -> Vec<&GuardedProvider> {
        self.providers
            .iter()
            .filter(|guard| guard.capabilities().supports(capability))
            .collect()
    }

    pub async fn fan_out_sales(
        &self,
        req: &SalesRequest,
    ) -> Vec<(ProviderId, Result<SalesBatch, ProviderError>)> {
        let calls = self
            .with_capability(Capability::Sales)
            .into_iter()
            .map(|guard| async move { (guard.id(), guard.search_sales(req).await) });
        log_failures("sales", join_all(calls).await)
    }

    pub async fn fan_out_population(
        &self,
        req: &PopulationRequest,
    ) -> Vec<(ProviderId, Result<PopulationReport, ProviderError>)> {
        let calls = self
            .with_capability(Capability::Population)
            .into_iter()
            .map(|guard| async move { (guard.id(), guard.population(req).await) });
        log_failures("population", join_all(calls).await)
    }

    pub async fn fan_out_card_search(
        &self,
        req: &CardSearchRequest,
    ) -> Vec<(ProviderId, Result<CandidateBatch, ProviderError>)> {
        let calls = self
            .with_capability(Capability::CardSearch)
            .into_iter()
            .map(|guard| async move { (guard.id(), guard.search_cards(req).await) });
        log_failures("card_search", join_all(calls).await)
    }

    pub async fn fan_out_validation(
        &self,
        req: &ValidationRequest,
    ) -> Vec<(ProviderId, Result<ValidationVerdict, ProviderError>)> {
        let calls = self
            .with_capability(Capability::Validation)
            .into_iter()
            .map(|guard| async move { (guard.id(), guard.validate(req).await) });
        log_failures("validation", join_all(calls).await)
    }
}

fn log_failures<T>(
    operation: &'static str,
    results: Vec<(ProviderId, Result<T, ProviderError>)>,
) -> Vec<(ProviderId, Result<T, ProviderError>)> {
    for (provider, result) in &results {
        if let Err(error) = result {
            warn!(%provider, %error, operation, "provider failed during fan-out, skipping");
        }
    }
    results
}

/// Partition fan-out results into contributions and failures.
pub fn split_results<T>(
    results: Vec<(ProviderId, Result<T, ProviderError>)>,
) -> (Vec<(ProviderId, T)>, Vec<ProviderFailure>) {
    let mut successes = Vec::new();
    let mut failures = Vec::new();
    for (provider, result) in results {
        match result {
            Ok(value) => successes.push((provider, value)),
            Err(error) => failures.push(ProviderFailure::new(provider, error)),
        }
    }
    (successes, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Backoff;
    use crate::{CardQuery, ProviderErrorKind, Sale, UtcDateTime};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Provider that fails a configured number of times before succeeding.
    struct FlakyProvider {
        id: ProviderId,
        failures_before_success: u32,
        calls: AtomicU32,
        hang: Option<Duration>,
    }

    impl FlakyProvider {
        fn new(id: ProviderId, failures_before_success: u32) -> Self {
            Self {
                id,
                failures_before_success,
                calls: AtomicU32::new(0),
                hang: None,
            }
        }

        fn hanging(id: ProviderId, hang: Duration) -> Self {
            Self {
                id,
                failures_before_success: 0,
                calls: AtomicU32::new(0),
                hang: Some(hang),
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn demo_batch(&self) -> SalesBatch {
            let sale = Sale::new(
                100.0,
                UtcDateTime::now(),
                self.id,
                "PSA 10",
                "scripted sale",
                None,
            )
            .expect("valid sale");
            SalesBatch { sales: vec![sale] }
        }
    }

    impl Provider for FlakyProvider {
        fn id(&self) -> ProviderId {
            self.id
        }

        fn capabilities(&self) -> CapabilitySet {
            CapabilitySet::new(true, false, false, false)
        }

        fn search_sales<'a>(&'a self, _req: SalesRequest) -> ProviderFuture<'a, SalesBatch> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                if let Some(hang) = self.hang {
                    tokio::time::sleep(hang).await;
                }
                if call < self.failures_before_success {
                    Err(ProviderError::network("scripted outage"))
                } else {
                    Ok(self.demo_batch())
                }
            })
        }

        fn population<'a>(
            &'a self,
            _req: PopulationRequest,
        ) -> ProviderFuture<'a, PopulationReport> {
            Box::pin(async move {
                Err(ProviderError::unsupported_capability(Capability::Population))
            })
        }

        fn search_cards<'a>(
            &'a self,
            _req: CardSearchRequest,
        ) -> ProviderFuture<'a, CandidateBatch> {
            Box::pin(async move {
                Err(ProviderError::unsupported_capability(Capability::CardSearch))
            })
        }

        fn validate<'a>(
            &'a self,
            _req: ValidationRequest,
        ) -> ProviderFuture<'a, ValidationVerdict> {
            Box::pin(async move {
                Err(ProviderError::unsupported_capability(Capability::Validation))
            })
        }
    }

    fn fast_retry(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            attempts,
            Backoff::Fixed {
                delay: Duration::from_millis(1),
            },
        )
    }

    fn sales_request() -> SalesRequest {
        SalesRequest::new(CardQuery::for_player("Juan Soto"), None, 5).expect("valid request")
    }

    #[tokio::test]
    async fn retry_recovers_within_a_single_guarded_call() {
        let provider = Arc::new(FlakyProvider::new(ProviderId::Ebay, 2));
        let guard = GuardedProvider::with_policies(
            provider.clone(),
            CircuitBreakerConfig::default(),
            fast_retry(3),
            DEFAULT_CALL_TIMEOUT,
        );

        let batch = guard
            .search_sales(&sales_request())
            .await
            .expect("third attempt succeeds");
        assert_eq!(batch.sales.len(), 1);
        assert_eq!(provider.call_count(), 3);
        // The guarded call settled as one success.
        assert_eq!(guard.breaker().consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn open_breaker_skips_provider_and_retry_entirely() {
        let provider = Arc::new(FlakyProvider::new(ProviderId::Ebay, u32::MAX));
        let guard = GuardedProvider::with_policies(
            provider.clone(),
            CircuitBreakerConfig {
                failure_threshold: 2,
                open_timeout: Duration::from_secs(60),
            },
            fast_retry(1),
            DEFAULT_CALL_TIMEOUT,
        );

        for _ in 0..2 {
            let _ = guard.search_sales(&sales_request()).await;
        }
        let attempted_calls = provider.call_count();

        let error = guard
            .search_sales(&sales_request())
            .await
            .expect_err("circuit is open");
        assert_eq!(error.kind(), ProviderErrorKind::CircuitOpen);
        // No further provider invocation happened.
        assert_eq!(provider.call_count(), attempted_calls);
    }

    #[tokio::test]
    async fn hung_provider_is_cut_off_by_the_deadline() {
        let provider = Arc::new(FlakyProvider::hanging(
            ProviderId::Ebay,
            Duration::from_millis(100),
        ));
        let guard = GuardedProvider::with_policies(
            provider,
            CircuitBreakerConfig::default(),
            fast_retry(1),
            Duration::from_millis(10),
        );

        let error = guard
            .search_sales(&sales_request())
            .await
            .expect_err("deadline exceeded");
        assert_eq!(error.kind(), ProviderErrorKind::Network);
        assert!(error.message().contains("deadline"));
    }

    #[tokio::test]
    async fn fan_out_tolerates_individual_failures() {
        let registry = ProviderRegistry::new(vec![
            GuardedProvider::with_policies(
                Arc::new(FlakyProvider::new(ProviderId::Ebay, u32::MAX)),
                CircuitBreakerConfig::default(),
                fast_retry(1),
                DEFAULT_CALL_TIMEOUT,
            ),
            GuardedProvider::with_policies(
                Arc::new(FlakyProvider::new(ProviderId::CardLadder, 0)),
                CircuitBreakerConfig::default(),
                fast_retry(1),
                DEFAULT_CALL_TIMEOUT,
            ),
        ]);

        let results = registry.fan_out_sales(&sales_request()).await;
        let (successes, failures) = split_results(results);

        assert_eq!(successes.len(), 1);
        assert_eq!(successes[0].0, ProviderId::CardLadder);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].provider, ProviderId::Ebay);
    }
}
