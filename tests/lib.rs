//! Shared helpers for the behavior test suites.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use slabworth_core::{
    provider::{
        CandidateBatch, Capability, CapabilitySet, CardSearchRequest, PopulationRequest, Provider,
        ProviderError, ProviderFuture, SalesBatch, SalesRequest, ValidationRequest,
    },
    Backoff, CacheStore, CardAttributes, CardCandidate, CardQuery, CircuitBreakerConfig,
    GuardedProvider, MarketAggregate, MarketAggregator, PopulationReport, ProviderId,
    ProviderRegistry, ResolvedCard, RetryPolicy, Sale, Trend, UtcDateTime, ValidationVerdict,
};

/// Guard with no retries, millisecond backoff, and a short deadline, so
/// failure scenarios run fast and call counts stay predictable.
pub fn fast_guard(provider: Arc<dyn Provider>, breaker: CircuitBreakerConfig) -> GuardedProvider {
    GuardedProvider::with_policies(
        provider,
        breaker,
        RetryPolicy::new(
            1,
            Backoff::Fixed {
                delay: Duration::from_millis(1),
            },
        ),
        Duration::from_secs(1),
    )
}

pub fn fast_registry(providers: Vec<Arc<dyn Provider>>) -> Arc<ProviderRegistry> {
    Arc::new(ProviderRegistry::new(
        providers
            .into_iter()
            .map(|provider| fast_guard(provider, CircuitBreakerConfig::default()))
            .collect(),
    ))
}

pub fn market_aggregator(providers: Vec<Arc<dyn Provider>>) -> MarketAggregator {
    MarketAggregator::new(
        fast_registry(providers),
        CacheStore::new(Duration::from_secs(60)),
    )
}

/// Build a sale `days_ago` days in the past.
pub fn sale(price: f64, days_ago: i64, source: ProviderId) -> Sale {
    let occurred_at = UtcDateTime::now()
        .days_before(days_ago)
        .expect("timestamp in range");
    Sale::new(price, occurred_at, source, "PSA 10", "scripted listing", None)
        .expect("valid sale")
}

/// Provider with fully scripted responses, for driving aggregation scenarios
/// without touching the adapter layer.
pub struct ScriptedProvider {
    id: ProviderId,
    capabilities: CapabilitySet,
    sales: Vec<Sale>,
    candidates: Vec<CardCandidate>,
    verdict: Option<ValidationVerdict>,
    failures_before_success: u32,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn sales(id: ProviderId, sales: Vec<Sale>) -> Self {
        Self {
            id,
            capabilities: CapabilitySet::new(true, false, false, false),
            sales,
            candidates: Vec::new(),
            verdict: None,
            failures_before_success: 0,
            calls: AtomicU32::new(0),
        }
    }

    pub fn cards(id: ProviderId, candidates: Vec<CardCandidate>) -> Self {
        Self {
            id,
            capabilities: CapabilitySet::new(false, false, true, false),
            sales: Vec::new(),
            candidates,
            verdict: None,
            failures_before_success: 0,
            calls: AtomicU32::new(0),
        }
    }

    pub fn validator(id: ProviderId, verdict: ValidationVerdict) -> Self {
        Self {
            id,
            capabilities: CapabilitySet::new(false, false, false, true),
            sales: Vec::new(),
            candidates: Vec::new(),
            verdict: Some(verdict),
            failures_before_success: 0,
            calls: AtomicU32::new(0),
        }
    }

    /// Fail every call with a retryable network error.
    pub fn always_failing(mut self) -> Self {
        self.failures_before_success = u32::MAX;
        self
    }

    /// Fail the first `n` calls, then succeed.
    pub fn failing_first(mut self, n: u32) -> Self {
        self.failures_before_success = n;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) -> Result<(), ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures_before_success {
            Err(ProviderError::network("scripted outage"))
        } else {
            Ok(())
        }
    }
}

impl Provider for ScriptedProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    fn search_sales<'a>(&'a self, _req: SalesRequest) -> ProviderFuture<'a, SalesBatch> {
        Box::pin(async move {
            self.tick()?;
            Ok(SalesBatch {
                sales: self.sales.clone(),
            })
        })
    }

    fn population<'a>(&'a self, _req: PopulationRequest) -> ProviderFuture<'a, PopulationReport> {
        Box::pin(async move {
            self.tick()?;
            Err(ProviderError::unsupported_capability(Capability::Population))
        })
    }

    fn search_cards<'a>(&'a self, _req: CardSearchRequest) -> ProviderFuture<'a, CandidateBatch> {
        Box::pin(async move {
            self.tick()?;
            Ok(CandidateBatch {
                candidates: self.candidates.clone(),
            })
        })
    }

    fn validate<'a>(&'a self, _req: ValidationRequest) -> ProviderFuture<'a, ValidationVerdict> {
        Box::pin(async move {
            self.tick()?;
            match &self.verdict {
                Some(verdict) => Ok(verdict.clone()),
                None => Err(ProviderError::unsupported_capability(Capability::Validation)),
            }
        })
    }
}
