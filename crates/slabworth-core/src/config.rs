//! Environment configuration and stack assembly.
//!
//! There is no command-line surface; everything is driven by environment
//! variables and builder methods. `SLABWORTH_`-prefixed variables win over
//! their unprefixed fallbacks.
//!
//! | Variable | Fallback | Meaning |
//! |----------|----------|---------|
//! | `SLABWORTH_EBAY_API_KEY` | `EBAY_API_KEY` | eBay OAuth token |
//! | `SLABWORTH_PSA_API_KEY` | `PSA_API_KEY` | PSA API key |
//! | `SLABWORTH_SCP_API_KEY` | `SPORTSCARDSPRO_API_KEY` | SportsCardsPro key |
//! | `SLABWORTH_CARDLADDER_API_KEY` | `CARDLADDER_API_KEY` | Card Ladder token |
//! | `SLABWORTH_MARKET_TTL_SECS` | – | Market aggregate cache TTL |
//! | `SLABWORTH_POPULATION_TTL_SECS` | – | Population report cache TTL |
//! | `SLABWORTH_SEARCH_TTL_SECS` | – | Card search cache TTL |
//! | `SLABWORTH_BREAKER_THRESHOLD` | – | Circuit breaker failure threshold |
//! | `SLABWORTH_BREAKER_TIMEOUT_SECS` | – | Circuit breaker open cooldown |
//! | `SLABWORTH_RETRY_ATTEMPTS` | – | Total tries per guarded call |

use std::env;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::adapters::{
    CardLadderAdapter, EbayAdapter, LocalStoreAdapter, PsaAdapter, SportsCardsProAdapter,
};
use crate::aggregator::MarketAggregator;
use crate::cache::{CacheStore, CARD_SEARCH_TTL, MARKET_AGGREGATE_TTL, POPULATION_TTL, RESOLVED_CARD_TTL};
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::http_client::{HttpAuth, HttpClient, NoopHttpClient, ReqwestHttpClient};
use crate::provider::Provider;
use crate::registry::{GuardedProvider, ProviderRegistry};
use crate::resolver::CardResolver;
use crate::retry::{Backoff, RetryPolicy};

fn env_var(primary: &str, fallback: &str) -> Option<String> {
    env::var(primary).or_else(|_| env::var(fallback)).ok()
}

fn env_secs(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

/// Tunables resolved once at startup.
#[derive(Debug, Clone)]
pub struct StackConfig {
    pub market_ttl: Duration,
    pub population_ttl: Duration,
    pub resolved_ttl: Duration,
    pub search_ttl: Duration,
    pub breaker: CircuitBreakerConfig,
    pub retry_attempts: u32,
    pub call_timeout: Duration,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            market_ttl: MARKET_AGGREGATE_TTL,
            population_ttl: POPULATION_TTL,
            resolved_ttl: RESOLVED_CARD_TTL,
            search_ttl: CARD_SEARCH_TTL,
            breaker: CircuitBreakerConfig::default(),
            retry_attempts: 3,
            call_timeout: Duration::from_secs(10),
        }
    }
}

impl StackConfig {
    /// Defaults overridden by whatever the environment sets.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            market_ttl: env_secs("SLABWORTH_MARKET_TTL_SECS", defaults.market_ttl),
            population_ttl: env_secs("SLABWORTH_POPULATION_TTL_SECS", defaults.population_ttl),
            resolved_ttl: defaults.resolved_ttl,
            search_ttl: env_secs("SLABWORTH_SEARCH_TTL_SECS", defaults.search_ttl),
            breaker: CircuitBreakerConfig {
                failure_threshold: env_u32(
                    "SLABWORTH_BREAKER_THRESHOLD",
                    defaults.breaker.failure_threshold,
                ),
                open_timeout: env_secs(
                    "SLABWORTH_BREAKER_TIMEOUT_SECS",
                    defaults.breaker.open_timeout,
                ),
            },
            retry_attempts: env_u32("SLABWORTH_RETRY_ATTEMPTS", defaults.retry_attempts),
            call_timeout: defaults.call_timeout,
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Backoff::default())
    }
}

/// The assembled aggregation surface: one registry and cache shared by the
/// market aggregator and the card resolver.
pub struct ValuationStack {
    pub market: MarketAggregator,
    pub resolver: CardResolver,
    registry: Arc<ProviderRegistry>,
    offline: Arc<LocalStoreAdapter>,
}

impl ValuationStack {
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn offline_store(&self) -> &Arc<LocalStoreAdapter> {
        &self.offline
    }
}

/// Builds a [`ValuationStack`] from explicit toggles plus the environment.
///
/// Providers without credentials fall back to their deterministic mock
/// transport individually; mock mode forces it everywhere.
#[derive(Debug)]
pub struct StackBuilder {
    use_mock: bool,
    ebay_api_key: Option<String>,
    psa_api_key: Option<String>,
    scp_api_key: Option<String>,
    cardladder_api_key: Option<String>,
    enable_ebay: bool,
    enable_psa: bool,
    enable_sportscardspro: bool,
    enable_cardladder: bool,
    config: StackConfig,
}

impl Default for StackBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StackBuilder {
    pub fn new() -> Self {
        Self {
            use_mock: false,
            ebay_api_key: None,
            psa_api_key: None,
            scp_api_key: None,
            cardladder_api_key: None,
            enable_ebay: true,
            enable_psa: true,
            enable_sportscardspro: true,
            enable_cardladder: true,
            config: StackConfig::default(),
        }
    }

    /// Force the deterministic mock transport for every provider.
    pub fn with_mock_mode(mut self) -> Self {
        self.use_mock = true;
        self
    }

    /// Use real HTTP transports, reading credentials from the environment.
    pub fn with_real_clients(mut self) -> Self {
        self.use_mock = false;
        self.ebay_api_key = env_var("SLABWORTH_EBAY_API_KEY", "EBAY_API_KEY");
        self.psa_api_key = env_var("SLABWORTH_PSA_API_KEY", "PSA_API_KEY");
        self.scp_api_key = env_var("SLABWORTH_SCP_API_KEY", "SPORTSCARDSPRO_API_KEY");
        self.cardladder_api_key = env_var("SLABWORTH_CARDLADDER_API_KEY", "CARDLADDER_API_KEY");
        self
    }

    pub fn with_config(mut self, config: StackConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_ebay_key(mut self, key: impl Into<String>) -> Self {
        self.ebay_api_key = Some(key.into());
        self
    }

    pub fn with_psa_key(mut self, key: impl Into<String>) -> Self {
        self.psa_api_key = Some(key.into());
        self
    }

    pub fn with_sportscardspro_key(mut self, key: impl Into<String>) -> Self {
        self.scp_api_key = Some(key.into());
        self
    }

    pub fn with_cardladder_key(mut self, key: impl Into<String>) -> Self {
        self.cardladder_api_key = Some(key.into());
        self
    }

    pub fn with_ebay_enabled(mut self, enabled: bool) -> Self {
        self.enable_ebay = enabled;
        self
    }

    pub fn with_psa_enabled(mut self, enabled: bool) -> Self {
        self.enable_psa = enabled;
        self
    }

    pub fn with_sportscardspro_enabled(mut self, enabled: bool) -> Self {
        self.enable_sportscardspro = enabled;
        self
    }

    pub fn with_cardladder_enabled(mut self, enabled: bool) -> Self {
        self.enable_cardladder = enabled;
        self
    }

    pub fn build(self) -> ValuationStack {
        let mut providers: Vec<Arc<dyn Provider>> = Vec::new();

        if self.enable_ebay {
            providers.push(if self.use_mock {
                Arc::new(EbayAdapter::default())
            } else if let Some(key) = &self.ebay_api_key {
                let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
                Arc::new(EbayAdapter::with_http_client(
                    http_client,
                    HttpAuth::BearerToken(key.clone()),
                ))
            } else {
                debug!("no ebay credentials, falling back to mock transport");
                Arc::new(EbayAdapter::default())
            });
        }

        if self.enable_psa {
            providers.push(if self.use_mock {
                Arc::new(PsaAdapter::default())
            } else if let Some(key) = &self.psa_api_key {
                let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
                Arc::new(PsaAdapter::with_http_client(http_client, key.clone()))
            } else {
                debug!("no psa credentials, falling back to mock transport");
                Arc::new(PsaAdapter::default())
            });
        }

        if self.enable_sportscardspro {
            providers.push(if self.use_mock {
                Arc::new(SportsCardsProAdapter::default())
            } else if let Some(key) = &self.scp_api_key {
                let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
                Arc::new(SportsCardsProAdapter::with_http_client(
                    http_client,
                    key.clone(),
                ))
            } else {
                debug!("no sportscardspro credentials, falling back to mock transport");
                Arc::new(SportsCardsProAdapter::default())
            });
        }

        if self.enable_cardladder {
            providers.push(if self.use_mock {
                Arc::new(CardLadderAdapter::default())
            } else if let Some(key) = &self.cardladder_api_key {
                let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
                Arc::new(CardLadderAdapter::with_http_client(
                    http_client,
                    HttpAuth::BearerToken(key.clone()),
                ))
            } else {
                debug!("no cardladder credentials, falling back to mock transport");
                Arc::new(CardLadderAdapter::default())
            });
        }

        let offline = Arc::new(LocalStoreAdapter::new());
        providers.push(Arc::clone(&offline) as Arc<dyn Provider>);

        let retry = self.config.retry_policy();
        let guards = providers
            .into_iter()
            .map(|provider| {
                GuardedProvider::with_policies(
                    provider,
                    self.config.breaker,
                    retry.clone(),
                    self.config.call_timeout,
                )
            })
            .collect();

        let registry = Arc::new(ProviderRegistry::new(guards));
        let cache = CacheStore::new(self.config.market_ttl);

        let market = MarketAggregator::new(Arc::clone(&registry), cache.clone())
            .with_ttls(self.config.market_ttl, self.config.population_ttl);
        let resolver = CardResolver::new(Arc::clone(&registry), cache)
            .with_offline_store(Arc::clone(&offline))
            .with_ttls(self.config.resolved_ttl, self.config.search_ttl);

        ValuationStack {
            market,
            resolver,
            registry,
            offline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Capability;
    use crate::ProviderId;

    #[test]
    fn mock_stack_registers_all_providers_plus_offline_store() {
        let stack = StackBuilder::new().with_mock_mode().build();

        assert_eq!(stack.registry().len(), 5);
        let ids: Vec<ProviderId> = stack
            .registry()
            .providers()
            .iter()
            .map(|guard| guard.id())
            .collect();
        assert!(ids.contains(&ProviderId::LocalStore));
    }

    #[test]
    fn disabled_providers_are_not_registered() {
        let stack = StackBuilder::new()
            .with_mock_mode()
            .with_ebay_enabled(false)
            .with_psa_enabled(false)
            .build();

        let ids: Vec<ProviderId> = stack
            .registry()
            .providers()
            .iter()
            .map(|guard| guard.id())
            .collect();
        assert!(!ids.contains(&ProviderId::Ebay));
        assert!(!ids.contains(&ProviderId::Psa));
        assert!(ids.contains(&ProviderId::CardLadder));
    }

    #[test]
    fn capability_introspection_drives_fan_out_membership() {
        let stack = StackBuilder::new().with_mock_mode().build();

        let sales: Vec<ProviderId> = stack
            .registry()
            .with_capability(Capability::Sales)
            .into_iter()
            .map(|guard| guard.id())
            .collect();
        assert_eq!(
            sales,
            vec![
                ProviderId::Ebay,
                ProviderId::SportsCardsPro,
                ProviderId::CardLadder
            ]
        );

        let population: Vec<ProviderId> = stack
            .registry()
            .with_capability(Capability::Population)
            .into_iter()
            .map(|guard| guard.id())
            .collect();
        assert_eq!(
            population,
            vec![ProviderId::Psa, ProviderId::SportsCardsPro]
        );
    }
}
