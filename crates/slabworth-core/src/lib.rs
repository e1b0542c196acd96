//! # Slabworth Core
//!
//! Resilient multi-provider aggregation for collectible-card identity and
//! market value.
//!
//! ## Overview
//!
//! Several independent, unreliable services know something about a card:
//! sale comps, graded-population counts, checklist identities. This crate
//! fans a query out to every registered provider concurrently, isolates each
//! provider behind its own circuit breaker and retry policy, merges whatever
//! partial answers come back, memoizes the result, and pushes fresh
//! aggregates to subscribers. Losing providers degrades the answer; it never
//! fails the request unless every provider is down.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Provider adapters (eBay, PSA, SportsCardsPro, Card Ladder, offline store) |
//! | [`aggregator`] | Market-value aggregation and population merging |
//! | [`cache`] | TTL cache with single-flight compute |
//! | [`circuit_breaker`] | Per-provider failure isolation |
//! | [`config`] | Environment configuration and stack builder |
//! | [`domain`] | Validated domain models |
//! | [`error`] | Validation and aggregation error types |
//! | [`http_client`] | Transport abstraction |
//! | [`provider`] | Provider trait and request/response types |
//! | [`registry`] | Guarded provider set and fan-out |
//! | [`resolver`] | Card identity resolution |
//! | [`retry`] | Bounded retry with exponential backoff |
//! | [`source`] | Provider identifiers |
//! | [`subscription`] | Aggregate push delivery |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use slabworth_core::{CardQuery, StackBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stack = StackBuilder::new().with_real_clients().build();
//!
//!     let query = CardQuery::for_player("Juan Soto")
//!         .with_year(2018)
//!         .with_set("Topps Update");
//!
//!     let aggregate = stack.market.market_aggregate(&query, Some("PSA 10")).await?;
//!     println!(
//!         "avg ${:.2} across {} sources, trend {:?}",
//!         aggregate.average_price,
//!         aggregate.data_sources.len(),
//!         aggregate.trend
//!     );
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Failure model
//!
//! A single provider failure is retried inside its [`retry::RetryPolicy`],
//! counted by its [`circuit_breaker::CircuitBreaker`], logged, and then
//! skipped; the merge proceeds over the survivors. Only when every
//! fanned-out provider fails does the caller see
//! [`error::AggregationError::Exhausted`] — "data temporarily unavailable" —
//! and a cached answer pre-empts even that.

pub mod adapters;
pub mod aggregator;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod provider;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod source;
pub mod subscription;

// Re-export the surface most callers need at the crate root.

pub use adapters::{
    CardLadderAdapter, EbayAdapter, LocalStoreAdapter, PsaAdapter, SportsCardsProAdapter,
};

pub use aggregator::MarketAggregator;

pub use cache::{
    CacheStore, CARD_SEARCH_TTL, MARKET_AGGREGATE_TTL, POPULATION_TTL, RESOLVED_CARD_TTL,
};

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub use config::{StackBuilder, StackConfig, ValuationStack};

pub use domain::{
    distinguishing_features, parse_print_run, rarity_for_variant, CardAttributes, CardCandidate,
    CardQuery, MarketAggregate, PopulationReport, PriceRange, Rarity, ResolvedCard, Sale, Trend,
    UtcDateTime, ValidationVerdict,
};

pub use error::{AggregationError, ProviderFailure, ValidationError};

pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, NoopHttpClient,
    ReqwestHttpClient,
};

pub use provider::{
    CandidateBatch, Capability, CapabilitySet, CardSearchRequest, PopulationRequest, Provider,
    ProviderError, ProviderErrorKind, ProviderFuture, SalesBatch, SalesRequest, ValidationRequest,
};

pub use registry::{split_results, GuardedProvider, ProviderRegistry};

pub use resolver::{match_score, CardResolver};

pub use retry::{Backoff, RetryPolicy, RetryableError};

pub use source::ProviderId;

pub use subscription::{AggregateCallback, Subscription, SubscriptionHub};
