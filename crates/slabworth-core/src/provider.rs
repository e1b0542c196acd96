//! Provider trait and request/response types.
//!
//! This module defines the contract every external data source implements,
//! along with the request payloads for each capability.
//!
//! # Capabilities
//!
//! | Capability | Request | Response |
//! |------------|---------|----------|
//! | Sales | [`SalesRequest`] | [`SalesBatch`] |
//! | Population | [`PopulationRequest`] | [`PopulationReport`] |
//! | CardSearch | [`CardSearchRequest`] | [`CandidateBatch`] |
//! | Validation | [`ValidationRequest`] | [`ValidationVerdict`] |
//!
//! A provider implements only the capabilities it supports; the aggregation
//! layer introspects [`Provider::capabilities`] and never calls an
//! unsupported operation. Calling one anyway returns
//! [`ProviderError::unsupported_capability`] rather than panicking.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::retry::RetryableError;
use crate::{
    CardCandidate, CardQuery, PopulationReport, ProviderId, Sale, ValidationError,
    ValidationVerdict,
};

/// One capability a provider may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Sales,
    Population,
    CardSearch,
    Validation,
}

impl Capability {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::Population => "population",
            Self::CardSearch => "card_search",
            Self::Validation => "validation",
        }
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported capability matrix for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub sales: bool,
    pub population: bool,
    pub card_search: bool,
    pub validation: bool,
}

impl CapabilitySet {
    pub const fn new(sales: bool, population: bool, card_search: bool, validation: bool) -> Self {
        Self {
            sales,
            population,
            card_search,
            validation,
        }
    }

    pub const fn supports(self, capability: Capability) -> bool {
        match capability {
            Capability::Sales => self.sales,
            Capability::Population => self.population,
            Capability::CardSearch => self.card_search,
            Capability::Validation => self.validation,
        }
    }

    pub fn supported(self) -> Vec<Capability> {
        [
            Capability::Sales,
            Capability::Population,
            Capability::CardSearch,
            Capability::Validation,
        ]
        .into_iter()
        .filter(|capability| self.supports(*capability))
        .collect()
    }
}

/// Provider-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Transport failure reaching the upstream service.
    Network,
    /// The upstream responded with something we could not decode.
    Parse,
    /// The upstream throttled us.
    RateLimited,
    /// Fast-fail from an open circuit breaker; no call was attempted.
    CircuitOpen,
    UnsupportedCapability,
    InvalidRequest,
    Internal,
}

/// Structured error from one provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: String,
    retryable: bool,
}

impl ProviderError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Network,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Parse,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn circuit_open(provider: ProviderId) -> Self {
        Self {
            kind: ProviderErrorKind::CircuitOpen,
            message: format!("circuit for provider '{provider}' is open; call skipped"),
            retryable: false,
        }
    }

    pub fn unsupported_capability(capability: Capability) -> Self {
        Self {
            kind: ProviderErrorKind::UnsupportedCapability,
            message: format!("capability '{capability}' is not supported by this provider"),
            retryable: false,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            ProviderErrorKind::Network => "provider.network",
            ProviderErrorKind::Parse => "provider.parse",
            ProviderErrorKind::RateLimited => "provider.rate_limited",
            ProviderErrorKind::CircuitOpen => "provider.circuit_open",
            ProviderErrorKind::UnsupportedCapability => "provider.unsupported_capability",
            ProviderErrorKind::InvalidRequest => "provider.invalid_request",
            ProviderErrorKind::Internal => "provider.internal",
        }
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for ProviderError {}

impl RetryableError for ProviderError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

pub(crate) fn validation_to_error(error: ValidationError) -> ProviderError {
    ProviderError::internal(error.to_string())
}

/// Request for completed sales of one card, optionally grade-filtered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesRequest {
    pub query: CardQuery,
    pub grade: Option<String>,
    pub limit: usize,
}

impl SalesRequest {
    pub fn new(
        query: CardQuery,
        grade: Option<String>,
        limit: usize,
    ) -> Result<Self, ValidationError> {
        if query.is_empty() {
            return Err(ValidationError::EmptyCardQuery);
        }
        if limit == 0 {
            return Err(ValidationError::ZeroLimit);
        }
        Ok(Self {
            query,
            grade,
            limit,
        })
    }
}

/// Request for a card's graded-population report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulationRequest {
    pub query: CardQuery,
}

impl PopulationRequest {
    pub fn new(query: CardQuery) -> Result<Self, ValidationError> {
        if query.is_empty() {
            return Err(ValidationError::EmptyCardQuery);
        }
        Ok(Self { query })
    }
}

/// Free-text card search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardSearchRequest {
    pub query: String,
    pub limit: usize,
}

impl CardSearchRequest {
    pub fn new(query: impl Into<String>, limit: usize) -> Result<Self, ValidationError> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(ValidationError::EmptyQuery);
        }
        if limit == 0 {
            return Err(ValidationError::ZeroLimit);
        }
        Ok(Self { query, limit })
    }
}

/// Request to sanity-check a described card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRequest {
    pub query: CardQuery,
}

impl ValidationRequest {
    pub fn new(query: CardQuery) -> Result<Self, ValidationError> {
        if query.is_empty() {
            return Err(ValidationError::EmptyCardQuery);
        }
        Ok(Self { query })
    }
}

/// Sales returned by one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesBatch {
    pub sales: Vec<Sale>,
}

/// Identity candidates returned by one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateBatch {
    pub candidates: Vec<CardCandidate>,
}

/// Boxed future returned by every provider operation.
pub type ProviderFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Contract implemented by every external data source.
///
/// Implementations must be `Send + Sync`, side-effect-free with respect to
/// other providers, and must hand full ownership of returned values to the
/// caller. Methods return boxed futures to keep the trait object-safe.
pub trait Provider: Send + Sync {
    /// Stable provider identifier.
    fn id(&self) -> ProviderId;

    /// Which operations this provider supports.
    fn capabilities(&self) -> CapabilitySet;

    /// Completed sales matching the query, newest data the provider has.
    fn search_sales<'a>(&'a self, req: SalesRequest) -> ProviderFuture<'a, SalesBatch>;

    /// Graded-population counts for the queried card.
    fn population<'a>(&'a self, req: PopulationRequest) -> ProviderFuture<'a, PopulationReport>;

    /// Identity candidates for a free-text query.
    fn search_cards<'a>(&'a self, req: CardSearchRequest) -> ProviderFuture<'a, CandidateBatch>;

    /// Plausibility verdict for a described card.
    fn validate<'a>(&'a self, req: ValidationRequest) -> ProviderFuture<'a, ValidationVerdict>;
}
