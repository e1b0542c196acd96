//! Core error types shared across the crate.

use thiserror::Error;

use crate::provider::ProviderError;
use crate::source::ProviderId;

/// Construction-time validation failure for domain value types.
///
/// Domain types are built through validating factories; invalid data never
/// reaches the aggregation layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("field '{field}' must not be empty")]
    EmptyField { field: &'static str },
    #[error("field '{field}' must not be negative")]
    NegativeValue { field: &'static str },
    #[error("field '{field}' must be a finite number")]
    NonFiniteValue { field: &'static str },
    #[error("year {year} is outside the plausible range {min}..={max}")]
    YearOutOfRange { year: u16, min: u16, max: u16 },
    #[error("confidence {value} exceeds the 0..=100 scale")]
    ConfidenceOutOfRange { value: u16 },
    #[error("price range min {min} exceeds max {max}")]
    InvalidPriceRange { min: f64, max: f64 },
    #[error("search query must not be empty")]
    EmptyQuery,
    #[error("request limit must be greater than zero")]
    ZeroLimit,
    #[error("card query must name at least one identity field")]
    EmptyCardQuery,
    #[error("match score {score} does not exceed the acceptance threshold {threshold}")]
    ScoreBelowThreshold { score: u32, threshold: u32 },
    #[error("'{value}' is not a valid RFC 3339 timestamp")]
    InvalidTimestamp { value: String },
}

/// One provider's failure inside a fan-out, kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub provider: ProviderId,
    pub error: ProviderError,
}

impl ProviderFailure {
    pub fn new(provider: ProviderId, error: ProviderError) -> Self {
        Self { provider, error }
    }
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

/// Failure of an aggregate operation as seen by the caller.
///
/// Individual provider failures are swallowed and logged at the fan-out
/// boundary; `Exhausted` is raised only when every fanned-out provider failed
/// and no cached value exists.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("data temporarily unavailable: all {} provider(s) failed", failures.len())]
    Exhausted { failures: Vec<ProviderFailure> },
    #[error("invalid aggregation input: {0}")]
    Invalid(#[from] ValidationError),
}

impl AggregationError {
    /// Providers that failed, in fan-out order. Empty for `Invalid`.
    pub fn failed_providers(&self) -> Vec<ProviderId> {
        match self {
            Self::Exhausted { failures } => failures.iter().map(|f| f.provider).collect(),
            Self::Invalid(_) => Vec::new(),
        }
    }
}
