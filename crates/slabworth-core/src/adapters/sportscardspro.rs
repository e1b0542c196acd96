use std::collections::BTreeMap;
use std::sync::Arc;

use crate::http_client::{HttpClient, HttpRequest, NoopHttpClient};
use crate::provider::{
    validation_to_error, CandidateBatch, Capability, CapabilitySet, CardSearchRequest,
    PopulationRequest, Provider, ProviderError, SalesBatch, SalesRequest, ValidationRequest,
};
use crate::{
    PopulationReport, ProviderFuture, ProviderId, Sale, UtcDateTime, ValidationVerdict,
};

const PRICES_ENDPOINT: &str = "https://www.sportscardspro.com/api/prices";
const POP_ENDPOINT: &str = "https://www.sportscardspro.com/api/population";

/// Deterministic SportsCardsPro adapter for sale comps and aggregated
/// population counts.
#[derive(Clone)]
pub struct SportsCardsProAdapter {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
}

impl Default for SportsCardsProAdapter {
    fn default() -> Self {
        let api_key = std::env::var("SLABWORTH_SCP_API_KEY")
            .or_else(|_| std::env::var("SPORTSCARDSPRO_API_KEY"))
            .unwrap_or_else(|_| String::from("demo"));
        Self {
            http_client: Arc::new(NoopHttpClient),
            api_key,
        }
    }
}

impl SportsCardsProAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
        }
    }

    async fn execute_call(&self, endpoint: &str) -> Result<(), ProviderError> {
        let url = format!("{endpoint}?api_key={}", urlencoding::encode(&self.api_key));
        let response = self
            .http_client
            .execute(HttpRequest::get(url))
            .await
            .map_err(|error| {
                if error.retryable() {
                    ProviderError::network(format!(
                        "sportscardspro transport error: {}",
                        error.message()
                    ))
                } else {
                    ProviderError::internal(format!(
                        "sportscardspro transport error: {}",
                        error.message()
                    ))
                }
            })?;

        if response.status == 429 {
            return Err(ProviderError::rate_limited(
                "sportscardspro throttled the request (status 429)",
            ));
        }
        if !response.is_success() {
            return Err(ProviderError::network(format!(
                "sportscardspro upstream returned status {}",
                response.status
            )));
        }

        Ok(())
    }
}

impl Provider for SportsCardsProAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::SportsCardsPro
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new(true, true, false, false)
    }

    fn search_sales<'a>(&'a self, req: SalesRequest) -> ProviderFuture<'a, SalesBatch> {
        Box::pin(async move {
            self.execute_call(PRICES_ENDPOINT).await?;

            let text = req.query.search_text();
            let seed = text_seed(&text);
            let now = UtcDateTime::now();

            let count = req.limit.min(6);
            let mut sales = Vec::with_capacity(count);
            for index in 0..count {
                let payload = ScpSalePayload::from_seed(seed, index, &text, req.grade.as_deref());
                sales.push(payload.normalize(now)?);
            }

            Ok(SalesBatch { sales })
        })
    }

    fn population<'a>(&'a self, req: PopulationRequest) -> ProviderFuture<'a, PopulationReport> {
        Box::pin(async move {
            self.execute_call(POP_ENDPOINT).await?;

            // Aggregated from scraped sources, so counts trail the grading
            // services and skew toward high grades.
            let seed = text_seed(&req.query.search_text());
            let mut by_grade = BTreeMap::new();
            let mut total = 0;
            for (index, grade) in ["10", "9", "8"].iter().enumerate() {
                let count = 10 + seed.wrapping_add((index as u64 + 1) * 97) % 400;
                by_grade.insert(String::from(*grade), count);
                total += count;
            }

            Ok(PopulationReport::single(
                total,
                by_grade,
                ProviderId::SportsCardsPro,
                UtcDateTime::now(),
            ))
        })
    }

    fn search_cards<'a>(&'a self, req: CardSearchRequest) -> ProviderFuture<'a, CandidateBatch> {
        Box::pin(async move {
            let _ = req;
            Err(ProviderError::unsupported_capability(Capability::CardSearch))
        })
    }

    fn validate<'a>(&'a self, req: ValidationRequest) -> ProviderFuture<'a, ValidationVerdict> {
        Box::pin(async move {
            let _ = req;
            Err(ProviderError::unsupported_capability(Capability::Validation))
        })
    }
}

#[derive(Debug, Clone)]
struct ScpSalePayload {
    price: f64,
    days_ago: i64,
    condition: String,
    title: String,
}

impl ScpSalePayload {
    fn from_seed(seed: u64, index: usize, text: &str, grade: Option<&str>) -> Self {
        let price = 25.0 + (seed.wrapping_add(index as u64 * 13) % 1_200) as f64 / 5.0;
        let condition = grade
            .map(str::to_owned)
            .unwrap_or_else(|| String::from("Ungraded"));
        Self {
            price,
            days_ago: (index as i64) * 3 + 2,
            condition,
            title: format!("{text} comp"),
        }
    }

    fn normalize(self, now: UtcDateTime) -> Result<Sale, ProviderError> {
        let occurred_at = now.days_before(self.days_ago).map_err(validation_to_error)?;
        Sale::new(
            self.price,
            occurred_at,
            ProviderId::SportsCardsPro,
            self.condition,
            self.title,
            None,
        )
        .map_err(validation_to_error)
    }
}

fn text_seed(text: &str) -> u64 {
    text.to_ascii_lowercase().bytes().fold(7_u64, |acc, byte| {
        acc.wrapping_mul(43).wrapping_add(byte as u64)
    })
}
