use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::http_client::{HttpAuth, HttpClient, HttpRequest, HttpResponse, NoopHttpClient};
use crate::provider::{
    CandidateBatch, Capability, CapabilitySet, CardSearchRequest, PopulationRequest, Provider,
    ProviderError, SalesBatch, SalesRequest, ValidationRequest,
};
use crate::{
    CardQuery, PopulationReport, ProviderFuture, ProviderId, UtcDateTime, ValidationVerdict,
};

const POP_ENDPOINT: &str = "https://api.psacard.com/publicapi/pop";
const CERT_ENDPOINT: &str = "https://api.psacard.com/publicapi/cert";

/// PSA grading-service adapter: the authoritative population source, plus
/// checklist-driven card validation.
#[derive(Clone)]
pub struct PsaAdapter {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    use_real_api: bool,
}

impl Default for PsaAdapter {
    fn default() -> Self {
        let api_key = std::env::var("SLABWORTH_PSA_API_KEY")
            .or_else(|_| std::env::var("PSA_API_KEY"))
            .unwrap_or_else(|_| String::from("demo"));
        Self {
            http_client: Arc::new(NoopHttpClient),
            api_key,
            use_real_api: false,
        }
    }
}

impl PsaAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        let use_real_api = !http_client.is_mock();
        Self {
            http_client,
            api_key: api_key.into(),
            use_real_api,
        }
    }

    fn auth(&self) -> HttpAuth {
        HttpAuth::Header {
            name: String::from("x-api-key"),
            value: self.api_key.clone(),
        }
    }

    async fn execute_call(&self, request: HttpRequest) -> Result<HttpResponse, ProviderError> {
        let response = self.http_client.execute(request).await.map_err(|error| {
            if error.retryable() {
                ProviderError::network(format!("psa transport error: {}", error.message()))
            } else {
                ProviderError::internal(format!("psa transport error: {}", error.message()))
            }
        })?;

        if response.status == 429 {
            return Err(ProviderError::rate_limited(
                "psa throttled the request (status 429)",
            ));
        }
        if !response.is_success() {
            return Err(ProviderError::network(format!(
                "psa upstream returned status {}",
                response.status
            )));
        }

        Ok(response)
    }

    async fn fetch_real_population(
        &self,
        req: &PopulationRequest,
    ) -> Result<PopulationReport, ProviderError> {
        let endpoint = format!(
            "{POP_ENDPOINT}?query={}",
            urlencoding::encode(&req.query.search_text())
        );
        let request = HttpRequest::get(endpoint).with_auth(&self.auth());
        let response = self.execute_call(request).await?;

        let parsed: PsaPopulationResponse = serde_json::from_str(&response.body)
            .map_err(|error| ProviderError::parse(format!("psa population response: {error}")))?;

        let by_grade: BTreeMap<String, u64> = parsed
            .populations
            .into_iter()
            .map(|entry| (entry.grade, entry.count))
            .collect();

        Ok(PopulationReport::single(
            parsed.total,
            by_grade,
            ProviderId::Psa,
            UtcDateTime::now(),
        ))
    }

    async fn fetch_fake_population(
        &self,
        req: &PopulationRequest,
    ) -> Result<PopulationReport, ProviderError> {
        let request = HttpRequest::get(POP_ENDPOINT).with_auth(&self.auth());
        self.execute_call(request).await?;

        let seed = text_seed(&req.query.search_text());
        let mut by_grade = BTreeMap::new();
        let mut total = 0;
        for (index, grade) in ["10", "9", "8", "7", "6"].iter().enumerate() {
            let count = 25 + seed.wrapping_add((index as u64 + 1) * 131) % 475;
            by_grade.insert(String::from(*grade), count);
            total += count;
        }

        Ok(PopulationReport::single(
            total,
            by_grade,
            ProviderId::Psa,
            UtcDateTime::now(),
        ))
    }

    /// Verdict derived from how completely the query pins down a checklist
    /// entry; works identically against the mock transport.
    async fn build_verdict(&self, query: &CardQuery) -> Result<ValidationVerdict, ProviderError> {
        let request = HttpRequest::get(CERT_ENDPOINT).with_auth(&self.auth());
        self.execute_call(request).await?;

        let mut confidence: i32 = 95;
        let mut issues = Vec::new();
        let mut suggestions = Vec::new();

        if query.year.is_none() {
            confidence -= 15;
            issues.push(String::from("missing release year"));
            suggestions.push(String::from("add the release year printed on the card back"));
        }
        if query.set_name.is_none() {
            confidence -= 15;
            issues.push(String::from("missing set name"));
            suggestions.push(String::from("identify the set from the card design"));
        }
        if query.card_number.is_none() {
            confidence -= 10;
            issues.push(String::from("missing card number"));
            suggestions.push(String::from(
                "check the card number against the set checklist",
            ));
        }

        let confidence = confidence.clamp(0, 100) as u8;
        ValidationVerdict::new(confidence >= 50, confidence, issues, suggestions)
            .map_err(|error| ProviderError::internal(error.to_string()))
    }
}

impl Provider for PsaAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Psa
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new(false, true, false, true)
    }

    fn search_sales<'a>(&'a self, req: SalesRequest) -> ProviderFuture<'a, SalesBatch> {
        Box::pin(async move {
            let _ = req;
            Err(ProviderError::unsupported_capability(Capability::Sales))
        })
    }

    fn population<'a>(&'a self, req: PopulationRequest) -> ProviderFuture<'a, PopulationReport> {
        Box::pin(async move {
            if self.use_real_api {
                self.fetch_real_population(&req).await
            } else {
                self.fetch_fake_population(&req).await
            }
        })
    }

    fn search_cards<'a>(&'a self, req: CardSearchRequest) -> ProviderFuture<'a, CandidateBatch> {
        Box::pin(async move {
            let _ = req;
            Err(ProviderError::unsupported_capability(Capability::CardSearch))
        })
    }

    fn validate<'a>(&'a self, req: ValidationRequest) -> ProviderFuture<'a, ValidationVerdict> {
        Box::pin(async move { self.build_verdict(&req.query).await })
    }
}

// PSA population API response structures.
#[derive(Debug, Clone, Deserialize)]
struct PsaPopulationResponse {
    total: u64,
    #[serde(default)]
    populations: Vec<PsaGradePopulation>,
}

#[derive(Debug, Clone, Deserialize)]
struct PsaGradePopulation {
    grade: String,
    count: u64,
}

fn text_seed(text: &str) -> u64 {
    text.to_ascii_lowercase()
        .bytes()
        .fold(11_u64, |acc, byte| {
            acc.wrapping_mul(37).wrapping_add(byte as u64)
        })
}
