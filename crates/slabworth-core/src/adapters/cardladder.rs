use std::sync::Arc;

use super::filter_catalog;
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, NoopHttpClient};
use crate::provider::{
    validation_to_error, CandidateBatch, Capability, CapabilitySet, CardSearchRequest,
    PopulationRequest, Provider, ProviderError, SalesBatch, SalesRequest, ValidationRequest,
};
use crate::{
    CardAttributes, CardCandidate, PopulationReport, ProviderFuture, ProviderId, Sale,
    UtcDateTime, ValidationVerdict,
};

const SALES_ENDPOINT: &str = "https://app.cardladder.com/api/sales";
const INDEX_ENDPOINT: &str = "https://app.cardladder.com/api/index";

/// Deterministic Card Ladder adapter: curated high-end sale comps, an indexed
/// card search, and an index-membership validation check.
#[derive(Clone)]
pub struct CardLadderAdapter {
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
}

impl Default for CardLadderAdapter {
    fn default() -> Self {
        let token = std::env::var("SLABWORTH_CARDLADDER_API_KEY")
            .or_else(|_| std::env::var("CARDLADDER_API_KEY"))
            .unwrap_or_else(|_| String::from("demo"));
        Self {
            http_client: Arc::new(NoopHttpClient),
            auth: HttpAuth::BearerToken(token),
        }
    }
}

impl CardLadderAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>, auth: HttpAuth) -> Self {
        Self { http_client, auth }
    }

    async fn execute_call(&self, endpoint: &str) -> Result<(), ProviderError> {
        let request = HttpRequest::get(endpoint).with_auth(&self.auth);
        let response = self.http_client.execute(request).await.map_err(|error| {
            if error.retryable() {
                ProviderError::network(format!("cardladder transport error: {}", error.message()))
            } else {
                ProviderError::internal(format!("cardladder transport error: {}", error.message()))
            }
        })?;

        if response.status == 429 {
            return Err(ProviderError::rate_limited(
                "cardladder throttled the request (status 429)",
            ));
        }
        if !response.is_success() {
            return Err(ProviderError::network(format!(
                "cardladder upstream returned status {}",
                response.status
            )));
        }

        Ok(())
    }
}

impl Provider for CardLadderAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::CardLadder
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new(true, false, true, true)
    }

    fn search_sales<'a>(&'a self, req: SalesRequest) -> ProviderFuture<'a, SalesBatch> {
        Box::pin(async move {
            self.execute_call(SALES_ENDPOINT).await?;

            let text = req.query.search_text();
            let seed = text_seed(&text);
            let now = UtcDateTime::now();

            // Curated index tracks fewer, higher-value comps.
            let count = req.limit.min(4);
            let mut sales = Vec::with_capacity(count);
            for index in 0..count {
                let price = 150.0 + (seed.wrapping_add(index as u64 * 19) % 2_000) as f64 / 4.0;
                let occurred_at = now
                    .days_before((index as i64) * 6 + 3)
                    .map_err(validation_to_error)?;
                let condition = req
                    .grade
                    .clone()
                    .unwrap_or_else(|| String::from("PSA 10"));

                let sale = Sale::new(
                    price,
                    occurred_at,
                    ProviderId::CardLadder,
                    condition,
                    format!("{text} index sale"),
                    Some(format!("https://app.cardladder.com/sale/{}", seed % 100_000 + index as u64)),
                )
                .map_err(validation_to_error)?;
                sales.push(sale);
            }

            Ok(SalesBatch { sales })
        })
    }

    fn population<'a>(&'a self, req: PopulationRequest) -> ProviderFuture<'a, PopulationReport> {
        Box::pin(async move {
            let _ = req;
            Err(ProviderError::unsupported_capability(Capability::Population))
        })
    }

    fn search_cards<'a>(&'a self, req: CardSearchRequest) -> ProviderFuture<'a, CandidateBatch> {
        Box::pin(async move {
            self.execute_call(INDEX_ENDPOINT).await?;

            let candidates = filter_catalog(cardladder_catalog(), &req.query, req.limit);
            Ok(CandidateBatch { candidates })
        })
    }

    fn validate<'a>(&'a self, req: ValidationRequest) -> ProviderFuture<'a, ValidationVerdict> {
        Box::pin(async move {
            self.execute_call(INDEX_ENDPOINT).await?;

            // Index membership needs a player line; year and set tighten it.
            let query = &req.query;
            let mut confidence: u8 = 60;
            let mut issues = Vec::new();
            let mut suggestions = Vec::new();

            if query.player.is_none() {
                confidence = 20;
                issues.push(String::from("player name required for index lookup"));
                suggestions.push(String::from("provide the player name from the card front"));
            } else {
                if query.year.is_some() {
                    confidence += 20;
                }
                if query.set_name.is_some() {
                    confidence += 15;
                }
            }

            ValidationVerdict::new(confidence >= 50, confidence.min(100), issues, suggestions)
                .map_err(|error| ProviderError::internal(error.to_string()))
        })
    }
}

fn cardladder_catalog() -> Vec<CardCandidate> {
    vec![
        CardCandidate::new("Juan Soto", Some(2018))
            .expect("catalog entry is valid")
            .with_set("Topps Update")
            .with_card_number("US300")
            .with_manufacturer("Topps")
            .with_attributes(CardAttributes::rookie()),
        CardCandidate::new("Mike Trout", Some(2011))
            .expect("catalog entry is valid")
            .with_set("Topps Update")
            .with_card_number("US175")
            .with_manufacturer("Topps")
            .with_variant("Gold /2011")
            .with_attributes(CardAttributes::rookie()),
        CardCandidate::new("Luka Doncic", Some(2018))
            .expect("catalog entry is valid")
            .with_set("Panini Prizm")
            .with_card_number("280")
            .with_manufacturer("Panini")
            .with_attributes(CardAttributes::rookie()),
        CardCandidate::new("Tom Brady", Some(2000))
            .expect("catalog entry is valid")
            .with_set("Playoff Contenders")
            .with_card_number("144")
            .with_manufacturer("Playoff")
            .with_attributes(CardAttributes::autograph()),
        CardCandidate::new("Victor Wembanyama", Some(2023))
            .expect("catalog entry is valid")
            .with_set("Panini Prizm")
            .with_card_number("136")
            .with_manufacturer("Panini")
            .with_attributes(CardAttributes::rookie()),
    ]
}

fn text_seed(text: &str) -> u64 {
    text.to_ascii_lowercase()
        .bytes()
        .fold(23_u64, |acc, byte| {
            acc.wrapping_mul(41).wrapping_add(byte as u64)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CardQuery;

    #[tokio::test]
    async fn curated_sales_are_fewer_and_pricier() {
        let adapter = CardLadderAdapter::default();
        let query = CardQuery::for_player("Luka Doncic").with_year(2018);
        let request = SalesRequest::new(query, Some(String::from("PSA 10")), 20)
            .expect("valid request");

        let batch = adapter.search_sales(request).await.expect("sales");
        assert_eq!(batch.sales.len(), 4);
        assert!(batch.sales.iter().all(|sale| sale.price >= 150.0));
        assert!(batch
            .sales
            .iter()
            .all(|sale| sale.source == ProviderId::CardLadder));
    }

    #[tokio::test]
    async fn index_search_finds_overlapping_and_unique_entries() {
        let adapter = CardLadderAdapter::default();

        let soto = adapter
            .search_cards(CardSearchRequest::new("Juan Soto 2018", 10).expect("valid request"))
            .await
            .expect("candidates");
        assert_eq!(soto.candidates.len(), 1);

        let wemby = adapter
            .search_cards(CardSearchRequest::new("Wembanyama", 10).expect("valid request"))
            .await
            .expect("candidates");
        assert_eq!(wemby.candidates.len(), 1);
        assert_eq!(wemby.candidates[0].set_name.as_deref(), Some("Panini Prizm"));
    }

    #[tokio::test]
    async fn validation_rewards_tighter_queries() {
        let adapter = CardLadderAdapter::default();

        let loose = adapter
            .validate(
                ValidationRequest::new(CardQuery::for_player("Tom Brady")).expect("valid request"),
            )
            .await
            .expect("verdict");
        assert_eq!(loose.confidence, 60);

        let tight = adapter
            .validate(
                ValidationRequest::new(
                    CardQuery::for_player("Tom Brady")
                        .with_year(2000)
                        .with_set("Playoff Contenders"),
                )
                .expect("valid request"),
            )
            .await
            .expect("verdict");
        assert_eq!(tight.confidence, 95);
        assert!(tight.is_valid);
    }
}
