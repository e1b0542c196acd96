use std::sync::Arc;

use serde::Deserialize;

use super::filter_catalog;
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, HttpResponse, NoopHttpClient};
use crate::provider::{
    validation_to_error, CandidateBatch, Capability, CapabilitySet, CardSearchRequest,
    PopulationRequest, Provider, ProviderError, SalesBatch, SalesRequest, ValidationRequest,
};
use crate::{
    CardAttributes, CardCandidate, PopulationReport, ProviderFuture, ProviderId, Sale,
    UtcDateTime, ValidationVerdict,
};

const BROWSE_ENDPOINT: &str = "https://api.ebay.com/buy/browse/v1/item_summary/search";

/// eBay sold-listing adapter: the widest sales feed and a title-derived card
/// search, behind the Browse API when a real transport is configured.
#[derive(Clone)]
pub struct EbayAdapter {
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
    use_real_api: bool,
}

impl Default for EbayAdapter {
    fn default() -> Self {
        let token = std::env::var("SLABWORTH_EBAY_API_KEY")
            .or_else(|_| std::env::var("EBAY_API_KEY"))
            .unwrap_or_else(|_| String::from("demo"));
        Self {
            http_client: Arc::new(NoopHttpClient),
            auth: HttpAuth::BearerToken(token),
            use_real_api: false,
        }
    }
}

impl EbayAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>, auth: HttpAuth) -> Self {
        let use_real_api = !http_client.is_mock();
        Self {
            http_client,
            auth,
            use_real_api,
        }
    }

    async fn execute_call(&self, request: HttpRequest) -> Result<HttpResponse, ProviderError> {
        let response = self.http_client.execute(request).await.map_err(|error| {
            if error.retryable() {
                ProviderError::network(format!("ebay transport error: {}", error.message()))
            } else {
                ProviderError::internal(format!("ebay transport error: {}", error.message()))
            }
        })?;

        if response.status == 429 {
            return Err(ProviderError::rate_limited(
                "ebay throttled the request (status 429)",
            ));
        }
        if !response.is_success() {
            return Err(ProviderError::network(format!(
                "ebay upstream returned status {}",
                response.status
            )));
        }

        Ok(response)
    }

    async fn fetch_real_sales(&self, req: &SalesRequest) -> Result<SalesBatch, ProviderError> {
        let mut query = req.query.search_text();
        if let Some(grade) = &req.grade {
            query.push(' ');
            query.push_str(grade);
        }

        let endpoint = format!(
            "{BROWSE_ENDPOINT}?q={}&filter=soldItemsOnly:true&limit={}",
            urlencoding::encode(&query),
            req.limit
        );
        let request = HttpRequest::get(endpoint).with_auth(&self.auth);
        let response = self.execute_call(request).await?;

        parse_browse_response(&response.body)
    }

    async fn fetch_fake_sales(&self, req: &SalesRequest) -> Result<SalesBatch, ProviderError> {
        let request = HttpRequest::get(BROWSE_ENDPOINT).with_auth(&self.auth);
        self.execute_call(request).await?;

        let text = req.query.search_text();
        let seed = text_seed(&format!("{text} {}", req.grade.as_deref().unwrap_or("any")));
        let now = UtcDateTime::now();
        let conditions = ["PSA 10", "PSA 9", "Raw"];

        let count = req.limit.min(8);
        let mut sales = Vec::with_capacity(count);
        for index in 0..count {
            let price = 40.0 + ((seed.wrapping_add(index as u64 * 7)) % 900) as f64 / 4.0;
            let occurred_at = now
                .days_before((index as i64) * 4 + 1)
                .map_err(validation_to_error)?;
            let condition = req
                .grade
                .clone()
                .unwrap_or_else(|| String::from(conditions[index % conditions.len()]));
            let listing_id = 110_000_000 + (seed % 800_000) + index as u64;

            let sale = Sale::new(
                price,
                occurred_at,
                ProviderId::Ebay,
                condition,
                format!("{text} sold listing"),
                Some(format!("https://www.ebay.com/itm/{listing_id}")),
            )
            .map_err(validation_to_error)?;
            sales.push(sale);
        }

        Ok(SalesBatch { sales })
    }

    async fn fetch_real_cards(
        &self,
        req: &CardSearchRequest,
    ) -> Result<CandidateBatch, ProviderError> {
        let endpoint = format!(
            "{BROWSE_ENDPOINT}?q={}&limit={}",
            urlencoding::encode(&req.query),
            req.limit
        );
        let request = HttpRequest::get(endpoint).with_auth(&self.auth);
        let response = self.execute_call(request).await?;

        let browse: EbayBrowseResponse = serde_json::from_str(&response.body)
            .map_err(|error| ProviderError::parse(format!("ebay browse response: {error}")))?;

        // Listing titles are the only identity signal eBay has; derive thin
        // candidates from them and let scoring sort out the rest.
        let candidates = browse
            .item_summaries
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| candidate_from_title(&item.title))
            .take(req.limit)
            .collect();

        Ok(CandidateBatch { candidates })
    }

    async fn fetch_fake_cards(
        &self,
        req: &CardSearchRequest,
    ) -> Result<CandidateBatch, ProviderError> {
        let request = HttpRequest::get(BROWSE_ENDPOINT).with_auth(&self.auth);
        self.execute_call(request).await?;

        let candidates = filter_catalog(ebay_catalog(), &req.query, req.limit);
        Ok(CandidateBatch { candidates })
    }
}

impl Provider for EbayAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Ebay
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new(true, false, true, false)
    }

    fn search_sales<'a>(&'a self, req: SalesRequest) -> ProviderFuture<'a, SalesBatch> {
        Box::pin(async move {
            if self.use_real_api {
                self.fetch_real_sales(&req).await
            } else {
                self.fetch_fake_sales(&req).await
            }
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
            if self.use_real_api {
                self.fetch_real_cards(&req).await
            } else {
                self.fetch_fake_cards(&req).await
            }
        })
    }

    fn validate<'a>(&'a self, req: ValidationRequest) -> ProviderFuture<'a, ValidationVerdict> {
        Box::pin(async move {
            let _ = req;
            Err(ProviderError::unsupported_capability(Capability::Validation))
        })
    }
}

fn parse_browse_response(body: &str) -> Result<SalesBatch, ProviderError> {
    let browse: EbayBrowseResponse = serde_json::from_str(body)
        .map_err(|error| ProviderError::parse(format!("ebay browse response: {error}")))?;

    let sales = browse
        .item_summaries
        .unwrap_or_default()
        .into_iter()
        .filter_map(|item| {
            let price: f64 = item.price.value.parse().ok()?;
            let occurred_at = item
                .item_end_date
                .as_deref()
                .and_then(|raw| UtcDateTime::parse(raw).ok())
                .unwrap_or_else(UtcDateTime::now);

            Sale::new(
                price,
                occurred_at,
                ProviderId::Ebay,
                item.condition.unwrap_or_else(|| String::from("Unspecified")),
                item.title,
                item.item_web_url,
            )
            .ok()
        })
        .collect();

    Ok(SalesBatch { sales })
}

/// Best-effort identity extraction from a listing title: a leading year and
/// the remainder as the player line.
fn candidate_from_title(title: &str) -> Option<CardCandidate> {
    let mut tokens = title.split_whitespace();
    let first = tokens.next()?;
    let year: Option<u16> = first.parse().ok().filter(|y| (1850..=2100).contains(y));

    let player: String = if year.is_some() {
        tokens.take(2).collect::<Vec<_>>().join(" ")
    } else {
        title.split_whitespace().take(2).collect::<Vec<_>>().join(" ")
    };
    if player.is_empty() {
        return None;
    }

    CardCandidate::new(player, year).ok()
}

fn ebay_catalog() -> Vec<CardCandidate> {
    vec![
        CardCandidate::new("Juan Soto", Some(2018))
            .expect("catalog entry is valid")
            .with_set("Topps Update")
            .with_card_number("US300")
            .with_manufacturer("Topps")
            .with_attributes(CardAttributes::rookie()),
        CardCandidate::new("Ken Griffey Jr.", Some(1989))
            .expect("catalog entry is valid")
            .with_set("Upper Deck")
            .with_card_number("1")
            .with_manufacturer("Upper Deck")
            .with_attributes(CardAttributes::rookie()),
        CardCandidate::new("Mike Trout", Some(2011))
            .expect("catalog entry is valid")
            .with_set("Topps Update")
            .with_card_number("US175")
            .with_manufacturer("Topps")
            .with_attributes(CardAttributes::rookie()),
        CardCandidate::new("Shohei Ohtani", Some(2018))
            .expect("catalog entry is valid")
            .with_set("Topps")
            .with_card_number("700")
            .with_manufacturer("Topps"),
        CardCandidate::new("Michael Jordan", Some(1986))
            .expect("catalog entry is valid")
            .with_set("Fleer")
            .with_card_number("57")
            .with_manufacturer("Fleer")
            .with_attributes(CardAttributes::rookie()),
    ]
}

// eBay Browse API response structures (the subset the adapter reads).
#[derive(Debug, Clone, Deserialize)]
struct EbayBrowseResponse {
    #[serde(rename = "itemSummaries")]
    item_summaries: Option<Vec<EbayItemSummary>>,
}

#[derive(Debug, Clone, Deserialize)]
struct EbayItemSummary {
    title: String,
    price: EbayPrice,
    #[serde(default)]
    condition: Option<String>,
    #[serde(rename = "itemWebUrl", default)]
    item_web_url: Option<String>,
    #[serde(rename = "itemEndDate", default)]
    item_end_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EbayPrice {
    value: String,
}

fn text_seed(text: &str) -> u64 {
    text.to_ascii_lowercase()
        .bytes()
        .fold(17_u64, |acc, byte| {
            acc.wrapping_mul(31).wrapping_add(byte as u64)
        })
}
