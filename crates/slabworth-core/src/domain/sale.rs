use serde::{Deserialize, Serialize};

use crate::{ProviderId, UtcDateTime, ValidationError};

/// One completed sale reported by a provider.
///
/// Immutable once produced; providers hand ownership to the aggregator and
/// never touch the value again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub price: f64,
    pub occurred_at: UtcDateTime,
    pub source: ProviderId,
    pub condition: String,
    pub title: String,
    pub url: Option<String>,
}

impl Sale {
    pub fn new(
        price: f64,
        occurred_at: UtcDateTime,
        source: ProviderId,
        condition: impl Into<String>,
        title: impl AsRef<str>,
        url: Option<String>,
    ) -> Result<Self, ValidationError> {
        validate_price("price", price)?;

        let title = title.as_ref().trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyField { field: "title" });
        }

        Ok(Self {
            price,
            occurred_at,
            source,
            condition: condition.into(),
            title: title.to_owned(),
            url,
        })
    }
}

pub(crate) fn validate_price(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_price() {
        let err = Sale::new(
            -10.0,
            UtcDateTime::now(),
            ProviderId::Ebay,
            "PSA 10",
            "2018 Topps Update Juan Soto",
            None,
        )
        .expect_err("must fail");
        assert!(matches!(err, ValidationError::NegativeValue { field: "price" }));
    }

    #[test]
    fn rejects_nan_price() {
        let err = Sale::new(
            f64::NAN,
            UtcDateTime::now(),
            ProviderId::Ebay,
            "Raw",
            "listing",
            None,
        )
        .expect_err("must fail");
        assert!(matches!(err, ValidationError::NonFiniteValue { field: "price" }));
    }

    #[test]
    fn trims_listing_title() {
        let sale = Sale::new(
            120.0,
            UtcDateTime::now(),
            ProviderId::CardLadder,
            "PSA 9",
            "  1989 Upper Deck Ken Griffey Jr. #1  ",
            Some(String::from("https://example.test/listing/1")),
        )
        .expect("valid sale");
        assert_eq!(sale.title, "1989 Upper Deck Ken Griffey Jr. #1");
    }
}
