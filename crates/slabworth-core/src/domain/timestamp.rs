use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::ValidationError;

const MIN_YEAR: i32 = 1850;
const MAX_YEAR: i32 = 9999;

/// UTC timestamp with RFC 3339 serde representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Parse an RFC 3339 timestamp, normalizing to UTC.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let parsed =
            OffsetDateTime::parse(input, &Rfc3339).map_err(|_| ValidationError::InvalidTimestamp {
                value: input.to_owned(),
            })?;
        Self::from_offset_datetime(parsed.to_offset(UtcOffset::UTC))
    }

    pub fn from_offset_datetime(value: OffsetDateTime) -> Result<Self, ValidationError> {
        let year = value.year();
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(ValidationError::InvalidTimestamp {
                value: format!("year {year} out of range"),
            });
        }
        Ok(Self(value.to_offset(UtcOffset::UTC)))
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    /// Whole days between this timestamp and a later one.
    pub fn whole_days_until(self, later: Self) -> i64 {
        (later.0 - self.0).whole_days()
    }

    /// Convenience for synthesizing historical data points.
    pub fn days_before(self, days: i64) -> Result<Self, ValidationError> {
        Self::from_offset_datetime(self.0 - Duration::days(days))
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let formatted = self
            .0
            .format(&Rfc3339)
            .unwrap_or_else(|_| String::from("invalid-timestamp"));
        f.write_str(&formatted)
    }
}

impl TryFrom<String> for UtcDateTime {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UtcDateTime> for String {
    fn from(value: UtcDateTime) -> Self {
        value.to_string()
    }
}
