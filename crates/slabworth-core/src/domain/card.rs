use serde::{Deserialize, Serialize};

use crate::{ProviderId, ValidationError};

const MIN_CARD_YEAR: u16 = 1850;
// Release years can run one ahead of the calendar for preview sets.
const MAX_CARD_YEAR: u16 = 2100;

fn validate_year(year: u16) -> Result<u16, ValidationError> {
    if !(MIN_CARD_YEAR..=MAX_CARD_YEAR).contains(&year) {
        return Err(ValidationError::YearOutOfRange {
            year,
            min: MIN_CARD_YEAR,
            max: MAX_CARD_YEAR,
        });
    }
    Ok(year)
}

fn validate_non_empty(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(trimmed.to_owned())
}

/// Boolean/typed card attributes that refine an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardAttributes {
    pub rookie: bool,
    pub autograph: bool,
    pub patch: bool,
    pub serial_number: Option<String>,
}

impl CardAttributes {
    pub fn rookie() -> Self {
        Self {
            rookie: true,
            ..Self::default()
        }
    }

    pub fn autograph() -> Self {
        Self {
            autograph: true,
            ..Self::default()
        }
    }

    /// True when any attribute is set.
    pub fn any(&self) -> bool {
        self.rookie || self.autograph || self.patch || self.serial_number.is_some()
    }
}

/// Partial card identity supplied by a caller.
///
/// Any subset of fields may be present; requests validate that at least one
/// identity field is named before a query fans out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardQuery {
    pub player: Option<String>,
    pub year: Option<u16>,
    pub set_name: Option<String>,
    pub card_number: Option<String>,
    pub manufacturer: Option<String>,
    pub attributes: CardAttributes,
}

impl CardQuery {
    pub fn for_player(player: impl Into<String>) -> Self {
        Self {
            player: Some(player.into()),
            ..Self::default()
        }
    }

    pub fn with_year(mut self, year: u16) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_set(mut self, set_name: impl Into<String>) -> Self {
        self.set_name = Some(set_name.into());
        self
    }

    pub fn with_card_number(mut self, card_number: impl Into<String>) -> Self {
        self.card_number = Some(card_number.into());
        self
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn with_attributes(mut self, attributes: CardAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// True when no identity field is present.
    pub fn is_empty(&self) -> bool {
        self.player.is_none()
            && self.year.is_none()
            && self.set_name.is_none()
            && self.card_number.is_none()
            && self.manufacturer.is_none()
    }

    /// Free-text rendition used when querying text-indexed providers.
    pub fn search_text(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(5);
        if let Some(year) = self.year {
            parts.push(year.to_string());
        }
        if let Some(set_name) = &self.set_name {
            parts.push(set_name.clone());
        }
        if let Some(player) = &self.player {
            parts.push(player.clone());
        }
        if let Some(card_number) = &self.card_number {
            parts.push(format!("#{card_number}"));
        }
        if let Some(manufacturer) = &self.manufacturer {
            parts.push(manufacturer.clone());
        }
        parts.join(" ")
    }

    /// Normalized memoization key over (player, year, set, number, grade).
    pub fn cache_key(&self, grade: Option<&str>) -> String {
        fn segment(value: Option<&str>) -> String {
            value
                .map(|v| v.trim().to_ascii_lowercase().replace(char::is_whitespace, "-"))
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| String::from("-"))
        }

        format!(
            "{}:{}:{}:{}:{}",
            segment(self.player.as_deref()),
            self.year.map(|y| y.to_string()).unwrap_or_else(|| String::from("-")),
            segment(self.set_name.as_deref()),
            segment(self.card_number.as_deref()),
            segment(grade),
        )
    }
}

/// One candidate identity returned by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardCandidate {
    pub player: String,
    pub year: Option<u16>,
    pub set_name: Option<String>,
    pub card_number: Option<String>,
    pub manufacturer: Option<String>,
    pub variant: Option<String>,
    pub attributes: CardAttributes,
}

impl CardCandidate {
    pub fn new(player: impl AsRef<str>, year: Option<u16>) -> Result<Self, ValidationError> {
        Ok(Self {
            player: validate_non_empty("player", player.as_ref())?,
            year: year.map(validate_year).transpose()?,
            set_name: None,
            card_number: None,
            manufacturer: None,
            variant: None,
            attributes: CardAttributes::default(),
        })
    }

    pub fn with_set(mut self, set_name: impl Into<String>) -> Self {
        self.set_name = Some(set_name.into());
        self
    }

    pub fn with_card_number(mut self, card_number: impl Into<String>) -> Self {
        self.card_number = Some(card_number.into());
        self
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    pub fn with_attributes(mut self, attributes: CardAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Composite dedup key over (player, year, set, number), case-insensitive.
    pub fn composite_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.player.trim().to_ascii_lowercase(),
            self.year.map(|y| y.to_string()).unwrap_or_default(),
            self.set_name
                .as_deref()
                .map(|s| s.trim().to_ascii_lowercase())
                .unwrap_or_default(),
            self.card_number
                .as_deref()
                .map(|s| s.trim().to_ascii_lowercase())
                .unwrap_or_default(),
        )
    }
}

/// Accepted best-match identity.
///
/// Can only be constructed through [`ResolvedCard::accept`], which enforces
/// the acceptance threshold, so a resolved card below the bar is
/// unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCard {
    pub player: String,
    pub year: Option<u16>,
    pub set_name: Option<String>,
    pub card_number: Option<String>,
    pub manufacturer: Option<String>,
    pub variant: Option<String>,
    pub attributes: CardAttributes,
    pub match_score: u32,
    pub resolved_from: ProviderId,
}

impl ResolvedCard {
    /// A candidate is accepted only when more than one strong signal matched.
    pub const ACCEPT_THRESHOLD: u32 = 10;

    pub fn accept(
        candidate: CardCandidate,
        match_score: u32,
        resolved_from: ProviderId,
    ) -> Result<Self, ValidationError> {
        if match_score <= Self::ACCEPT_THRESHOLD {
            return Err(ValidationError::ScoreBelowThreshold {
                score: match_score,
                threshold: Self::ACCEPT_THRESHOLD,
            });
        }

        Ok(Self {
            player: candidate.player,
            year: candidate.year,
            set_name: candidate.set_name,
            card_number: candidate.card_number,
            manufacturer: candidate.manufacturer,
            variant: candidate.variant,
            attributes: candidate.attributes,
            match_score,
            resolved_from,
        })
    }

    /// Re-render the identity as a candidate, e.g. for offline indexing.
    pub fn to_candidate(&self) -> CardCandidate {
        CardCandidate {
            player: self.player.clone(),
            year: self.year,
            set_name: self.set_name.clone(),
            card_number: self.card_number.clone(),
            manufacturer: self.manufacturer.clone(),
            variant: self.variant.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

/// One provider's verdict on whether a described card is plausible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub is_valid: bool,
    pub confidence: u8,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

impl ValidationVerdict {
    pub fn new(
        is_valid: bool,
        confidence: u8,
        issues: Vec<String>,
        suggestions: Vec<String>,
    ) -> Result<Self, ValidationError> {
        if confidence > 100 {
            return Err(ValidationError::ConfidenceOutOfRange {
                value: u16::from(confidence),
            });
        }
        Ok(Self {
            is_valid,
            confidence,
            issues,
            suggestions,
        })
    }
}
