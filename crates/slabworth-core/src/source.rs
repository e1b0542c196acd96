use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Stable identifier for a registered data provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ProviderId {
    #[serde(rename = "ebay")]
    Ebay,
    #[serde(rename = "psa")]
    Psa,
    #[serde(rename = "sportscardspro")]
    SportsCardsPro,
    #[serde(rename = "cardladder")]
    CardLadder,
    #[serde(rename = "local_store")]
    LocalStore,
}

impl ProviderId {
    pub const ALL: [ProviderId; 5] = [
        Self::Ebay,
        Self::Psa,
        Self::SportsCardsPro,
        Self::CardLadder,
        Self::LocalStore,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ebay => "ebay",
            Self::Psa => "psa",
            Self::SportsCardsPro => "sportscardspro",
            Self::CardLadder => "cardladder",
            Self::LocalStore => "local_store",
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
