use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::AnalyticsError;

/// Normalized town name: the only key shared by the structured and document stores.
///
/// Every write path into either store and every read key goes through
/// [`TownKey::parse`], so `" ang  mo kio"` and `"ANG MO KIO"` meet on the same key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TownKey(String);

impl TownKey {
    pub fn parse(raw: &str) -> Result<Self, AnalyticsError> {
        let normalized = normalize_town(raw);
        if normalized.is_empty() {
            return Err(AnalyticsError::invalid("town name must not be blank"));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Trims, collapses inner whitespace and upper-cases a town name.
pub fn normalize_town(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

impl fmt::Display for TownKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TownKey {
    type Error = AnalyticsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TownKey> for String {
    fn from(value: TownKey) -> Self {
        value.0
    }
}
