use std::collections::BTreeSet;

use serde::Serialize;
use tracing::warn;

use super::document::{DocumentAggregator, DocumentStore};
use super::error::AnalyticsError;
use super::source::StoreKind;
use super::structured::{StructuredAggregator, StructuredStore};
use super::town::TownKey;
use super::window::MonthWindow;

/// Filter options for callers building queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Catalog {
    /// Every town known to either store, in key order.
    pub towns: Vec<TownKey>,
    pub flat_types: Vec<String>,
    pub month_range: Option<MonthWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<StoreKind>,
}

pub async fn catalog<S, D>(
    structured: &StructuredAggregator<S>,
    documents: &DocumentAggregator<D>,
) -> Result<Catalog, AnalyticsError>
where
    S: StructuredStore + 'static,
    D: DocumentStore + 'static,
{
    let (towns, flat_types, month_range, reviewed) = tokio::join!(
        structured.towns(),
        structured.flat_types(),
        structured.month_bounds(),
        documents.towns()
    );

    let mut known: BTreeSet<TownKey> = towns?.into_iter().collect();
    let degraded = match reviewed {
        Ok(reviewed) => {
            known.extend(reviewed);
            None
        }
        Err(AnalyticsError::DataSourceUnavailable { store, source }) => {
            warn!(%store, error = %source, "catalog limited to structured towns");
            Some(store)
        }
        Err(other) => return Err(other),
    };

    Ok(Catalog {
        towns: known.into_iter().collect(),
        flat_types: flat_types?,
        month_range: month_range?,
        degraded,
    })
}
