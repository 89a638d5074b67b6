//! Read side of the relational store: resale prices grouped by town.

mod memory;
mod trend;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::error::AnalyticsError;
use super::source::{guarded, SourceError, StoreKind};
use super::stats::{mean, PriceBand};
use super::town::TownKey;
use super::window::{MonthWindow, YearMonth};

pub use memory::{
    Flat, FlatId, InMemoryStructuredStore, NewFlat, NewTransaction, Transaction, TransactionId,
};
pub use trend::{monthly_trend, MonthlyPricePoint, PriceTrend, TrendBreakdown};

/// Filters for a grouped price query.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuery {
    pub window: MonthWindow,
    pub town: Option<TownKey>,
    pub flat_type: Option<String>,
}

impl PriceQuery {
    pub fn all_towns(window: MonthWindow) -> Self {
        Self {
            window,
            town: None,
            flat_type: None,
        }
    }

    pub fn with_flat_type(mut self, flat_type: Option<String>) -> Self {
        self.flat_type = flat_type
            .map(|value| value.trim().to_uppercase())
            .filter(|value| !value.is_empty());
        self
    }

    pub fn matches_flat_type(&self, flat_type: &str) -> bool {
        match &self.flat_type {
            Some(wanted) => wanted.eq_ignore_ascii_case(flat_type.trim()),
            None => true,
        }
    }
}

/// One priced transaction as seen by the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceObservation {
    pub town: TownKey,
    pub flat_type: String,
    pub month: YearMonth,
    pub price: f64,
    pub floor_area_sqm: f64,
}

/// Read contract of the structured store. Reduction happens client-side in
/// [`StructuredAggregator`], so adapters only filter rows.
#[async_trait]
pub trait StructuredStore: Send + Sync {
    async fn price_observations(
        &self,
        query: &PriceQuery,
    ) -> Result<Vec<PriceObservation>, SourceError>;

    async fn towns(&self) -> Result<Vec<TownKey>, SourceError>;

    async fn flat_types(&self) -> Result<Vec<String>, SourceError>;

    /// Earliest and latest transaction month, `None` when the store is empty.
    async fn month_bounds(&self) -> Result<Option<MonthWindow>, SourceError>;
}

/// Per-town price summary. Only produced for towns with at least one transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TownPriceSummary {
    pub town: TownKey,
    pub transaction_count: usize,
    pub median_price: f64,
    pub p25_price: f64,
    pub p75_price: f64,
    /// `None` when no transaction in the group carries a positive floor area.
    pub avg_price_per_sqm: Option<f64>,
}

/// Groups observations by town key; towns come back in key order.
pub fn summarize_observations(observations: Vec<PriceObservation>) -> Vec<TownPriceSummary> {
    let mut grouped: BTreeMap<TownKey, Vec<PriceObservation>> = BTreeMap::new();
    for observation in observations {
        grouped
            .entry(observation.town.clone())
            .or_default()
            .push(observation);
    }

    grouped
        .into_iter()
        .filter_map(|(town, rows)| {
            let per_sqm: Vec<f64> = rows
                .iter()
                .filter(|row| row.floor_area_sqm > 0.0)
                .map(|row| row.price / row.floor_area_sqm)
                .collect();
            let transaction_count = rows.len();
            let band = PriceBand::from_unsorted(rows.into_iter().map(|row| row.price).collect())?;

            Some(TownPriceSummary {
                town,
                transaction_count,
                median_price: band.median,
                p25_price: band.p25,
                p75_price: band.p75,
                avg_price_per_sqm: mean(&per_sqm),
            })
        })
        .collect()
}

/// Market-wide figures for the overview tiles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketPulse {
    pub transactions_this_month: usize,
    pub average_price: Option<f64>,
}

pub struct StructuredAggregator<S> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S> Clone for StructuredAggregator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            timeout: self.timeout,
        }
    }
}

impl<S> StructuredAggregator<S>
where
    S: StructuredStore + 'static,
{
    pub fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn summarize(
        &self,
        query: &PriceQuery,
    ) -> Result<Vec<TownPriceSummary>, AnalyticsError> {
        let observations = self.read(self.store.price_observations(query)).await?;
        Ok(summarize_observations(observations))
    }

    /// Summary for one town; `Ok(None)` when it had no transactions in the window.
    pub async fn town_summary(
        &self,
        town: &TownKey,
        window: MonthWindow,
        flat_type: Option<String>,
    ) -> Result<Option<TownPriceSummary>, AnalyticsError> {
        let query = PriceQuery {
            window,
            town: Some(town.clone()),
            flat_type: None,
        }
        .with_flat_type(flat_type);

        let summaries = self.summarize(&query).await?;
        Ok(summaries.into_iter().find(|summary| &summary.town == town))
    }

    /// Month series for the trend charts, optionally split by town or flat type.
    pub async fn monthly_trend(
        &self,
        query: &PriceQuery,
        breakdown: TrendBreakdown,
    ) -> Result<PriceTrend, AnalyticsError> {
        let observations = self.read(self.store.price_observations(query)).await?;
        Ok(PriceTrend {
            window: query.window,
            town: query.town.clone(),
            flat_type: query.flat_type.clone(),
            breakdown,
            points: monthly_trend(observations, query.window, breakdown),
        })
    }

    /// Both store round trips share one deadline.
    pub async fn market_pulse(&self, as_of: YearMonth) -> Result<MarketPulse, AnalyticsError> {
        let observations = self
            .read(async {
                match self.store.month_bounds().await {
                    Ok(Some(bounds)) => {
                        self.store
                            .price_observations(&PriceQuery::all_towns(bounds))
                            .await
                    }
                    Ok(None) => Ok(Vec::new()),
                    Err(err) => Err(err),
                }
            })
            .await?;

        let transactions_this_month = observations
            .iter()
            .filter(|row| row.month == as_of)
            .count();
        let prices: Vec<f64> = observations.iter().map(|row| row.price).collect();

        Ok(MarketPulse {
            transactions_this_month,
            average_price: mean(&prices),
        })
    }

    pub async fn towns(&self) -> Result<Vec<TownKey>, AnalyticsError> {
        self.read(self.store.towns()).await
    }

    pub async fn flat_types(&self) -> Result<Vec<String>, AnalyticsError> {
        self.read(self.store.flat_types()).await
    }

    pub async fn month_bounds(&self) -> Result<Option<MonthWindow>, AnalyticsError> {
        self.read(self.store.month_bounds()).await
    }

    async fn read<T>(
        &self,
        read: impl std::future::Future<Output = Result<T, SourceError>>,
    ) -> Result<T, AnalyticsError> {
        guarded(StoreKind::Structured, self.timeout, read).await
    }
}
