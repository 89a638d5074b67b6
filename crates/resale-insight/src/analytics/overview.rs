use chrono::NaiveDate;
use serde::Serialize;

use super::document::{DocumentAggregator, DocumentStore, SentimentPulse};
use super::error::AnalyticsError;
use super::source::Availability;
use super::structured::{MarketPulse, StructuredAggregator, StructuredStore};
use super::window::YearMonth;

/// Site-wide snapshot shown above the per-town views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketOverview {
    pub as_of: YearMonth,
    pub market: Availability<MarketPulse>,
    pub sentiment: Availability<SentimentPulse>,
}

pub async fn market_overview<S, D>(
    structured: &StructuredAggregator<S>,
    documents: &DocumentAggregator<D>,
    today: NaiveDate,
) -> Result<MarketOverview, AnalyticsError>
where
    S: StructuredStore + 'static,
    D: DocumentStore + 'static,
{
    let as_of = YearMonth::from_date(today);
    let (market, sentiment) = tokio::join!(
        structured.market_pulse(as_of),
        documents.sentiment_pulse()
    );

    Ok(MarketOverview {
        as_of,
        market: Availability::from_result(market)?,
        sentiment: Availability::from_result(sentiment)?,
    })
}
