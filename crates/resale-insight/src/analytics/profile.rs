use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use super::document::{DocumentAggregator, DocumentStore, Review, TownReviewSummary};
use super::error::AnalyticsError;
use super::source::Availability;
use super::structured::{StructuredAggregator, StructuredStore, TownPriceSummary};
use super::town::TownKey;
use super::window::MonthWindow;

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRequest {
    pub town: TownKey,
    /// Trailing months before the current month of `today`.
    pub months: u32,
    pub flat_type: Option<String>,
    pub today: NaiveDate,
}

/// Price half of a profile. Every figure is `None` when the town had no
/// transactions in the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSection {
    pub transaction_count: usize,
    pub median_price: Option<f64>,
    pub p25_price: Option<f64>,
    pub p75_price: Option<f64>,
    pub avg_price_per_sqm: Option<f64>,
}

impl From<Option<TownPriceSummary>> for PriceSection {
    fn from(summary: Option<TownPriceSummary>) -> Self {
        match summary {
            Some(summary) => Self {
                transaction_count: summary.transaction_count,
                median_price: Some(summary.median_price),
                p25_price: Some(summary.p25_price),
                p75_price: Some(summary.p75_price),
                avg_price_per_sqm: summary.avg_price_per_sqm,
            },
            None => Self {
                transaction_count: 0,
                median_price: None,
                p25_price: None,
                p75_price: None,
                avg_price_per_sqm: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentSection {
    pub review_count: usize,
    pub average_rating: Option<f64>,
    pub recent_reviews: Vec<Review>,
}

impl From<TownReviewSummary> for SentimentSection {
    fn from(summary: TownReviewSummary) -> Self {
        Self {
            review_count: summary.review_count,
            average_rating: summary.average_rating,
            recent_reviews: summary.recent_reviews,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TownProfile {
    pub town: TownKey,
    pub window: MonthWindow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flat_type: Option<String>,
    pub pricing: Availability<PriceSection>,
    pub sentiment: Availability<SentimentSection>,
}

pub struct TownProfileAssembler<S, D> {
    structured: StructuredAggregator<S>,
    documents: DocumentAggregator<D>,
    recent_reviews: usize,
}

impl<S, D> TownProfileAssembler<S, D>
where
    S: StructuredStore + 'static,
    D: DocumentStore + 'static,
{
    pub fn new(
        structured: StructuredAggregator<S>,
        documents: DocumentAggregator<D>,
        recent_reviews: usize,
    ) -> Self {
        Self {
            structured,
            documents,
            recent_reviews,
        }
    }

    /// Reads both stores concurrently and composes once both have answered.
    ///
    /// A store that fails or times out only marks its own section unavailable;
    /// the call itself fails only for invalid input.
    pub async fn assemble(&self, request: ProfileRequest) -> Result<TownProfile, AnalyticsError> {
        let ProfileRequest {
            town,
            months,
            flat_type,
            today,
        } = request;
        let window = MonthWindow::trailing(months, today)?;
        let flat_type = flat_type
            .map(|value| value.trim().to_uppercase())
            .filter(|value| !value.is_empty());

        let (prices, reviews) = tokio::join!(
            self.structured
                .town_summary(&town, window, flat_type.clone()),
            self.documents.town_summary(&town, self.recent_reviews)
        );

        let pricing = Availability::from_result(prices.map(PriceSection::from))?;
        let sentiment = Availability::from_result(reviews.map(SentimentSection::from))?;

        info!(
            town = %town,
            window = %window,
            priced = pricing.available().is_some_and(|p| p.transaction_count > 0),
            reviewed = sentiment.available().is_some_and(|s| s.review_count > 0),
            "town profile assembled"
        );

        Ok(TownProfile {
            town,
            window,
            flat_type,
            pricing,
            sentiment,
        })
    }
}
