//! Read side of the document store: town reviews and their sentiment.

mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::AnalyticsError;
use super::source::{guarded, SourceError, StoreKind};
use super::town::TownKey;

pub use memory::{InMemoryReviewStore, NewReview};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ReviewId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Review {
    pub id: ReviewId,
    pub town: TownKey,
    pub rating: u8,
    pub text: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

/// Which reviews a read should return.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewScope {
    All,
    Towns(Vec<TownKey>),
}

impl ReviewScope {
    pub fn includes(&self, town: &TownKey) -> bool {
        match self {
            ReviewScope::All => true,
            ReviewScope::Towns(towns) => towns.contains(town),
        }
    }
}

/// Read contract of the document store. Town is a naming convention there,
/// not a constraint, so the scope may name towns the store has never seen.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn reviews(&self, scope: &ReviewScope) -> Result<Vec<Review>, SourceError>;
}

/// Sentiment for one town. Zero reviews is a normal answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TownReviewSummary {
    pub town: TownKey,
    pub review_count: usize,
    pub average_rating: Option<f64>,
    pub recent_reviews: Vec<Review>,
}

/// Rating figures for a town with at least one review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingSummary {
    pub review_count: usize,
    pub average_rating: f64,
    pub last_review_at: DateTime<Utc>,
}

/// Newest first; equal timestamps fall back to the higher (later) review id.
pub fn newest_first(a: &Review, b: &Review) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

pub fn summarize_town(town: TownKey, reviews: Vec<Review>, recent: usize) -> TownReviewSummary {
    let mut reviews: Vec<Review> = reviews
        .into_iter()
        .filter(|review| review.town == town)
        .collect();
    let review_count = reviews.len();
    let average_rating = if review_count == 0 {
        None
    } else {
        let total: f64 = reviews.iter().map(|review| f64::from(review.rating)).sum();
        Some(total / review_count as f64)
    };

    reviews.sort_by(newest_first);
    reviews.truncate(recent);

    TownReviewSummary {
        town,
        review_count,
        average_rating,
        recent_reviews: reviews,
    }
}

/// Groups reviews by town; towns without reviews are simply absent.
pub fn rating_summaries(reviews: &[Review]) -> BTreeMap<TownKey, RatingSummary> {
    let mut totals: BTreeMap<TownKey, (usize, f64, DateTime<Utc>)> = BTreeMap::new();
    for review in reviews {
        let entry = totals
            .entry(review.town.clone())
            .or_insert((0, 0.0, review.created_at));
        entry.0 += 1;
        entry.1 += f64::from(review.rating);
        entry.2 = entry.2.max(review.created_at);
    }

    totals
        .into_iter()
        .map(|(town, (count, total, last_review_at))| {
            (
                town,
                RatingSummary {
                    review_count: count,
                    average_rating: total / count as f64,
                    last_review_at,
                },
            )
        })
        .collect()
}

/// Market-wide sentiment for the overview tiles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentPulse {
    pub review_count: usize,
    pub average_rating: Option<f64>,
    pub most_reviewed: Option<MostReviewedTown>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MostReviewedTown {
    pub town: TownKey,
    pub review_count: usize,
}

pub struct DocumentAggregator<D> {
    store: Arc<D>,
    timeout: Duration,
}

impl<D> Clone for DocumentAggregator<D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            timeout: self.timeout,
        }
    }
}

impl<D> DocumentAggregator<D>
where
    D: DocumentStore + 'static,
{
    pub fn new(store: Arc<D>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn town_summary(
        &self,
        town: &TownKey,
        recent: usize,
    ) -> Result<TownReviewSummary, AnalyticsError> {
        let scope = ReviewScope::Towns(vec![town.clone()]);
        let reviews = self.read(self.store.reviews(&scope)).await?;
        Ok(summarize_town(town.clone(), reviews, recent))
    }

    pub async fn ratings(
        &self,
        scope: &ReviewScope,
    ) -> Result<BTreeMap<TownKey, RatingSummary>, AnalyticsError> {
        let reviews = self.read(self.store.reviews(scope)).await?;
        let mut summaries = rating_summaries(&reviews);
        summaries.retain(|town, _| scope.includes(town));
        Ok(summaries)
    }

    pub async fn sentiment_pulse(&self) -> Result<SentimentPulse, AnalyticsError> {
        let reviews = self.read(self.store.reviews(&ReviewScope::All)).await?;
        let review_count = reviews.len();
        let average_rating = if review_count == 0 {
            None
        } else {
            let total: f64 = reviews.iter().map(|review| f64::from(review.rating)).sum();
            Some(total / review_count as f64)
        };

        // BTreeMap iteration is key-ordered, so ties go to the alphabetically first town.
        let most_reviewed = rating_summaries(&reviews)
            .into_iter()
            .fold(None::<MostReviewedTown>, |best, (town, summary)| match best {
                Some(current) if current.review_count >= summary.review_count => Some(current),
                _ => Some(MostReviewedTown {
                    town,
                    review_count: summary.review_count,
                }),
            });

        Ok(SentimentPulse {
            review_count,
            average_rating,
            most_reviewed,
        })
    }

    pub async fn towns(&self) -> Result<Vec<TownKey>, AnalyticsError> {
        Ok(self.ratings(&ReviewScope::All).await?.into_keys().collect())
    }

    async fn read<T>(
        &self,
        read: impl std::future::Future<Output = Result<T, SourceError>>,
    ) -> Result<T, AnalyticsError> {
        guarded(StoreKind::Document, self.timeout, read).await
    }
}
