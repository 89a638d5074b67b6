use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{DocumentStore, Review, ReviewId, ReviewScope, MAX_RATING, MIN_RATING};
use crate::analytics::error::{AnalyticsError, StoreWriteError};
use crate::analytics::source::SourceError;
use crate::analytics::town::TownKey;

#[derive(Debug, Clone)]
pub struct NewReview {
    pub town: String,
    pub rating: u8,
    pub text: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ReviewState {
    reviews: BTreeMap<ReviewId, Review>,
    next_id: u64,
}

/// Document store adapter keeping one document per review.
#[derive(Debug, Default)]
pub struct InMemoryReviewStore {
    state: Mutex<ReviewState>,
}

impl InMemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a review under its normalized town key.
    pub fn insert_review(&self, review: NewReview) -> Result<ReviewId, StoreWriteError> {
        let town = TownKey::parse(&review.town)?;
        if !(MIN_RATING..=MAX_RATING).contains(&review.rating) {
            return Err(AnalyticsError::invalid(format!(
                "rating must be within {MIN_RATING}..={MAX_RATING}, got {}",
                review.rating
            ))
            .into());
        }

        let mut state = self.state.lock().map_err(|_| StoreWriteError::Poisoned)?;
        state.next_id += 1;
        let id = ReviewId(state.next_id);
        state.reviews.insert(
            id,
            Review {
                id,
                town,
                rating: review.rating,
                text: review.text.trim().to_string(),
                author: review.author.trim().to_string(),
                created_at: review.created_at,
            },
        );
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.reviews.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for InMemoryReviewStore {
    async fn reviews(&self, scope: &ReviewScope) -> Result<Vec<Review>, SourceError> {
        let state = self
            .state
            .lock()
            .map_err(|_| SourceError::Unavailable("review store state poisoned".to_string()))?;
        Ok(state
            .reviews
            .values()
            .filter(|review| scope.includes(&review.town))
            .cloned()
            .collect())
    }
}
