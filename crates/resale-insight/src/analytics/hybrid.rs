//! Town ranking that joins both stores in the application layer.
//!
//! Neither store can see the other, so prices and ratings are fetched
//! independently and met on [`TownKey`] with an explicit full outer join. Each
//! side of the join carries its own "missing" marker instead of a zero.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use serde::Serialize;
use tracing::{info, warn};

use super::document::{DocumentAggregator, DocumentStore, RatingSummary, ReviewScope};
use super::error::AnalyticsError;
use super::source::StoreKind;
use super::structured::{PriceQuery, StructuredAggregator, StructuredStore, TownPriceSummary};
use super::town::TownKey;
use super::window::MonthWindow;

/// Relative weight of the price and rating subscores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreWeights {
    pub price: f64,
    pub rating: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            price: 0.5,
            rating: 0.5,
        }
    }
}

impl ScoreWeights {
    pub fn new(price: f64, rating: f64) -> Result<Self, AnalyticsError> {
        let valid = |weight: f64| weight.is_finite() && weight >= 0.0;
        if !valid(price) || !valid(rating) || price + rating <= 0.0 {
            return Err(AnalyticsError::invalid(
                "score weights must be non-negative with a positive sum",
            ));
        }
        Ok(Self { price, rating })
    }
}

/// What the join found on the rating side for a town.
#[derive(Debug, Clone, PartialEq)]
pub enum RatingSide {
    Present(RatingSummary),
    Missing,
    Unavailable,
}

/// One row of the full outer join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedTown {
    pub pricing: Option<TownPriceSummary>,
    pub rating: RatingSide,
}

/// Full outer join on town key. `ratings` is `None` when the document store
/// could not be read, which marks every row's rating side as unavailable.
pub fn full_outer_join(
    prices: Vec<TownPriceSummary>,
    ratings: Option<BTreeMap<TownKey, RatingSummary>>,
) -> BTreeMap<TownKey, JoinedTown> {
    let default_side = if ratings.is_some() {
        RatingSide::Missing
    } else {
        RatingSide::Unavailable
    };

    let mut joined: BTreeMap<TownKey, JoinedTown> = prices
        .into_iter()
        .map(|summary| {
            (
                summary.town.clone(),
                JoinedTown {
                    pricing: Some(summary),
                    rating: default_side.clone(),
                },
            )
        })
        .collect();

    for (town, rating) in ratings.into_iter().flatten() {
        joined
            .entry(town)
            .or_insert(JoinedTown {
                pricing: None,
                rating: RatingSide::Missing,
            })
            .rating = RatingSide::Present(rating);
    }

    joined
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingStatus {
    Rated,
    NoReviewsYet,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedTown {
    pub rank: usize,
    pub town: TownKey,
    pub median_price: f64,
    pub transaction_count: usize,
    pub average_rating: Option<f64>,
    pub review_count: usize,
    /// Newest review for the town, `None` when it has none or ratings were unreadable.
    pub last_review_at: Option<DateTime<Utc>>,
    pub rating_status: RatingStatus,
    pub price_score: f64,
    pub rating_score: Option<f64>,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExclusionReason {
    NoPricing,
    TooFewTransactions { count: usize, required: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedTown {
    pub town: TownKey,
    #[serde(flatten)]
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TownRanking {
    pub window: MonthWindow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flat_type: Option<String>,
    pub weights: ScoreWeights,
    pub towns: Vec<RankedTown>,
    pub excluded: Vec<ExcludedTown>,
    /// Store whose half of the insight is missing, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<StoreKind>,
}

/// Min-max position of `value` in `[min, max]`; a flat range puts everyone at the top.
fn normalized(value: f64, min: f64, max: f64) -> f64 {
    if max > min {
        ((value - min) / (max - min)).clamp(0.0, 1.0)
    } else {
        1.0
    }
}

fn bounds(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, value| match acc {
        None => Some((value, value)),
        Some((min, max)) => Some((min.min(value), max.max(value))),
    })
}

/// Scores and orders the joined towns.
///
/// Price subscore is `(max - price) / (max - min)` over all candidates; rating
/// subscore is `(rating - min) / (max - min)` over rated candidates only. The
/// composite is the weighted mean of whichever subscores a town has, so an
/// unrated town is judged on price alone rather than as a zero rating. Equal
/// scores fall back to town key order.
pub fn rank_towns(
    joined: BTreeMap<TownKey, JoinedTown>,
    weights: ScoreWeights,
    min_transactions: usize,
) -> (Vec<RankedTown>, Vec<ExcludedTown>) {
    let mut excluded = Vec::new();
    let mut candidates = Vec::new();

    for (town, row) in joined {
        match row.pricing {
            None => excluded.push(ExcludedTown {
                town,
                reason: ExclusionReason::NoPricing,
            }),
            Some(pricing) if pricing.transaction_count < min_transactions => {
                excluded.push(ExcludedTown {
                    town,
                    reason: ExclusionReason::TooFewTransactions {
                        count: pricing.transaction_count,
                        required: min_transactions,
                    },
                })
            }
            Some(pricing) => candidates.push((town, pricing, row.rating)),
        }
    }

    let price_bounds = bounds(candidates.iter().map(|(_, pricing, _)| pricing.median_price));
    let rating_bounds = bounds(candidates.iter().filter_map(|(_, _, side)| match side {
        RatingSide::Present(summary) => Some(summary.average_rating),
        _ => None,
    }));

    let mut ranked: Vec<RankedTown> = candidates
        .into_iter()
        .map(|(town, pricing, side)| {
            let price_score = match price_bounds {
                Some((min, max)) if max > min => 1.0 - normalized(pricing.median_price, min, max),
                _ => 1.0,
            };

            let (rating_status, average_rating, review_count, last_review_at, rating_score) =
                match side {
                    RatingSide::Present(summary) => {
                        let score = rating_bounds
                            .map(|(min, max)| normalized(summary.average_rating, min, max))
                            .unwrap_or(1.0);
                        (
                            RatingStatus::Rated,
                            Some(summary.average_rating),
                            summary.review_count,
                            Some(summary.last_review_at),
                            Some(score),
                        )
                    }
                    RatingSide::Missing => (RatingStatus::NoReviewsYet, None, 0, None, None),
                    RatingSide::Unavailable => (RatingStatus::Unavailable, None, 0, None, None),
                };

            let (weighted, total_weight) = match rating_score {
                Some(rating) => (
                    weights.price * price_score + weights.rating * rating,
                    weights.price + weights.rating,
                ),
                None => (weights.price * price_score, weights.price),
            };
            let score = if total_weight > 0.0 {
                weighted / total_weight
            } else {
                0.0
            };

            RankedTown {
                rank: 0,
                town,
                median_price: pricing.median_price,
                transaction_count: pricing.transaction_count,
                average_rating,
                review_count,
                last_review_at,
                rating_status,
                price_score,
                rating_score,
                score,
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.town.cmp(&b.town)));
    for (index, town) in ranked.iter_mut().enumerate() {
        town.rank = index + 1;
    }

    (ranked, excluded)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankingRequest {
    pub window: MonthWindow,
    pub flat_type: Option<String>,
    /// Overrides the engine's configured minimum when set.
    pub min_transactions: Option<usize>,
}

pub struct HybridJoinEngine<S, D> {
    structured: StructuredAggregator<S>,
    documents: DocumentAggregator<D>,
    weights: ScoreWeights,
    min_transactions: usize,
}

impl<S, D> HybridJoinEngine<S, D>
where
    S: StructuredStore + 'static,
    D: DocumentStore + 'static,
{
    pub fn new(
        structured: StructuredAggregator<S>,
        documents: DocumentAggregator<D>,
        weights: ScoreWeights,
        min_transactions: usize,
    ) -> Self {
        Self {
            structured,
            documents,
            weights,
            min_transactions,
        }
    }

    /// Ranks every priced town in the window.
    ///
    /// The structured read is mandatory; a failing document store only
    /// degrades the ranking to price-only scores with the store named.
    pub async fn rank(&self, request: RankingRequest) -> Result<TownRanking, AnalyticsError> {
        let query = PriceQuery::all_towns(request.window).with_flat_type(request.flat_type);
        let (prices, ratings) = tokio::join!(
            self.structured.summarize(&query),
            self.documents.ratings(&ReviewScope::All)
        );
        let prices = prices?;

        let (ratings, degraded) = match ratings {
            Ok(ratings) => (Some(ratings), None),
            Err(AnalyticsError::DataSourceUnavailable { store, source }) => {
                warn!(%store, error = %source, "ranking without ratings");
                (None, Some(store))
            }
            Err(other) => return Err(other),
        };

        let min_transactions = request.min_transactions.unwrap_or(self.min_transactions);
        let (towns, excluded) = if prices.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            rank_towns(full_outer_join(prices, ratings), self.weights, min_transactions)
        };

        info!(
            window = %query.window,
            ranked = towns.len(),
            excluded = excluded.len(),
            degraded = degraded.map(StoreKind::label),
            "town ranking built"
        );

        Ok(TownRanking {
            window: query.window,
            flat_type: query.flat_type,
            weights: self.weights,
            towns,
            excluded,
            degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn key(raw: &str) -> TownKey {
        TownKey::parse(raw).expect("town")
    }

    fn priced(town: &str, median: f64, count: usize) -> TownPriceSummary {
        TownPriceSummary {
            town: key(town),
            transaction_count: count,
            median_price: median,
            p25_price: median,
            p75_price: median,
            avg_price_per_sqm: None,
        }
    }

    fn rated(average: f64, count: usize) -> RatingSummary {
        RatingSummary {
            review_count: count,
            average_rating: average,
            last_review_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn join_keeps_towns_from_either_side() {
        let mut ratings = BTreeMap::new();
        ratings.insert(key("Bedok"), rated(4.0, 3));
        ratings.insert(key("Bishan"), rated(3.0, 1));

        let joined = full_outer_join(
            vec![priced("Bedok", 500_000.0, 4), priced("Yishun", 400_000.0, 2)],
            Some(ratings),
        );

        assert_eq!(joined.len(), 3);
        assert!(matches!(joined[&key("Bedok")].rating, RatingSide::Present(_)));
        assert_eq!(joined[&key("Yishun")].rating, RatingSide::Missing);
        assert!(joined[&key("Bishan")].pricing.is_none());
    }

    #[test]
    fn unreadable_ratings_mark_rows_unavailable() {
        let joined = full_outer_join(vec![priced("Bedok", 500_000.0, 4)], None);
        assert_eq!(joined[&key("Bedok")].rating, RatingSide::Unavailable);
    }

    #[test]
    fn unrated_town_is_scored_on_price_not_as_zero_rating() {
        let mut ratings = BTreeMap::new();
        ratings.insert(key("Bedok"), rated(2.0, 5));
        ratings.insert(key("Queenstown"), rated(5.0, 5));
        let joined = full_outer_join(
            vec![
                priced("Bedok", 400_000.0, 10),
                priced("Queenstown", 800_000.0, 10),
                priced("Woodlands", 400_000.0, 10),
            ],
            Some(ratings),
        );

        let (ranked, excluded) = rank_towns(joined, ScoreWeights::default(), 1);
        assert!(excluded.is_empty());

        let woodlands = ranked.iter().find(|t| t.town == key("Woodlands")).unwrap();
        assert_eq!(woodlands.rating_status, RatingStatus::NoReviewsYet);
        assert_eq!(woodlands.average_rating, None);
        assert_eq!(woodlands.last_review_at, None);
        assert_eq!(woodlands.score, 1.0);
        assert_eq!(ranked[0].town, key("Woodlands"));

        let bedok = ranked.iter().find(|t| t.town == key("Bedok")).unwrap();
        assert_eq!(bedok.score, 0.5);
        assert_eq!(
            bedok.last_review_at,
            Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
        );
        let queenstown = ranked.iter().find(|t| t.town == key("Queenstown")).unwrap();
        assert_eq!(queenstown.score, 0.5);
        // Equal composite scores fall back to town order.
        assert_eq!(ranked[1].town, key("Bedok"));
        assert_eq!(ranked[2].town, key("Queenstown"));
    }

    #[test]
    fn towns_without_pricing_or_volume_are_excluded() {
        let mut ratings = BTreeMap::new();
        ratings.insert(key("Bishan"), rated(4.5, 2));
        let joined = full_outer_join(
            vec![priced("Bedok", 500_000.0, 12), priced("Yishun", 400_000.0, 3)],
            Some(ratings),
        );

        let (ranked, excluded) = rank_towns(joined, ScoreWeights::default(), 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].town, key("Bedok"));
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(
            excluded,
            vec![
                ExcludedTown {
                    town: key("Bishan"),
                    reason: ExclusionReason::NoPricing,
                },
                ExcludedTown {
                    town: key("Yishun"),
                    reason: ExclusionReason::TooFewTransactions {
                        count: 3,
                        required: 10,
                    },
                },
            ]
        );
    }

    #[test]
    fn scores_stay_within_unit_range() {
        let mut ratings = BTreeMap::new();
        ratings.insert(key("A"), rated(1.0, 1));
        ratings.insert(key("B"), rated(5.0, 1));
        ratings.insert(key("C"), rated(3.0, 1));
        let joined = full_outer_join(
            vec![
                priced("A", 300_000.0, 1),
                priced("B", 900_000.0, 1),
                priced("C", 600_000.0, 1),
                priced("D", 450_000.0, 1),
            ],
            Some(ratings),
        );
        let weights = ScoreWeights::new(0.7, 0.3).unwrap();
        let (ranked, _) = rank_towns(joined, weights, 1);
        for town in &ranked {
            assert!((0.0..=1.0).contains(&town.score), "{town:?}");
        }
    }

    #[test]
    fn weights_must_be_usable() {
        assert!(ScoreWeights::new(0.0, 0.0).is_err());
        assert!(ScoreWeights::new(-0.5, 1.0).is_err());
        assert!(ScoreWeights::new(f64::NAN, 1.0).is_err());
        assert!(ScoreWeights::new(0.0, 1.0).is_ok());
    }
}
