use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use resale_insight::analytics::document::{DocumentStore, Review, ReviewScope};
use resale_insight::analytics::structured::{PriceObservation, PriceQuery};
use resale_insight::analytics::{
    AnalyticsError, AnalyticsService, Availability, InMemoryReviewStore, InMemoryStructuredStore,
    MonthWindow, NewFlat, NewReview, NewTransaction, RankingRequest, RatingStatus, SourceError,
    StoreKind, StructuredStore, TownKey, YearMonth,
};
use resale_insight::config::AnalyticsConfig;

fn month(raw: &str) -> YearMonth {
    raw.parse().expect("valid month")
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, 15).expect("valid date")
}

fn record_sale(store: &InMemoryStructuredStore, town: &str, block: usize, price: f64, when: &str) {
    let flat_id = store
        .find_or_insert_flat(NewFlat {
            town: town.to_string(),
            street: "Central Avenue".to_string(),
            block: block.to_string(),
            lease_start_year: 1995,
        })
        .expect("flat");
    store
        .insert_transaction(NewTransaction {
            flat_id,
            month: month(when),
            price,
            floor_area_sqm: 90.0,
            flat_type: "4 ROOM".to_string(),
            flat_model: "Model A".to_string(),
            storey_range: "07 TO 09".to_string(),
        })
        .expect("transaction");
}

/// Town A: ten sales from 300k to 500k and twenty reviews averaging 4.5.
/// Town B: two sales at 800k and 820k, no reviews.
fn scenario_stores() -> (InMemoryStructuredStore, InMemoryReviewStore) {
    let structured = InMemoryStructuredStore::new();
    for (index, price) in (0..10).map(|i| (i, 300_000.0 + f64::from(i) * 22_222.0)) {
        record_sale(&structured, "Town A", index as usize, price, "2024-06");
    }
    record_sale(&structured, "Town B", 1, 800_000.0, "2024-07");
    record_sale(&structured, "Town B", 2, 820_000.0, "2024-08");

    let documents = InMemoryReviewStore::new();
    for index in 0..20u32 {
        documents
            .insert_review(NewReview {
                town: "town a".to_string(),
                rating: if index % 2 == 0 { 4 } else { 5 },
                text: format!("review {index}"),
                author: format!("resident-{index}"),
                created_at: Utc.with_ymd_and_hms(2024, 9, 1 + index, 12, 0, 0).unwrap(),
            })
            .expect("review");
    }

    (structured, documents)
}

fn service<S, D>(structured: S, documents: D, timeout: Duration) -> AnalyticsService<S, D>
where
    S: StructuredStore + 'static,
    D: DocumentStore + 'static,
{
    let config = AnalyticsConfig {
        store_timeout: timeout,
        ..AnalyticsConfig::default()
    };
    AnalyticsService::new(Arc::new(structured), Arc::new(documents), &config)
}

fn year_2024() -> RankingRequest {
    RankingRequest {
        window: MonthWindow::new(month("2024-01"), month("2024-12")).expect("window"),
        flat_type: None,
        min_transactions: None,
    }
}

#[tokio::test]
async fn cheaper_rated_town_ranks_above_pricier_unrated_town() {
    let (structured, documents) = scenario_stores();
    let service = service(structured, documents, Duration::from_secs(2));

    let ranking = service.rank(year_2024()).await.expect("ranking");

    assert_eq!(ranking.degraded, None);
    let order: Vec<&str> = ranking.towns.iter().map(|t| t.town.as_str()).collect();
    assert_eq!(order, vec!["TOWN A", "TOWN B"]);

    let town_a = &ranking.towns[0];
    assert_eq!(town_a.transaction_count, 10);
    assert_eq!(town_a.review_count, 20);
    assert_eq!(town_a.average_rating, Some(4.5));
    assert_eq!(
        town_a.last_review_at,
        Some(Utc.with_ymd_and_hms(2024, 9, 20, 12, 0, 0).unwrap())
    );
    let town_b = &ranking.towns[1];
    assert_eq!(town_b.rating_status, RatingStatus::NoReviewsYet);
    assert_eq!(town_b.average_rating, None);
    assert!(town_a.score > town_b.score);

    let profile = service
        .profile("Town B", Some(11), None, today())
        .await
        .expect("profile");
    let sentiment = profile.sentiment.available().expect("document store answered");
    assert_eq!(sentiment.review_count, 0);
    assert_eq!(sentiment.average_rating, None);

    let json = serde_json::to_value(&profile).expect("serialize");
    assert!(json["sentiment"]["data"]["average_rating"].is_null());
    assert_eq!(json["pricing"]["data"]["median_price"], 810_000.0);
}

#[tokio::test]
async fn ranking_is_deterministic_for_unchanged_stores() {
    let (structured, documents) = scenario_stores();
    let service = service(structured, documents, Duration::from_secs(2));

    let first = service.rank(year_2024()).await.expect("first ranking");
    let second = service.rank(year_2024()).await.expect("second ranking");
    assert_eq!(first, second);
}

#[tokio::test]
async fn empty_window_yields_empty_ranking() {
    let (structured, documents) = scenario_stores();
    let service = service(structured, documents, Duration::from_secs(2));

    let ranking = service
        .rank(RankingRequest {
            window: MonthWindow::single(month("2019-01")),
            flat_type: None,
            min_transactions: None,
        })
        .await
        .expect("ranking");

    assert!(ranking.towns.is_empty());
    assert!(ranking.excluded.is_empty());
}

#[tokio::test]
async fn towns_below_transaction_minimum_are_reported_as_excluded() {
    let (structured, documents) = scenario_stores();
    let service = service(structured, documents, Duration::from_secs(2));

    let ranking = service
        .rank(RankingRequest {
            min_transactions: Some(5),
            ..year_2024()
        })
        .await
        .expect("ranking");

    assert_eq!(ranking.towns.len(), 1);
    assert_eq!(ranking.excluded.len(), 1);
    assert_eq!(ranking.excluded[0].town.as_str(), "TOWN B");
}

struct FailingReviews;

#[async_trait]
impl DocumentStore for FailingReviews {
    async fn reviews(&self, _scope: &ReviewScope) -> Result<Vec<Review>, SourceError> {
        Err(SourceError::Unavailable("connection refused".to_string()))
    }
}

/// Structured store that never answers within any reasonable deadline.
struct StalledPrices;

#[async_trait]
impl StructuredStore for StalledPrices {
    async fn price_observations(
        &self,
        _query: &PriceQuery,
    ) -> Result<Vec<PriceObservation>, SourceError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Vec::new())
    }

    async fn towns(&self) -> Result<Vec<TownKey>, SourceError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Vec::new())
    }

    async fn flat_types(&self) -> Result<Vec<String>, SourceError> {
        Ok(Vec::new())
    }

    async fn month_bounds(&self) -> Result<Option<MonthWindow>, SourceError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(None)
    }
}

#[tokio::test]
async fn failing_document_store_degrades_ranking_to_price_only() {
    let (structured, _) = scenario_stores();
    let service = service(structured, FailingReviews, Duration::from_secs(2));

    let ranking = service.rank(year_2024()).await.expect("ranking");

    assert_eq!(ranking.degraded, Some(StoreKind::Document));
    assert_eq!(ranking.towns.len(), 2);
    assert!(ranking
        .towns
        .iter()
        .all(|town| town.rating_status == RatingStatus::Unavailable && town.average_rating.is_none()));
    assert_eq!(ranking.towns[0].town.as_str(), "TOWN A");
}

#[tokio::test]
async fn stalled_structured_store_fails_ranking_with_store_named() {
    let (_, documents) = scenario_stores();
    let service = service(StalledPrices, documents, Duration::from_millis(50));

    let err = service.rank(year_2024()).await.unwrap_err();

    assert_eq!(err.failed_store(), Some(StoreKind::Structured));
    assert!(matches!(
        err,
        AnalyticsError::DataSourceUnavailable {
            source: SourceError::TimedOut(_),
            ..
        }
    ));
}

#[tokio::test]
async fn profile_keeps_the_half_that_answered() {
    let (_, documents) = scenario_stores();
    let service = service(StalledPrices, documents, Duration::from_millis(50));

    let profile = service
        .profile("Town A", None, None, today())
        .await
        .expect("profile survives a stalled store");

    assert_eq!(profile.pricing.degraded_store(), Some(StoreKind::Structured));
    let sentiment = profile.sentiment.available().expect("reviews answered");
    assert_eq!(sentiment.review_count, 20);
    assert_eq!(sentiment.recent_reviews.len(), 3);
    assert_eq!(sentiment.recent_reviews[0].text, "review 19");
}

#[tokio::test]
async fn profile_rejects_blank_town() {
    let (structured, documents) = scenario_stores();
    let service = service(structured, documents, Duration::from_secs(2));

    let err = service.profile("   ", None, None, today()).await.unwrap_err();
    assert!(matches!(err, AnalyticsError::InvalidInput(_)));
}

#[tokio::test]
async fn overview_marks_failed_store_unavailable() {
    let (structured, _) = scenario_stores();
    let service = service(structured, FailingReviews, Duration::from_secs(2));

    let overview = service
        .overview(NaiveDate::from_ymd_opt(2024, 8, 3).unwrap())
        .await
        .expect("overview");

    let market = overview.market.available().expect("structured answered");
    assert_eq!(market.transactions_this_month, 1);
    assert!(matches!(
        overview.sentiment,
        Availability::Unavailable {
            store: StoreKind::Document,
            ..
        }
    ));
}

#[tokio::test]
async fn catalog_falls_back_to_structured_towns_when_reviews_fail() {
    let (structured, _) = scenario_stores();
    let service = service(structured, FailingReviews, Duration::from_secs(2));

    let catalog = service.catalog().await.expect("catalog");

    assert_eq!(catalog.degraded, Some(StoreKind::Document));
    let towns: Vec<&str> = catalog.towns.iter().map(TownKey::as_str).collect();
    assert_eq!(towns, vec!["TOWN A", "TOWN B"]);
    assert_eq!(catalog.flat_types, vec!["4 ROOM".to_string()]);
    let range = catalog.month_range.expect("months known");
    assert_eq!(range.start(), month("2024-06"));
    assert_eq!(range.end(), month("2024-08"));
}

#[tokio::test]
async fn lease_edits_keep_remaining_lease_consistent() {
    let store = InMemoryStructuredStore::new();
    let flat_id = store
        .insert_flat(NewFlat {
            town: "Clementi".to_string(),
            street: "West Coast Road".to_string(),
            block: "512".to_string(),
            lease_start_year: 1990,
        })
        .expect("flat");
    let sale = store
        .insert_transaction(NewTransaction {
            flat_id,
            month: month("2020-06"),
            price: 455_000.0,
            floor_area_sqm: 104.0,
            flat_type: "4 room".to_string(),
            flat_model: "New Generation".to_string(),
            storey_range: "10 TO 12".to_string(),
        })
        .expect("transaction");

    assert_eq!(store.transaction(sale).unwrap().remaining_lease().months(), 834);

    assert_eq!(store.update_flat_lease_start(flat_id, 2000).expect("lease edit"), 1);
    assert_eq!(store.transaction(sale).unwrap().remaining_lease().months(), 954);

    store
        .update_transaction_month(sale, month("2100-01"))
        .expect("month edit");
    let moved = store.transaction(sale).unwrap();
    assert_eq!(moved.remaining_lease().months(), 0);
    assert!(moved.remaining_lease().is_expired());
}
