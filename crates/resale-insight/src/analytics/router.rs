use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use super::catalog::Catalog;
use super::document::DocumentStore;
use super::error::AnalyticsError;
use super::hybrid::{RankingRequest, TownRanking};
use super::lease::RemainingLease;
use super::overview::MarketOverview;
use super::profile::TownProfile;
use super::service::AnalyticsService;
use super::structured::{PriceQuery, PriceTrend, StructuredStore, TrendBreakdown};
use super::town::TownKey;
use super::window::{MonthWindow, YearMonth};
use crate::error::AppError;

/// Read-only HTTP surface over the analytics service.
pub fn analytics_router<S, D>(service: Arc<AnalyticsService<S, D>>) -> Router
where
    S: StructuredStore + 'static,
    D: DocumentStore + 'static,
{
    Router::new()
        .route("/api/v1/towns/ranking", get(ranking_handler::<S, D>))
        .route("/api/v1/towns/:town/profile", get(profile_handler::<S, D>))
        .route("/api/v1/trend", get(trend_handler::<S, D>))
        .route("/api/v1/overview", get(overview_handler::<S, D>))
        .route("/api/v1/catalog", get(catalog_handler::<S, D>))
        .route("/api/v1/lease/remaining", get(lease_handler))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct RankingParams {
    from: String,
    to: String,
    #[serde(default)]
    flat_type: Option<String>,
    #[serde(default)]
    min_transactions: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TrendParams {
    from: String,
    to: String,
    #[serde(default)]
    town: Option<String>,
    #[serde(default)]
    flat_type: Option<String>,
    #[serde(default)]
    by: TrendBreakdown,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileParams {
    #[serde(default)]
    months: Option<u32>,
    #[serde(default)]
    flat_type: Option<String>,
    #[serde(default)]
    today: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OverviewParams {
    #[serde(default)]
    today: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LeaseParams {
    lease_start_year: i32,
    month: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct LeaseView {
    lease_start_year: i32,
    month: YearMonth,
    remaining_lease_months: u32,
    remaining_lease: String,
}

pub(crate) async fn ranking_handler<S, D>(
    State(service): State<Arc<AnalyticsService<S, D>>>,
    Query(params): Query<RankingParams>,
) -> Result<Json<TownRanking>, AppError>
where
    S: StructuredStore + 'static,
    D: DocumentStore + 'static,
{
    let window = MonthWindow::new(params.from.parse()?, params.to.parse()?)?;
    let ranking = service
        .rank(RankingRequest {
            window,
            flat_type: params.flat_type,
            min_transactions: params.min_transactions,
        })
        .await?;
    Ok(Json(ranking))
}

pub(crate) async fn trend_handler<S, D>(
    State(service): State<Arc<AnalyticsService<S, D>>>,
    Query(params): Query<TrendParams>,
) -> Result<Json<PriceTrend>, AppError>
where
    S: StructuredStore + 'static,
    D: DocumentStore + 'static,
{
    let window = MonthWindow::new(params.from.parse()?, params.to.parse()?)?;
    let town = match params.town.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(TownKey::parse(raw)?),
        _ => None,
    };
    let query = PriceQuery {
        window,
        town,
        flat_type: None,
    }
    .with_flat_type(params.flat_type);
    Ok(Json(service.trend(&query, params.by).await?))
}

pub(crate) async fn profile_handler<S, D>(
    State(service): State<Arc<AnalyticsService<S, D>>>,
    Path(town): Path<String>,
    Query(params): Query<ProfileParams>,
) -> Result<Json<TownProfile>, AppError>
where
    S: StructuredStore + 'static,
    D: DocumentStore + 'static,
{
    let today = resolve_today(params.today.as_deref())?;
    let profile = service
        .profile(&town, params.months, params.flat_type, today)
        .await?;
    Ok(Json(profile))
}

pub(crate) async fn overview_handler<S, D>(
    State(service): State<Arc<AnalyticsService<S, D>>>,
    Query(params): Query<OverviewParams>,
) -> Result<Json<MarketOverview>, AppError>
where
    S: StructuredStore + 'static,
    D: DocumentStore + 'static,
{
    let today = resolve_today(params.today.as_deref())?;
    Ok(Json(service.overview(today).await?))
}

pub(crate) async fn catalog_handler<S, D>(
    State(service): State<Arc<AnalyticsService<S, D>>>,
) -> Result<Json<Catalog>, AppError>
where
    S: StructuredStore + 'static,
    D: DocumentStore + 'static,
{
    Ok(Json(service.catalog().await?))
}

pub(crate) async fn lease_handler(
    Query(params): Query<LeaseParams>,
) -> Result<Json<LeaseView>, AppError> {
    let month: YearMonth = params.month.parse()?;
    let remaining = RemainingLease::at(params.lease_start_year, month)?;
    Ok(Json(LeaseView {
        lease_start_year: params.lease_start_year,
        month,
        remaining_lease_months: remaining.months(),
        remaining_lease: remaining.to_string(),
    }))
}

/// Explicit `today` pins the trailing window; otherwise the local calendar date.
fn resolve_today(raw: Option<&str>) -> Result<NaiveDate, AnalyticsError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|err| {
            AnalyticsError::InvalidInput(format!(
                "failed to parse '{value}' as YYYY-MM-DD ({err})"
            ))
        }),
        None => Ok(Local::now().date_naive()),
    }
}
