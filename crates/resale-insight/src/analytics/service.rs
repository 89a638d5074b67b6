use std::sync::Arc;

use chrono::NaiveDate;

use super::catalog::{catalog, Catalog};
use super::document::{DocumentAggregator, DocumentStore};
use super::error::AnalyticsError;
use super::hybrid::{HybridJoinEngine, RankingRequest, TownRanking};
use super::overview::{market_overview, MarketOverview};
use super::profile::{ProfileRequest, TownProfile, TownProfileAssembler};
use super::structured::{
    PriceQuery, PriceTrend, StructuredAggregator, StructuredStore, TrendBreakdown,
};
use super::town::TownKey;
use crate::config::AnalyticsConfig;

/// Entry point composing the aggregators, ranking engine and profile assembler
/// over one structured and one document store.
pub struct AnalyticsService<S, D> {
    structured: StructuredAggregator<S>,
    documents: DocumentAggregator<D>,
    engine: HybridJoinEngine<S, D>,
    profiles: TownProfileAssembler<S, D>,
    profile_months: u32,
}

impl<S, D> AnalyticsService<S, D>
where
    S: StructuredStore + 'static,
    D: DocumentStore + 'static,
{
    pub fn new(structured: Arc<S>, documents: Arc<D>, config: &AnalyticsConfig) -> Self {
        let structured = StructuredAggregator::new(structured, config.store_timeout);
        let documents = DocumentAggregator::new(documents, config.store_timeout);
        let engine = HybridJoinEngine::new(
            structured.clone(),
            documents.clone(),
            config.weights,
            config.min_transactions,
        );
        let profiles =
            TownProfileAssembler::new(structured.clone(), documents.clone(), config.recent_reviews);

        Self {
            structured,
            documents,
            engine,
            profiles,
            profile_months: config.profile_months,
        }
    }

    pub async fn rank(&self, request: RankingRequest) -> Result<TownRanking, AnalyticsError> {
        self.engine.rank(request).await
    }

    /// Profile over `months` trailing months, or the configured default.
    pub async fn profile(
        &self,
        town: &str,
        months: Option<u32>,
        flat_type: Option<String>,
        today: NaiveDate,
    ) -> Result<TownProfile, AnalyticsError> {
        let request = ProfileRequest {
            town: TownKey::parse(town)?,
            months: months.unwrap_or(self.profile_months),
            flat_type,
            today,
        };
        self.profiles.assemble(request).await
    }

    pub async fn trend(
        &self,
        query: &PriceQuery,
        breakdown: TrendBreakdown,
    ) -> Result<PriceTrend, AnalyticsError> {
        self.structured.monthly_trend(query, breakdown).await
    }

    pub async fn overview(&self, today: NaiveDate) -> Result<MarketOverview, AnalyticsError> {
        market_overview(&self.structured, &self.documents, today).await
    }

    pub async fn catalog(&self) -> Result<Catalog, AnalyticsError> {
        catalog(&self.structured, &self.documents).await
    }
}
