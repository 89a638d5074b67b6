use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use resale_insight::analytics::{
    AnalyticsService, InMemoryReviewStore, InMemoryStructuredStore, ResaleCsvImporter,
    ReviewCsvImporter, YearMonth,
};
use resale_insight::config::AppConfig;
use resale_insight::error::AppError;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub(crate) type SeededService = AnalyticsService<InMemoryStructuredStore, InMemoryReviewStore>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Builds both in-memory stores from the configured seed files. Missing paths
/// leave the corresponding store empty.
pub(crate) fn seeded_service(config: &AppConfig) -> Result<SeededService, AppError> {
    let structured = InMemoryStructuredStore::new();
    let documents = InMemoryReviewStore::new();

    if let Some(path) = &config.seed.resale_csv {
        let summary = ResaleCsvImporter::from_path(path, &structured)?;
        info!(
            path = %path.display(),
            loaded = summary.loaded,
            skipped = summary.skipped,
            "resale transactions seeded"
        );
    }

    if let Some(path) = &config.seed.reviews_csv {
        let summary = ReviewCsvImporter::from_path(path, &documents)?;
        info!(
            path = %path.display(),
            loaded = summary.loaded,
            skipped = summary.skipped,
            "town reviews seeded"
        );
    }

    Ok(AnalyticsService::new(
        Arc::new(structured),
        Arc::new(documents),
        &config.analytics,
    ))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_month(raw: &str) -> Result<YearMonth, String> {
    raw.parse::<YearMonth>().map_err(|err| err.to_string())
}
