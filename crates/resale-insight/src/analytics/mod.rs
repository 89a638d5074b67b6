//! Cross-store analytics: price aggregation over the structured store,
//! sentiment over the document store, and the application-side join of both.

pub mod catalog;
pub mod document;
pub mod error;
pub mod hybrid;
pub mod lease;
pub mod overview;
pub mod profile;
pub mod router;
pub mod seed;
pub mod service;
pub mod source;
pub mod stats;
pub mod structured;
pub mod town;
pub mod window;

pub use catalog::Catalog;
pub use document::{
    DocumentAggregator, DocumentStore, InMemoryReviewStore, NewReview, Review, ReviewScope,
};
pub use error::{AnalyticsError, StoreWriteError};
pub use hybrid::{
    HybridJoinEngine, RankedTown, RankingRequest, RatingStatus, ScoreWeights, TownRanking,
};
pub use lease::{remaining_lease_months, RemainingLease, LEASE_TERM_YEARS};
pub use overview::MarketOverview;
pub use profile::{TownProfile, TownProfileAssembler};
pub use router::analytics_router;
pub use seed::{ResaleCsvImporter, ReviewCsvImporter, SeedImportError, SeedSummary};
pub use service::AnalyticsService;
pub use source::{Availability, SourceError, StoreKind};
pub use structured::{
    InMemoryStructuredStore, MonthlyPricePoint, NewFlat, NewTransaction, PriceQuery, PriceTrend,
    StructuredAggregator, StructuredStore, TrendBreakdown,
};
pub use town::TownKey;
pub use window::{MonthWindow, YearMonth};
