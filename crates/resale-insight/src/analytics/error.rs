use super::source::{SourceError, StoreKind};

/// Failure taxonomy shared by every analytics operation.
///
/// An empty result is not an error: "no data" is carried by `None` fields and
/// empty collections on the success path.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalyticsError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{store} store unavailable: {source}")]
    DataSourceUnavailable {
        store: StoreKind,
        #[source]
        source: SourceError,
    },
}

impl AnalyticsError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// The store that failed, when the error names one.
    pub fn failed_store(&self) -> Option<StoreKind> {
        match self {
            AnalyticsError::DataSourceUnavailable { store, .. } => Some(*store),
            AnalyticsError::InvalidInput(_) => None,
        }
    }
}

/// Errors raised by the write paths of the in-memory adapters.
#[derive(Debug, thiserror::Error)]
pub enum StoreWriteError {
    #[error(transparent)]
    Invalid(#[from] AnalyticsError),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("flat {flat} is still referenced by {transactions} transaction(s)")]
    Restricted { flat: u64, transactions: usize },
    #[error("store state poisoned by an earlier panic")]
    Poisoned,
}
