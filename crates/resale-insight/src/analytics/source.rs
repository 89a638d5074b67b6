use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;

use super::error::AnalyticsError;

/// The two independent backends the hybrid queries read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Structured,
    Document,
}

impl StoreKind {
    pub fn label(self) -> &'static str {
        match self {
            StoreKind::Structured => "structured",
            StoreKind::Document => "document",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error reported by a store adapter for a read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("{0}")]
    Unavailable(String),
    #[error("no answer within {}ms", .0.as_millis())]
    TimedOut(Duration),
}

/// Runs one store read under the caller's deadline and tags any failure with the store.
pub(crate) async fn guarded<T, F>(
    store: StoreKind,
    timeout: Duration,
    read: F,
) -> Result<T, AnalyticsError>
where
    F: Future<Output = Result<T, SourceError>>,
{
    match tokio::time::timeout(timeout, read).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(AnalyticsError::DataSourceUnavailable { store, source }),
        Err(_) => Err(AnalyticsError::DataSourceUnavailable {
            store,
            source: SourceError::TimedOut(timeout),
        }),
    }
}

/// One half of a composed view: either the store answered, or it is named as degraded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Availability<T> {
    Available(T),
    Unavailable { store: StoreKind, reason: String },
}

impl<T> Availability<T> {
    pub(crate) fn from_result(result: Result<T, AnalyticsError>) -> Result<Self, AnalyticsError> {
        match result {
            Ok(value) => Ok(Self::Available(value)),
            Err(AnalyticsError::DataSourceUnavailable { store, source }) => {
                tracing::warn!(%store, error = %source, "store degraded, composing partial result");
                Ok(Self::Unavailable {
                    store,
                    reason: source.to_string(),
                })
            }
            Err(other) => Err(other),
        }
    }

    pub fn available(&self) -> Option<&T> {
        match self {
            Availability::Available(value) => Some(value),
            Availability::Unavailable { .. } => None,
        }
    }

    pub fn degraded_store(&self) -> Option<StoreKind> {
        match self {
            Availability::Available(_) => None,
            Availability::Unavailable { store, .. } => Some(*store),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guarded_tags_failures_with_store() {
        let err = guarded::<(), _>(StoreKind::Document, Duration::from_secs(1), async {
            Err(SourceError::Unavailable("connection refused".to_string()))
        })
        .await
        .expect_err("failure propagates");

        assert_eq!(err.failed_store(), Some(StoreKind::Document));
        assert!(err.to_string().contains("document store unavailable"));
    }

    #[tokio::test]
    async fn guarded_turns_deadline_into_unavailable() {
        let err = guarded(StoreKind::Structured, Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, SourceError>(1)
        })
        .await
        .expect_err("deadline exceeded");

        match err {
            AnalyticsError::DataSourceUnavailable {
                store: StoreKind::Structured,
                source: SourceError::TimedOut(limit),
            } => assert_eq!(limit, Duration::from_millis(20)),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn availability_keeps_invalid_input_as_error() {
        let result: Result<Availability<u8>, _> =
            Availability::from_result(Err(AnalyticsError::invalid("bad window")));
        assert!(matches!(result, Err(AnalyticsError::InvalidInput(_))));
    }

    #[test]
    fn unavailable_serializes_with_store_name() {
        let section: Availability<u8> = Availability::Unavailable {
            store: StoreKind::Document,
            reason: "timed out".to_string(),
        };
        let value = serde_json::to_value(&section).expect("serializes");
        assert_eq!(value["status"], "unavailable");
        assert_eq!(value["data"]["store"], "document");
    }
}
