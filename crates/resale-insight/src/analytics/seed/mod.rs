//! Seed loaders for the public resale dataset and the review export.

mod parser;

use std::io::Read;
use std::path::Path;

use serde::Serialize;
use tracing::warn;

use super::document::{InMemoryReviewStore, NewReview};
use super::error::StoreWriteError;
use super::structured::{InMemoryStructuredStore, NewFlat, NewTransaction};
use super::window::YearMonth;

#[derive(Debug)]
pub enum SeedImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Store(StoreWriteError),
}

impl std::fmt::Display for SeedImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeedImportError::Io(err) => write!(f, "failed to read seed file: {}", err),
            SeedImportError::Csv(err) => write!(f, "invalid seed CSV data: {}", err),
            SeedImportError::Store(err) => write!(f, "could not load seed rows: {}", err),
        }
    }
}

impl std::error::Error for SeedImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SeedImportError::Io(err) => Some(err),
            SeedImportError::Csv(err) => Some(err),
            SeedImportError::Store(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for SeedImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for SeedImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Outcome of one seed file. Rows the store rejects are skipped, not fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub loaded: usize,
    pub skipped: usize,
}

impl SeedSummary {
    fn record(
        &mut self,
        line: u64,
        outcome: Result<(), StoreWriteError>,
    ) -> Result<(), SeedImportError> {
        match outcome {
            Ok(()) => self.loaded += 1,
            Err(StoreWriteError::Poisoned) => {
                return Err(SeedImportError::Store(StoreWriteError::Poisoned))
            }
            Err(err) => {
                warn!(line, error = %err, "skipping seed row");
                self.skipped += 1;
            }
        }
        Ok(())
    }
}

/// Loads the resale price CSV: one flat per (town, street, block), one
/// transaction per row. The dataset's own remaining lease column is ignored
/// and re-derived from the lease commencement year.
pub struct ResaleCsvImporter;

impl ResaleCsvImporter {
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        store: &InMemoryStructuredStore,
    ) -> Result<SeedSummary, SeedImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, store)
    }

    pub fn from_reader<R: Read>(
        reader: R,
        store: &InMemoryStructuredStore,
    ) -> Result<SeedSummary, SeedImportError> {
        let mut summary = SeedSummary::default();
        for (line, row) in parser::parse_rows::<parser::ResaleRow, _>(reader)? {
            summary.record(line, apply_resale_row(row, store))?;
        }
        Ok(summary)
    }
}

fn apply_resale_row(
    row: parser::ResaleRow,
    store: &InMemoryStructuredStore,
) -> Result<(), StoreWriteError> {
    let month: YearMonth = row.month.parse()?;
    let flat_id = store.find_or_insert_flat(NewFlat {
        town: row.town,
        street: row.street_name,
        block: row.block,
        lease_start_year: row.lease_commence_date,
    })?;
    store.insert_transaction(NewTransaction {
        flat_id,
        month,
        price: row.resale_price,
        floor_area_sqm: row.floor_area_sqm,
        flat_type: row.flat_type,
        flat_model: row.flat_model,
        storey_range: row.storey_range,
    })?;
    Ok(())
}

/// Loads the review export, one document per row.
pub struct ReviewCsvImporter;

impl ReviewCsvImporter {
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        store: &InMemoryReviewStore,
    ) -> Result<SeedSummary, SeedImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, store)
    }

    pub fn from_reader<R: Read>(
        reader: R,
        store: &InMemoryReviewStore,
    ) -> Result<SeedSummary, SeedImportError> {
        let mut summary = SeedSummary::default();
        for (line, row) in parser::parse_rows::<parser::ReviewRow, _>(reader)? {
            summary.record(line, apply_review_row(row, store))?;
        }
        Ok(summary)
    }
}

fn apply_review_row(
    row: parser::ReviewRow,
    store: &InMemoryReviewStore,
) -> Result<(), StoreWriteError> {
    let created_at = parser::parse_timestamp(&row.created_at).ok_or_else(|| {
        StoreWriteError::from(super::error::AnalyticsError::invalid(format!(
            "unreadable review timestamp `{}`",
            row.created_at
        )))
    })?;
    store.insert_review(NewReview {
        town: row.town,
        rating: row.rating,
        text: row.review_text.unwrap_or_default(),
        author: row.username,
        created_at,
    })?;
    Ok(())
}
