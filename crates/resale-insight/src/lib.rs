//! Hybrid analytics over housing resale transactions and town reviews.
//!
//! Resale records live in a structured store, reviews in a document store. The
//! two are only ever joined here, in the application layer, on the normalized
//! town key.

pub mod analytics;
pub mod config;
pub mod error;
pub mod telemetry;
