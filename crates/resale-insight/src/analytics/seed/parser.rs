use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::io::Read;

/// Row of the public resale price dataset.
#[derive(Debug, Deserialize)]
pub(crate) struct ResaleRow {
    pub(crate) month: String,
    pub(crate) town: String,
    pub(crate) flat_type: String,
    pub(crate) block: String,
    pub(crate) street_name: String,
    pub(crate) storey_range: String,
    pub(crate) floor_area_sqm: f64,
    pub(crate) flat_model: String,
    pub(crate) lease_commence_date: i32,
    pub(crate) resale_price: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewRow {
    pub(crate) town: String,
    #[serde(alias = "author")]
    pub(crate) username: String,
    pub(crate) rating: u8,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) review_text: Option<String>,
    pub(crate) created_at: String,
}

/// Deserializes every row, pairing it with its 1-based line number in the file.
pub(crate) fn parse_rows<T, R>(reader: R) -> Result<Vec<(u64, T)>, csv::Error>
where
    T: for<'de> Deserialize<'de>,
    R: Read,
{
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let mut rows = Vec::new();

    for record in csv_reader.records() {
        let record = record?;
        let line = record.position().map(|pos| pos.line()).unwrap_or_default();
        let row: T = record.deserialize(Some(&headers))?;
        rows.push((line, row));
    }

    Ok(rows)
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS` (taken as UTC) or a bare date.
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
