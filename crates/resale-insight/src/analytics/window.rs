use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::error::AnalyticsError;

/// Calendar month, the granularity of resale transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, AnalyticsError> {
        if year < 0 {
            return Err(AnalyticsError::invalid(format!(
                "year must not be negative, got {year}"
            )));
        }
        if !(1..=12).contains(&month) {
            return Err(AnalyticsError::invalid(format!(
                "month must be within 1..=12, got {month}"
            )));
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    /// Months elapsed since January of year zero.
    pub fn ordinal(self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    fn from_ordinal(ordinal: i64) -> Result<Self, AnalyticsError> {
        let year = i32::try_from(ordinal.div_euclid(12))
            .map_err(|_| AnalyticsError::invalid("month out of range"))?;
        let month = ordinal.rem_euclid(12) as u32 + 1;
        Self::new(year, month)
    }

    pub fn months_before(self, months: u32) -> Result<Self, AnalyticsError> {
        Self::from_ordinal(self.ordinal() - i64::from(months))
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = AnalyticsError;

    /// Accepts `YYYY-MM` and full `YYYY-MM-DD` dates (the day is dropped).
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Ok(Self::from_date(date));
        }

        let malformed = || AnalyticsError::invalid(format!("expected YYYY-MM, got '{raw}'"));
        let (year, month) = trimmed.split_once('-').ok_or_else(malformed)?;
        let year = year.parse::<i32>().map_err(|_| malformed())?;
        let month = month.parse::<u32>().map_err(|_| malformed())?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = AnalyticsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

/// Inclusive range of months a query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthWindow {
    start: YearMonth,
    end: YearMonth,
}

impl MonthWindow {
    pub fn new(start: YearMonth, end: YearMonth) -> Result<Self, AnalyticsError> {
        if start > end {
            return Err(AnalyticsError::invalid(format!(
                "window start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The current month of `today` and the `months` calendar months before it.
    pub fn trailing(months: u32, today: NaiveDate) -> Result<Self, AnalyticsError> {
        if months == 0 {
            return Err(AnalyticsError::invalid("trailing window needs at least one month"));
        }
        let end = YearMonth::from_date(today);
        Self::new(end.months_before(months)?, end)
    }

    pub fn single(month: YearMonth) -> Self {
        Self {
            start: month,
            end: month,
        }
    }

    pub fn start(&self) -> YearMonth {
        self.start
    }

    pub fn end(&self) -> YearMonth {
        self.end
    }

    pub fn contains(&self, month: YearMonth) -> bool {
        self.start <= month && month <= self.end
    }

    /// Every month in the window, oldest first.
    pub fn months(&self) -> impl Iterator<Item = YearMonth> {
        (self.start.ordinal()..=self.end.ordinal())
            .filter_map(|ordinal| YearMonth::from_ordinal(ordinal).ok())
    }
}

impl fmt::Display for MonthWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}
