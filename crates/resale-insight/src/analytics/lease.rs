use std::fmt;

use serde::Serialize;

use super::error::AnalyticsError;
use super::window::YearMonth;

/// Length of a resale flat lease.
pub const LEASE_TERM_YEARS: i64 = 99;

/// Months left on the lease when the transaction happened.
///
/// `(lease_start_year + 99 - transaction_year) * 12 - transaction_month + 12`,
/// floored at zero: a sale after expiry reports 0 rather than failing.
pub fn remaining_lease_months(
    lease_start_year: i32,
    transaction_year: i32,
    transaction_month: u32,
) -> Result<u32, AnalyticsError> {
    let month = YearMonth::new(transaction_year, transaction_month)?;
    RemainingLease::at(lease_start_year, month).map(RemainingLease::months)
}

/// Derived lease duration for a transaction. Only constructed from its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RemainingLease(u32);

impl RemainingLease {
    pub fn at(lease_start_year: i32, month: YearMonth) -> Result<Self, AnalyticsError> {
        if lease_start_year < 0 {
            return Err(AnalyticsError::invalid(format!(
                "lease start year must not be negative, got {lease_start_year}"
            )));
        }

        let raw = (i64::from(lease_start_year) + LEASE_TERM_YEARS - i64::from(month.year())) * 12
            - i64::from(month.month())
            + 12;
        let months = u32::try_from(raw.max(0)).unwrap_or(u32::MAX);
        Ok(Self(months))
    }

    pub fn months(self) -> u32 {
        self.0
    }

    pub fn years_and_months(self) -> (u32, u32) {
        (self.0 / 12, self.0 % 12)
    }

    pub fn is_expired(self) -> bool {
        self.0 == 0
    }
}

/// Same layout as the resale dataset's `remaining_lease` column.
impl fmt::Display for RemainingLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (years, months) = self.years_and_months();
        write!(f, "{years} years {months:02} months")
    }
}
