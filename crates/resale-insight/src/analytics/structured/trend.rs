//! Month-by-month price series behind the trend and volume charts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::PriceObservation;
use crate::analytics::stats::PriceBand;
use crate::analytics::town::TownKey;
use crate::analytics::window::{MonthWindow, YearMonth};

/// Optional second grouping key next to the month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendBreakdown {
    #[default]
    None,
    Town,
    FlatType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyPricePoint {
    pub month: YearMonth,
    /// Town key or flat type, depending on the breakdown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub transaction_count: usize,
    pub median_price: Option<f64>,
    pub median_price_per_sqm: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceTrend {
    pub window: MonthWindow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub town: Option<TownKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flat_type: Option<String>,
    pub breakdown: TrendBreakdown,
    pub points: Vec<MonthlyPricePoint>,
}

fn point(month: YearMonth, group: Option<String>, rows: &[PriceObservation]) -> MonthlyPricePoint {
    let prices = rows.iter().map(|row| row.price).collect();
    let per_sqm = rows
        .iter()
        .filter(|row| row.floor_area_sqm > 0.0)
        .map(|row| row.price / row.floor_area_sqm)
        .collect();

    MonthlyPricePoint {
        month,
        group,
        transaction_count: rows.len(),
        median_price: PriceBand::from_unsorted(prices).map(|band| band.median),
        median_price_per_sqm: PriceBand::from_unsorted(per_sqm).map(|band| band.median),
    }
}

/// Groups observations by month, and by town or flat type when asked.
///
/// Without a breakdown every month of the window gets a point, so quiet months
/// show up as a zero count with empty medians. With a breakdown only observed
/// (month, group) pairs are returned, ordered by month then group.
pub fn monthly_trend(
    observations: Vec<PriceObservation>,
    window: MonthWindow,
    breakdown: TrendBreakdown,
) -> Vec<MonthlyPricePoint> {
    let mut grouped: BTreeMap<(YearMonth, Option<String>), Vec<PriceObservation>> =
        BTreeMap::new();
    for observation in observations {
        if !window.contains(observation.month) {
            continue;
        }
        let group = match breakdown {
            TrendBreakdown::None => None,
            TrendBreakdown::Town => Some(observation.town.as_str().to_string()),
            TrendBreakdown::FlatType => Some(observation.flat_type.clone()),
        };
        grouped
            .entry((observation.month, group))
            .or_default()
            .push(observation);
    }

    match breakdown {
        TrendBreakdown::None => window
            .months()
            .map(|month| {
                let rows = grouped.remove(&(month, None)).unwrap_or_default();
                point(month, None, &rows)
            })
            .collect(),
        TrendBreakdown::Town | TrendBreakdown::FlatType => grouped
            .into_iter()
            .map(|((month, group), rows)| point(month, group, &rows))
            .collect(),
    }
}
