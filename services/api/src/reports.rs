use crate::infra::{parse_date, parse_month, seeded_service};
use chrono::{Local, NaiveDate};
use clap::Args;
use resale_insight::analytics::profile::TownProfile;
use resale_insight::analytics::{
    Availability, MonthWindow, RankingRequest, RatingStatus, RemainingLease, TownRanking,
    YearMonth,
};
use resale_insight::config::AppConfig;
use resale_insight::error::AppError;
use std::fmt::{self, Write as _};

#[derive(Args, Debug)]
pub(crate) struct RankArgs {
    /// First month of the window (YYYY-MM)
    #[arg(long, value_parser = parse_month)]
    pub(crate) from: YearMonth,
    /// Last month of the window, inclusive (YYYY-MM)
    #[arg(long, value_parser = parse_month)]
    pub(crate) to: YearMonth,
    /// Restrict to one flat type, e.g. "4 ROOM"
    #[arg(long)]
    pub(crate) flat_type: Option<String>,
    /// Override the configured minimum number of transactions per town
    #[arg(long)]
    pub(crate) min_transactions: Option<usize>,
}

#[derive(Args, Debug)]
pub(crate) struct ProfileArgs {
    /// Town name in any casing
    #[arg(long)]
    pub(crate) town: String,
    /// Trailing months before the current month (defaults to configuration)
    #[arg(long)]
    pub(crate) months: Option<u32>,
    /// Restrict prices to one flat type
    #[arg(long)]
    pub(crate) flat_type: Option<String>,
    /// Override the reporting date (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub(crate) struct LeaseArgs {
    /// Year the 99-year lease commenced
    #[arg(long)]
    pub(crate) lease_start_year: i32,
    /// Transaction month (YYYY-MM)
    #[arg(long, value_parser = parse_month)]
    pub(crate) month: YearMonth,
}

pub(crate) async fn run_rank(args: RankArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let service = seeded_service(&config)?;
    let ranking = service
        .rank(RankingRequest {
            window: MonthWindow::new(args.from, args.to)?,
            flat_type: args.flat_type,
            min_transactions: args.min_transactions,
        })
        .await?;

    print!("{}", render_ranking(&ranking).map_err(report_error)?);
    Ok(())
}

pub(crate) async fn run_profile(args: ProfileArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let service = seeded_service(&config)?;
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let profile = service
        .profile(&args.town, args.months, args.flat_type, today)
        .await?;

    print!("{}", render_profile(&profile).map_err(report_error)?);
    Ok(())
}

pub(crate) fn run_lease(args: LeaseArgs) -> Result<(), AppError> {
    let remaining = RemainingLease::at(args.lease_start_year, args.month)?;
    println!(
        "Lease from {} at {}: {} ({} months)",
        args.lease_start_year,
        args.month,
        remaining,
        remaining.months()
    );
    Ok(())
}

fn report_error(err: fmt::Error) -> AppError {
    AppError::Io(std::io::Error::other(err))
}

fn rating_label(average: Option<f64>, status: RatingStatus) -> String {
    match (average, status) {
        (Some(average), _) => format!("{average:.2}"),
        (None, RatingStatus::Unavailable) => "unavailable".to_string(),
        (None, _) => "no reviews yet".to_string(),
    }
}

pub(crate) fn render_ranking(ranking: &TownRanking) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "Town ranking for {}", ranking.window)?;
    if let Some(flat_type) = &ranking.flat_type {
        writeln!(out, "  Flat type: {flat_type}")?;
    }
    if let Some(store) = ranking.degraded {
        writeln!(out, "  Warning: {store} store unavailable, ratings omitted")?;
    }

    if ranking.towns.is_empty() {
        writeln!(out, "  No towns with transactions in this window")?;
    }
    for town in &ranking.towns {
        writeln!(
            out,
            "  {:>2}. {:<20} score {:.3}  median ${:.0} ({} sales)  rating {}",
            town.rank,
            town.town.as_str(),
            town.score,
            town.median_price,
            town.transaction_count,
            rating_label(town.average_rating, town.rating_status)
        )?;
    }

    if !ranking.excluded.is_empty() {
        let names: Vec<&str> = ranking.excluded.iter().map(|t| t.town.as_str()).collect();
        writeln!(out, "  Excluded: {}", names.join(", "))?;
    }
    Ok(out)
}

pub(crate) fn render_profile(profile: &TownProfile) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "{} ({})", profile.town, profile.window)?;

    match &profile.pricing {
        Availability::Available(pricing) => match pricing.median_price {
            Some(median) => {
                writeln!(
                    out,
                    "  Prices: median ${median:.0}, {} transactions",
                    pricing.transaction_count
                )?;
                if let (Some(p25), Some(p75)) = (pricing.p25_price, pricing.p75_price) {
                    writeln!(out, "  Interquartile range: ${p25:.0} - ${p75:.0}")?;
                }
                if let Some(per_sqm) = pricing.avg_price_per_sqm {
                    writeln!(out, "  Average per sqm: ${per_sqm:.0}")?;
                }
            }
            None => writeln!(out, "  Prices: no transactions in window")?,
        },
        Availability::Unavailable { store, reason } => {
            writeln!(out, "  Prices: {store} store unavailable ({reason})")?;
        }
    }

    match &profile.sentiment {
        Availability::Available(sentiment) => {
            match sentiment.average_rating {
                Some(average) => writeln!(
                    out,
                    "  Rating: {average:.2} from {} reviews",
                    sentiment.review_count
                )?,
                None => writeln!(out, "  Rating: no reviews yet")?,
            }
            for review in &sentiment.recent_reviews {
                writeln!(
                    out,
                    "    - [{}] {}/5 {}: {}",
                    review.created_at.format("%Y-%m-%d"),
                    review.rating,
                    review.author,
                    review.text
                )?;
            }
        }
        Availability::Unavailable { store, reason } => {
            writeln!(out, "  Rating: {store} store unavailable ({reason})")?;
        }
    }
    Ok(out)
}
