//! Savings rate per month, derived from the monthly summary

use rust_decimal::Decimal;
use tracing::debug;

use super::{Aggregation, AggregationContext, AggregationKind};
use crate::error::{Error, Result};
use crate::models::{MonthlySummary, SavingsRateSummary};

/// Reads `monthly_summary`, so its task should depend on that one
pub struct SavingsRateAggregation;

/// Savings divided by earnings, 4 decimal places; zero when there were no earnings
pub fn savings_rate(total_savings: Decimal, total_earnings: Decimal) -> Result<Decimal> {
    if total_earnings.is_zero() {
        return Ok(Decimal::ZERO);
    }
    total_savings
        .checked_div(total_earnings)
        .map(|rate| rate.round_dp(4))
        .ok_or_else(|| {
            Error::Aggregation(format!(
                "savings rate {} / {} overflowed",
                total_savings, total_earnings
            ))
        })
}

impl Aggregation for SavingsRateAggregation {
    fn id(&self) -> AggregationKind {
        AggregationKind::SavingsRate
    }

    fn name(&self) -> &'static str {
        "Savings rate"
    }

    fn run(&self, ctx: &AggregationContext<'_>) -> Result<usize> {
        let months: Vec<MonthlySummary> = ctx.db.list_monthly_summaries()?;

        for month in &months {
            ctx.db.upsert_savings_rate(&SavingsRateSummary {
                transaction_month: month.transaction_month,
                savings_rate: savings_rate(month.total_savings, month.total_earnings)?,
                computed_at: ctx.computed_at,
            })?;
        }

        debug!(months = months.len(), "Savings rate computed");
        Ok(months.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_earnings_is_zero() {
        assert_eq!(
            savings_rate(Decimal::from(500), Decimal::ZERO).unwrap(),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_rate_is_rounded() {
        assert_eq!(
            savings_rate(Decimal::from(1000), Decimal::from(3000)).unwrap(),
            Decimal::new(3333, 4)
        );
        assert_eq!(
            savings_rate(Decimal::from(500), Decimal::from(2000)).unwrap(),
            Decimal::new(25, 2)
        );
    }

    #[test]
    fn test_overflowing_ratio_is_an_error() {
        let savings = Decimal::from_i128_with_scale(10_000_000_000_000_000_000_000_000, 0);
        let earnings = Decimal::new(1, 6);
        assert!(matches!(
            savings_rate(savings, earnings),
            Err(Error::Aggregation(_))
        ));
    }
}
