//! Monthly expenses / earnings / savings rollup

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use super::{add_amount, month_start, Aggregation, AggregationContext, AggregationKind};
use crate::config::SummaryLabels;
use crate::error::Result;
use crate::models::{AcceptedRecord, MonthlySummary};

/// Sums accepted amounts per month by the configured category labels
pub struct MonthlySummaryAggregation;

/// Build one summary per month present in `records`, oldest month first
pub fn summarize_months(
    records: &[AcceptedRecord],
    labels: &SummaryLabels,
    computed_at: DateTime<Utc>,
) -> Result<Vec<MonthlySummary>> {
    let mut months: BTreeMap<NaiveDate, MonthlySummary> = BTreeMap::new();

    for record in records {
        let month = month_start(record.transaction_date);
        let summary = months.entry(month).or_insert_with(|| MonthlySummary {
            transaction_month: month,
            total_expenses: Decimal::ZERO,
            total_earnings: Decimal::ZERO,
            total_savings: Decimal::ZERO,
            net_total: Decimal::ZERO,
            transaction_count: 0,
            computed_at,
        });

        let bucket = match record.category.as_deref() {
            Some(c) if c == labels.expenses => Some(&mut summary.total_expenses),
            Some(c) if c == labels.earnings => Some(&mut summary.total_earnings),
            Some(c) if c == labels.savings => Some(&mut summary.total_savings),
            _ => None,
        };
        if let Some(total) = bucket {
            add_amount(total, record.amount, month)?;
        }
        add_amount(&mut summary.net_total, record.amount, month)?;
        summary.transaction_count += 1;
    }

    Ok(months.into_values().collect())
}

impl Aggregation for MonthlySummaryAggregation {
    fn id(&self) -> AggregationKind {
        AggregationKind::MonthlySummary
    }

    fn name(&self) -> &'static str {
        "Monthly summary"
    }

    fn run(&self, ctx: &AggregationContext<'_>) -> Result<usize> {
        let records = ctx.db.list_accepted_records()?;
        let summaries = summarize_months(&records, ctx.labels, ctx.computed_at)?;

        for summary in &summaries {
            ctx.db.upsert_monthly_summary(summary)?;
        }

        debug!(
            months = summaries.len(),
            records = records.len(),
            "Monthly summary computed"
        );
        Ok(summaries.len())
    }
}
