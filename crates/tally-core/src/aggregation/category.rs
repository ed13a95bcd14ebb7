//! Per month and category rollup

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use super::{add_amount, month_start, Aggregation, AggregationContext, AggregationKind};
use crate::error::Result;
use crate::models::{AcceptedRecord, CategorySummary};

pub struct CategorySummaryAggregation;

/// One summary per (month, category); rows without a category go to `uncategorized`
pub fn summarize_categories(
    records: &[AcceptedRecord],
    uncategorized: &str,
    computed_at: DateTime<Utc>,
) -> Result<Vec<CategorySummary>> {
    let mut groups: BTreeMap<(NaiveDate, String), (Decimal, i64)> = BTreeMap::new();

    for record in records {
        let category = record
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(uncategorized);
        let month = month_start(record.transaction_date);
        let entry = groups
            .entry((month, category.to_string()))
            .or_insert((Decimal::ZERO, 0));
        add_amount(&mut entry.0, record.amount, month)?;
        entry.1 += 1;
    }

    Ok(groups
        .into_iter()
        .map(|((month, category), (total, count))| CategorySummary {
            transaction_month: month,
            category,
            total_amount: total,
            transaction_count: count,
            computed_at,
        })
        .collect())
}

impl Aggregation for CategorySummaryAggregation {
    fn id(&self) -> AggregationKind {
        AggregationKind::CategorySummary
    }

    fn name(&self) -> &'static str {
        "Category summary"
    }

    fn run(&self, ctx: &AggregationContext<'_>) -> Result<usize> {
        let records = ctx.db.list_accepted_records()?;
        let summaries =
            summarize_categories(&records, &ctx.labels.uncategorized, ctx.computed_at)?;

        for summary in &summaries {
            ctx.db.upsert_category_summary(summary)?;
        }

        debug!(rows = summaries.len(), "Category summary computed");
        Ok(summaries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(day: u32, amount: i64, category: Option<&str>) -> AcceptedRecord {
        AcceptedRecord {
            id: 0,
            file_id: "f".to_string(),
            source_line: 2,
            transaction_date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            amount: Decimal::from(amount),
            description: "x".to_string(),
            category: category.map(str::to_string),
            account: None,
        }
    }

    #[test]
    fn test_groups_and_uncategorized() {
        let records = vec![
            record(1, -5, Some("Food")),
            record(2, -7, Some("Food")),
            record(3, -900, Some("Rent")),
            record(4, -1, None),
            record(5, -2, Some("  ")),
        ];
        let rows = summarize_categories(&records, "Uncategorized", Utc::now()).unwrap();

        let view: Vec<(&str, Decimal, i64)> = rows
            .iter()
            .map(|r| (r.category.as_str(), r.total_amount, r.transaction_count))
            .collect();
        assert_eq!(
            view,
            vec![
                ("Food", Decimal::from(-12), 2),
                ("Rent", Decimal::from(-900), 1),
                ("Uncategorized", Decimal::from(-3), 2),
            ]
        );
    }

    #[test]
    fn test_overflow_is_an_error() {
        let mut big = record(1, 0, Some("Rent"));
        big.amount = Decimal::MIN;
        let records = vec![big.clone(), big];
        assert!(summarize_categories(&records, "Uncategorized", Utc::now()).is_err());
    }
}
