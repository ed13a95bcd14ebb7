//! Summary table operations
//!
//! Every write is an upsert on the table's natural key, so recomputing a
//! summary overwrites rows in place instead of adding new ones.

use rusqlite::{params, Row};

use super::{format_datetime, parse_date, parse_datetime, parse_decimal, Database, DATE_FORMAT};
use crate::error::Result;
use crate::models::{CategorySummary, MonthlySummary, SavingsRateSummary};

fn row_to_monthly(row: &Row) -> rusqlite::Result<MonthlySummary> {
    let month: String = row.get(0)?;
    let expenses: String = row.get(1)?;
    let earnings: String = row.get(2)?;
    let savings: String = row.get(3)?;
    let net: String = row.get(4)?;
    let computed_at: String = row.get(6)?;
    Ok(MonthlySummary {
        transaction_month: parse_date(&month)?,
        total_expenses: parse_decimal(&expenses)?,
        total_earnings: parse_decimal(&earnings)?,
        total_savings: parse_decimal(&savings)?,
        net_total: parse_decimal(&net)?,
        transaction_count: row.get(5)?,
        computed_at: parse_datetime(&computed_at),
    })
}

fn row_to_category(row: &Row) -> rusqlite::Result<CategorySummary> {
    let month: String = row.get(0)?;
    let total: String = row.get(2)?;
    let computed_at: String = row.get(4)?;
    Ok(CategorySummary {
        transaction_month: parse_date(&month)?,
        category: row.get(1)?,
        total_amount: parse_decimal(&total)?,
        transaction_count: row.get(3)?,
        computed_at: parse_datetime(&computed_at),
    })
}

fn row_to_savings(row: &Row) -> rusqlite::Result<SavingsRateSummary> {
    let month: String = row.get(0)?;
    let rate: String = row.get(1)?;
    let computed_at: String = row.get(2)?;
    Ok(SavingsRateSummary {
        transaction_month: parse_date(&month)?,
        savings_rate: parse_decimal(&rate)?,
        computed_at: parse_datetime(&computed_at),
    })
}

impl Database {
    /// Insert or overwrite the monthly summary for its month
    pub fn upsert_monthly_summary(&self, summary: &MonthlySummary) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO monthly_summary (transaction_month, total_expenses, total_earnings, total_savings,
                                         net_total, transaction_count, computed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(transaction_month) DO UPDATE SET
                total_expenses = excluded.total_expenses,
                total_earnings = excluded.total_earnings,
                total_savings = excluded.total_savings,
                net_total = excluded.net_total,
                transaction_count = excluded.transaction_count,
                computed_at = excluded.computed_at
            "#,
            params![
                summary.transaction_month.format(DATE_FORMAT).to_string(),
                summary.total_expenses.to_string(),
                summary.total_earnings.to_string(),
                summary.total_savings.to_string(),
                summary.net_total.to_string(),
                summary.transaction_count,
                format_datetime(&summary.computed_at),
            ],
        )?;
        Ok(())
    }

    /// Insert or overwrite the summary for one (month, category)
    pub fn upsert_category_summary(&self, summary: &CategorySummary) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO category_summary (transaction_month, category, total_amount, transaction_count, computed_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(transaction_month, category) DO UPDATE SET
                total_amount = excluded.total_amount,
                transaction_count = excluded.transaction_count,
                computed_at = excluded.computed_at
            "#,
            params![
                summary.transaction_month.format(DATE_FORMAT).to_string(),
                summary.category,
                summary.total_amount.to_string(),
                summary.transaction_count,
                format_datetime(&summary.computed_at),
            ],
        )?;
        Ok(())
    }

    /// Insert or overwrite the savings rate for its month
    pub fn upsert_savings_rate(&self, summary: &SavingsRateSummary) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO savings_rate_summary (transaction_month, savings_rate, computed_at)
            VALUES (?, ?, ?)
            ON CONFLICT(transaction_month) DO UPDATE SET
                savings_rate = excluded.savings_rate,
                computed_at = excluded.computed_at
            "#,
            params![
                summary.transaction_month.format(DATE_FORMAT).to_string(),
                summary.savings_rate.to_string(),
                format_datetime(&summary.computed_at),
            ],
        )?;
        Ok(())
    }

    pub fn list_monthly_summaries(&self) -> Result<Vec<MonthlySummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT transaction_month, total_expenses, total_earnings, total_savings,
                   net_total, transaction_count, computed_at
            FROM monthly_summary
            ORDER BY transaction_month
            "#,
        )?;
        let rows = stmt
            .query_map([], row_to_monthly)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_category_summaries(&self) -> Result<Vec<CategorySummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT transaction_month, category, total_amount, transaction_count, computed_at
            FROM category_summary
            ORDER BY transaction_month, category
            "#,
        )?;
        let rows = stmt
            .query_map([], row_to_category)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_savings_rates(&self) -> Result<Vec<SavingsRateSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT transaction_month, savings_rate, computed_at
            FROM savings_rate_summary
            ORDER BY transaction_month
            "#,
        )?;
        let rows = stmt
            .query_map([], row_to_savings)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
