//! Read-only commands: files, rejected rows, summary tables

use anyhow::{anyhow, Result};
use chrono::Local;
use tally_core::{db::Database, models::FileStatus};

use super::{print_json, truncate};

/// Summary table to display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
    Monthly,
    Category,
    Savings,
}

impl std::str::FromStr for SummaryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "monthly" => Ok(Self::Monthly),
            "category" | "categories" => Ok(Self::Category),
            "savings" | "savings_rate" => Ok(Self::Savings),
            _ => Err(format!(
                "Unknown summary: {} (expected monthly, category or savings)",
                s
            )),
        }
    }
}

pub fn cmd_files(db: &Database, status: Option<&str>, json: bool) -> Result<()> {
    let status: Option<FileStatus> = status
        .map(|s| s.parse().map_err(|e: String| anyhow!(e)))
        .transpose()?;
    let files = db.list_files(status)?;

    if json {
        return print_json(&files);
    }

    if files.is_empty() {
        println!("No files uploaded yet.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<28}  {:>6}  {:<20}  {}",
        "ID", "NAME", "ROWS", "STATUS", "UPLOADED"
    );
    for file in &files {
        println!(
            "{:<36}  {:<28}  {:>6}  {:<20}  {}",
            file.id,
            truncate(&file.name, 28),
            file.row_count,
            file.status.as_str(),
            file.inserted_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M"),
        );
    }
    Ok(())
}

pub fn cmd_rejected(db: &Database, file_id: &str, json: bool) -> Result<()> {
    if db.get_file(file_id)?.is_none() {
        return Err(anyhow!("File {} not found", file_id));
    }
    let rows = db.list_rejected_for_file(file_id)?;

    if json {
        return print_json(&rows);
    }

    if rows.is_empty() {
        println!("No rejected rows for {}.", file_id);
        return Ok(());
    }

    println!("{:>5}  {:<12}  {:>12}  {:<28}  {}", "LINE", "DATE", "AMOUNT", "DESCRIPTION", "ERROR");
    for row in &rows {
        println!(
            "{:>5}  {:<12}  {:>12}  {:<28}  {}",
            row.source_line,
            row.transaction_date.as_deref().unwrap_or("-"),
            row.amount.as_deref().unwrap_or("-"),
            truncate(row.description.as_deref().unwrap_or("-"), 28),
            row.error_message,
        );
    }
    println!();
    println!("{} rejected rows", rows.len());
    Ok(())
}

pub fn cmd_summary(db: &Database, kind: &str, json: bool) -> Result<()> {
    let kind: SummaryKind = kind.parse().map_err(|e: String| anyhow!(e))?;

    match kind {
        SummaryKind::Monthly => {
            let rows = db.list_monthly_summaries()?;
            if json {
                return print_json(&rows);
            }
            println!(
                "{:<8}  {:>12}  {:>12}  {:>12}  {:>12}  {:>6}",
                "MONTH", "EXPENSES", "EARNINGS", "SAVINGS", "NET", "COUNT"
            );
            for row in &rows {
                println!(
                    "{:<8}  {:>12}  {:>12}  {:>12}  {:>12}  {:>6}",
                    row.transaction_month.format("%Y-%m"),
                    row.total_expenses,
                    row.total_earnings,
                    row.total_savings,
                    row.net_total,
                    row.transaction_count,
                );
            }
        }
        SummaryKind::Category => {
            let rows = db.list_category_summaries()?;
            if json {
                return print_json(&rows);
            }
            println!("{:<8}  {:<24}  {:>12}  {:>6}", "MONTH", "CATEGORY", "TOTAL", "COUNT");
            for row in &rows {
                println!(
                    "{:<8}  {:<24}  {:>12}  {:>6}",
                    row.transaction_month.format("%Y-%m"),
                    truncate(&row.category, 24),
                    row.total_amount,
                    row.transaction_count,
                );
            }
        }
        SummaryKind::Savings => {
            let rows = db.list_savings_rates()?;
            if json {
                return print_json(&rows);
            }
            println!("{:<8}  {:>8}", "MONTH", "RATE");
            for row in &rows {
                println!(
                    "{:<8}  {:>8}",
                    row.transaction_month.format("%Y-%m"),
                    row.savings_rate,
                );
            }
        }
    }
    Ok(())
}
