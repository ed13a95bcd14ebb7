//! Gold stage aggregations
//!
//! Summary tables are filled by routines registered statically in an
//! `AggregationRegistry`. Which routines run, and in what order, comes from
//! the `aggregation_tasks` table; the `AggregationRunner` resolves each
//! active task's routine by identifier and executes them in dependency order.
//!
//! Every routine recomputes its table from scratch and upserts one row per
//! key, so running it twice leaves the same rows with a newer `computed_at`.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::config::SummaryLabels;
use crate::db::Database;
use crate::error::{Error, Result};

mod category;
mod monthly;
mod runner;
mod savings_rate;

pub use category::CategorySummaryAggregation;
pub use monthly::MonthlySummaryAggregation;
pub use runner::{order_tasks, AggregationRunner, GoldReport, TaskResult, TaskState};
pub use savings_rate::SavingsRateAggregation;

/// Identifier of a registered aggregation routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AggregationKind {
    MonthlySummary,
    CategorySummary,
    SavingsRate,
}

impl AggregationKind {
    /// Identifier used in task configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MonthlySummary => "monthly_summary",
            Self::CategorySummary => "category_summary",
            Self::SavingsRate => "savings_rate",
        }
    }

    pub fn all() -> &'static [AggregationKind] {
        &[Self::MonthlySummary, Self::CategorySummary, Self::SavingsRate]
    }
}

impl std::str::FromStr for AggregationKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "monthly_summary" => Ok(Self::MonthlySummary),
            "category_summary" => Ok(Self::CategorySummary),
            "savings_rate" | "savings_rate_summary" => Ok(Self::SavingsRate),
            _ => Err(format!("Unknown aggregation routine: {}", s)),
        }
    }
}

impl std::fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Context handed to each routine for one Gold run
pub struct AggregationContext<'a> {
    pub db: &'a Database,
    pub labels: &'a SummaryLabels,
    /// Shared timestamp stamped on every row written in this run
    pub computed_at: DateTime<Utc>,
}

impl<'a> AggregationContext<'a> {
    pub fn new(db: &'a Database, labels: &'a SummaryLabels) -> Self {
        Self {
            db,
            labels,
            computed_at: Utc::now(),
        }
    }
}

/// A summary table recomputation
pub trait Aggregation: Send + Sync {
    fn id(&self) -> AggregationKind;

    /// Human-readable name
    fn name(&self) -> &'static str;

    /// Recompute and upsert the summary, returning the number of rows written
    fn run(&self, ctx: &AggregationContext<'_>) -> Result<usize>;
}

/// Static set of aggregation routines, keyed by kind
pub struct AggregationRegistry {
    routines: BTreeMap<AggregationKind, Box<dyn Aggregation>>,
}

impl Default for AggregationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregationRegistry {
    /// Create a registry with the built-in routines
    pub fn new() -> Self {
        let mut registry = Self {
            routines: BTreeMap::new(),
        };

        registry.register(Box::new(MonthlySummaryAggregation));
        registry.register(Box::new(CategorySummaryAggregation));
        registry.register(Box::new(SavingsRateAggregation));

        registry
    }

    /// Register a routine, replacing any earlier one with the same kind
    pub fn register(&mut self, routine: Box<dyn Aggregation>) {
        self.routines.insert(routine.id(), routine);
    }

    pub fn get(&self, kind: AggregationKind) -> Option<&dyn Aggregation> {
        self.routines.get(&kind).map(|r| r.as_ref())
    }

    /// Look up a routine by its configured identifier
    pub fn resolve(&self, routine: &str) -> Option<&dyn Aggregation> {
        routine
            .parse::<AggregationKind>()
            .ok()
            .and_then(|kind| self.get(kind))
    }

    pub fn kinds(&self) -> Vec<AggregationKind> {
        self.routines.keys().copied().collect()
    }
}

/// Add `amount` into a running total, failing instead of overflowing
pub(crate) fn add_amount(total: &mut Decimal, amount: Decimal, month: NaiveDate) -> Result<()> {
    *total = total.checked_add(amount).ok_or_else(|| {
        Error::Aggregation(format!(
            "total for {} overflowed adding {}",
            month.format("%Y-%m"),
            amount
        ))
    })?;
    Ok(())
}

/// First day of the month containing `date`
pub(crate) fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_builtins() {
        let registry = AggregationRegistry::new();
        assert_eq!(registry.kinds(), AggregationKind::all().to_vec());
        assert_eq!(
            registry.resolve("monthly_summary").map(|r| r.name()),
            Some("Monthly summary")
        );
        assert!(registry.resolve("weekly_summary").is_none());
    }

    #[test]
    fn test_kind_parse() {
        for kind in AggregationKind::all() {
            assert_eq!(kind.as_str().parse::<AggregationKind>(), Ok(*kind));
        }
        assert_eq!(
            "Savings_Rate_Summary".parse::<AggregationKind>(),
            Ok(AggregationKind::SavingsRate)
        );
    }

    #[test]
    fn test_month_start() {
        assert_eq!(
            month_start(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
        );
    }
}
