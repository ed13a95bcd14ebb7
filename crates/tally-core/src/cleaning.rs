//! Per-row cleaning chain
//!
//! Cleaners turn a row's text cells into typed values in place. They run in
//! declared order; the first failure stops the chain for that row only and
//! leaves the row holding whatever earlier cleaners produced, so the caller
//! can store it as a rejected record.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::trace;

use crate::error::CleaningError;
use crate::models::{
    AmountFormat, FieldValue, FileConfig, RawRecord, COL_AMOUNT, COL_DATE, TEXT_COLUMNS,
};

type CleanResult = std::result::Result<(), CleaningError>;

/// A single value transform applied to every row
pub trait Cleaner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Transform `row` in place
    ///
    /// On error this cleaner's own change is not applied. Changes made by
    /// earlier cleaners in the chain stay on the row.
    fn clean(&self, row: &mut RawRecord) -> CleanResult;
}

/// Trims whitespace around free-text cells
pub struct TrimCleaner;

impl Cleaner for TrimCleaner {
    fn name(&self) -> &'static str {
        "trim"
    }

    fn clean(&self, row: &mut RawRecord) -> CleanResult {
        for column in TEXT_COLUMNS {
            if let Some(FieldValue::Text(value)) = row.fields.get_mut(column) {
                let trimmed = value.trim();
                if trimmed.len() != value.len() {
                    *value = trimmed.to_string();
                }
            }
        }
        Ok(())
    }
}

/// Parses the transaction date with the configured pattern
pub struct DateCleaner {
    format: String,
}

impl DateCleaner {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }
}

impl Cleaner for DateCleaner {
    fn name(&self) -> &'static str {
        "date"
    }

    fn clean(&self, row: &mut RawRecord) -> CleanResult {
        if row.date(COL_DATE).is_some() {
            return Ok(());
        }
        let raw = row
            .non_empty_text(COL_DATE)
            .ok_or_else(|| CleaningError::Missing(COL_DATE.to_string()))?;

        let date = NaiveDate::parse_from_str(raw, &self.format).map_err(|_| {
            CleaningError::Date {
                value: raw.to_string(),
                format: self.format.clone(),
            }
        })?;
        row.set(COL_DATE, FieldValue::Date(date));
        Ok(())
    }
}

/// Normalizes separators and sign of the amount and parses it exactly
pub struct AmountCleaner {
    format: AmountFormat,
    decimal_separator: char,
    sign: Decimal,
}

impl AmountCleaner {
    pub fn from_config(config: &FileConfig) -> Self {
        Self {
            format: config.amount_format,
            decimal_separator: config.decimal_separator,
            sign: config.sign(),
        }
    }
}

impl Cleaner for AmountCleaner {
    fn name(&self) -> &'static str {
        "amount"
    }

    fn clean(&self, row: &mut RawRecord) -> CleanResult {
        if row.amount(COL_AMOUNT).is_some() {
            return Ok(());
        }
        let raw = row
            .non_empty_text(COL_AMOUNT)
            .ok_or_else(|| CleaningError::Missing(COL_AMOUNT.to_string()))?;

        let amount = parse_amount(raw, self.format, self.decimal_separator)? * self.sign;
        row.set(COL_AMOUNT, FieldValue::Amount(amount));
        Ok(())
    }
}

/// Parse an amount string into a decimal, without applying any sign multiplier
///
/// `Heuristic`: with both `,` and `.` present the later one is the decimal
/// mark; a lone `,` is grouping. `Explicit`: `decimal_separator` is the
/// decimal mark and the other of `,`/`.` is grouping. Spaces and apostrophes
/// are always treated as grouping.
pub fn parse_amount(
    raw: &str,
    format: AmountFormat,
    decimal_separator: char,
) -> std::result::Result<Decimal, CleaningError> {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'')
        .collect();

    let decimal_mark = match format {
        AmountFormat::Heuristic => match (compact.rfind(','), compact.rfind('.')) {
            (Some(comma), Some(dot)) if comma > dot => ',',
            _ => '.',
        },
        AmountFormat::Explicit => decimal_separator,
    };
    let grouping = if decimal_mark == ',' { '.' } else { ',' };

    let normalized: String = compact
        .chars()
        .filter(|c| *c != grouping)
        .map(|c| if c == decimal_mark { '.' } else { c })
        .collect();
    let normalized = normalized.strip_prefix('+').unwrap_or(&normalized);

    if normalized.is_empty() {
        return Err(CleaningError::Amount(raw.to_string()));
    }
    Decimal::from_str(normalized).map_err(|_| CleaningError::Amount(raw.to_string()))
}

/// Ordered list of cleaners
#[derive(Default)]
pub struct CleaningChain {
    cleaners: Vec<Box<dyn Cleaner>>,
}

impl CleaningChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a cleaner to the end of the chain
    pub fn with(mut self, cleaner: impl Cleaner + 'static) -> Self {
        self.cleaners.push(Box::new(cleaner));
        self
    }

    /// Standard chain: trim, date, amount
    pub fn for_config(config: &FileConfig) -> Self {
        Self::new()
            .with(TrimCleaner)
            .with(DateCleaner::new(config.date_format.clone()))
            .with(AmountCleaner::from_config(config))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.cleaners.iter().map(|c| c.name()).collect()
    }

    /// Run every cleaner over `row`, stopping at the first failure
    pub fn apply(&self, row: &mut RawRecord) -> CleanResult {
        for cleaner in &self.cleaners {
            if let Err(e) = cleaner.clean(row) {
                trace!(line = row.line, cleaner = cleaner.name(), error = %e, "Cleaning failed");
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewFileConfig, COL_DESCRIPTION};

    fn config(sign: i32) -> FileConfig {
        let mut new = NewFileConfig::for_pattern(".*");
        new.amount_sign = sign;
        FileConfig::from_new(1, new)
    }

    fn row(date: &str, amount: &str, description: &str) -> RawRecord {
        RawRecord::new(2)
            .with(COL_DATE, date)
            .with(COL_AMOUNT, amount)
            .with(COL_DESCRIPTION, description)
    }

    #[test]
    fn test_european_amount_with_negative_sign() {
        let chain = CleaningChain::for_config(&config(-1));
        let mut r = row("05.01.24", "1.234,56", "rent");
        chain.apply(&mut r).unwrap();
        assert_eq!(r.amount(COL_AMOUNT), Some(Decimal::new(-123456, 2)));
    }

    #[test]
    fn test_us_amount_with_positive_sign() {
        let chain = CleaningChain::for_config(&config(1));
        let mut r = row("05.01.24", "1,234.56", "salary");
        chain.apply(&mut r).unwrap();
        assert_eq!(r.amount(COL_AMOUNT), Some(Decimal::new(123456, 2)));
    }

    #[test]
    fn test_heuristic_lone_comma_is_grouping() {
        assert_eq!(
            parse_amount("1,234", AmountFormat::Heuristic, '.').unwrap(),
            Decimal::from(1234)
        );
        assert_eq!(
            parse_amount("-10.50", AmountFormat::Heuristic, '.').unwrap(),
            Decimal::new(-1050, 2)
        );
        assert_eq!(
            parse_amount("+7", AmountFormat::Heuristic, '.').unwrap(),
            Decimal::from(7)
        );
    }

    #[test]
    fn test_explicit_decimal_comma() {
        assert_eq!(
            parse_amount("-10,50", AmountFormat::Explicit, ',').unwrap(),
            Decimal::new(-1050, 2)
        );
        assert_eq!(
            parse_amount("1 234,5", AmountFormat::Explicit, ',').unwrap(),
            Decimal::new(12345, 1)
        );
        assert_eq!(
            parse_amount("1'234.50", AmountFormat::Explicit, '.').unwrap(),
            Decimal::new(123450, 2)
        );
    }

    #[test]
    fn test_unparseable_amount() {
        assert_eq!(
            parse_amount("abc", AmountFormat::Heuristic, '.'),
            Err(CleaningError::Amount("abc".to_string()))
        );
        assert!(parse_amount("+", AmountFormat::Heuristic, '.').is_err());
    }

    #[test]
    fn test_trim_then_date() {
        let chain = CleaningChain::for_config(&config(1));
        let mut r = row(" 05.01.24 ", "3", "  coffee  ");
        chain.apply(&mut r).unwrap();
        assert_eq!(r.text(COL_DESCRIPTION), Some("coffee"));
        assert_eq!(
            r.date(COL_DATE),
            Some(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())
        );
    }

    #[test]
    fn test_failure_keeps_pre_failure_values() {
        let chain = CleaningChain::for_config(&config(1));
        let mut r = row("05.01.24", "ten", " coffee ");
        let err = chain.apply(&mut r).unwrap_err();

        assert_eq!(err, CleaningError::Amount("ten".to_string()));
        // trim and date already applied, amount untouched
        assert_eq!(r.render(COL_DESCRIPTION).as_deref(), Some("coffee"));
        assert_eq!(r.render(COL_DATE).as_deref(), Some("2024-01-05"));
        assert_eq!(r.render(COL_AMOUNT).as_deref(), Some("ten"));
    }

    #[test]
    fn test_missing_date() {
        let chain = CleaningChain::for_config(&config(1));
        let mut r = RawRecord::new(4).with(COL_AMOUNT, "1");
        assert_eq!(
            chain.apply(&mut r),
            Err(CleaningError::Missing(COL_DATE.to_string()))
        );
    }

    #[test]
    fn test_chain_order() {
        let chain = CleaningChain::for_config(&config(1));
        assert_eq!(chain.names(), vec!["trim", "date", "amount"]);
    }
}
