//! Batch validators
//!
//! Validators look at the whole raw batch at once so they can compare rows
//! with each other. Each returns one verdict per row plus a single message
//! that is attached to every row it marked invalid. The pipeline ANDs the
//! verdicts and joins the messages of rows that fail several checks.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::cleaning::parse_amount;
use crate::models::{
    AmountFormat, FileConfig, RawRecord, COL_ACCOUNT, COL_AMOUNT, COL_DATE, COL_DESCRIPTION,
};

pub const DUPLICATE_MESSAGE: &str = "Duplicate entry found.";
pub const DATE_FORMAT_MESSAGE: &str = "Invalid date format found.";
pub const TRANSFER_MESSAGE: &str = "Internal transfer between own accounts.";

/// Verdicts of one validator over a batch
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    /// One entry per input row, `true` when the row passed
    pub valid: Vec<bool>,
    /// Reason attached to every row that failed
    pub message: String,
}

impl ValidationOutcome {
    pub fn all_valid(len: usize, message: &str) -> Self {
        Self {
            valid: vec![true; len],
            message: message.to_string(),
        }
    }

    pub fn invalid_count(&self) -> usize {
        self.valid.iter().filter(|v| !**v).count()
    }
}

/// A predicate over a whole batch of raw rows
pub trait BatchValidator: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, rows: &[RawRecord]) -> ValidationOutcome;
}

/// Marks every repeat of a (date, amount, description) triple after the first
///
/// Dates and amounts are compared by value, so `-10.00` and `-10` on the
/// same day are the same entry. A field that does not parse is compared by
/// its trimmed text.
#[derive(Debug)]
pub struct DuplicateDetector {
    date_format: String,
    amount_format: AmountFormat,
    decimal_separator: char,
}

impl DuplicateDetector {
    pub fn from_config(config: &FileConfig) -> Self {
        Self {
            date_format: config.date_format.clone(),
            amount_format: config.amount_format,
            decimal_separator: config.decimal_separator,
        }
    }
}

impl BatchValidator for DuplicateDetector {
    fn name(&self) -> &'static str {
        "duplicate"
    }

    fn validate(&self, rows: &[RawRecord]) -> ValidationOutcome {
        type Key<'a> = (
            Result<NaiveDate, &'a str>,
            Result<Decimal, &'a str>,
            &'a str,
        );

        let mut seen: HashSet<Key<'_>> = HashSet::with_capacity(rows.len());
        let valid = rows
            .iter()
            .map(|row| {
                let date = row.text(COL_DATE).map(str::trim).unwrap_or("");
                let amount = row.text(COL_AMOUNT).map(str::trim).unwrap_or("");
                let key = (
                    NaiveDate::parse_from_str(date, &self.date_format).map_err(|_| date),
                    parse_amount(amount, self.amount_format, self.decimal_separator)
                        .map(|a| a.normalize())
                        .map_err(|_| amount),
                    row.text(COL_DESCRIPTION).map(str::trim).unwrap_or(""),
                );
                seen.insert(key)
            })
            .collect();

        ValidationOutcome {
            valid,
            message: DUPLICATE_MESSAGE.to_string(),
        }
    }
}

/// Marks rows whose date is missing or does not match the configured pattern
#[derive(Debug)]
pub struct DateFormatValidator {
    format: String,
}

impl DateFormatValidator {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }
}

impl BatchValidator for DateFormatValidator {
    fn name(&self) -> &'static str {
        "date_format"
    }

    fn validate(&self, rows: &[RawRecord]) -> ValidationOutcome {
        let valid = rows
            .iter()
            .map(|row| {
                row.non_empty_text(COL_DATE)
                    .map(|raw| NaiveDate::parse_from_str(raw, &self.format).is_ok())
                    .unwrap_or(false)
            })
            .collect();

        ValidationOutcome {
            valid,
            message: DATE_FORMAT_MESSAGE.to_string(),
        }
    }
}

/// Marks the outgoing side of transfers between the user's own accounts
///
/// Rows are grouped by (date, |amount|). Within a group each negative row,
/// in file order, pairs with the earliest still unpaired positive row booked
/// on a different account; paired negatives are invalid. Rows without an
/// account, or whose date or amount does not parse, never pair.
#[derive(Debug)]
pub struct InternalTransferDetector {
    date_format: String,
    amount_format: AmountFormat,
    decimal_separator: char,
    sign: Decimal,
}

impl InternalTransferDetector {
    pub fn from_config(config: &FileConfig) -> Self {
        Self {
            date_format: config.date_format.clone(),
            amount_format: config.amount_format,
            decimal_separator: config.decimal_separator,
            sign: config.sign(),
        }
    }

    fn key(&self, row: &RawRecord) -> Option<(NaiveDate, Decimal, Decimal)> {
        let date = NaiveDate::parse_from_str(row.non_empty_text(COL_DATE)?, &self.date_format).ok()?;
        let amount = parse_amount(
            row.non_empty_text(COL_AMOUNT)?,
            self.amount_format,
            self.decimal_separator,
        )
        .ok()?
            * self.sign;
        Some((date, amount.abs(), amount))
    }
}

impl BatchValidator for InternalTransferDetector {
    fn name(&self) -> &'static str {
        "internal_transfer"
    }

    fn validate(&self, rows: &[RawRecord]) -> ValidationOutcome {
        let mut valid = vec![true; rows.len()];

        // (date, |amount|) -> (row index, signed amount, account), in file order
        let mut groups: HashMap<(NaiveDate, Decimal), Vec<(usize, Decimal, Option<&str>)>> =
            HashMap::new();
        for (idx, row) in rows.iter().enumerate() {
            if let Some((date, abs, amount)) = self.key(row) {
                groups
                    .entry((date, abs))
                    .or_default()
                    .push((idx, amount, row.non_empty_text(COL_ACCOUNT)));
            }
        }

        for entries in groups.values() {
            let mut positives: Vec<(usize, &str, bool)> = entries
                .iter()
                .filter(|(_, amount, _)| amount.is_sign_positive() && !amount.is_zero())
                .filter_map(|(idx, _, account)| account.map(|a| (*idx, a, false)))
                .collect();
            if positives.is_empty() {
                continue;
            }

            for (idx, amount, account) in entries {
                if !amount.is_sign_negative() || amount.is_zero() {
                    continue;
                }
                let Some(account) = account else { continue };

                let partner = positives
                    .iter_mut()
                    .find(|(_, other, paired)| !*paired && *other != *account);
                if let Some(partner) = partner {
                    partner.2 = true;
                    valid[*idx] = false;
                }
            }
        }

        ValidationOutcome {
            valid,
            message: TRANSFER_MESSAGE.to_string(),
        }
    }
}

/// A raw batch with its combined verdicts
#[derive(Debug, Clone)]
pub struct ValidatedBatch {
    pub rows: Vec<RawRecord>,
    pub valid: Vec<bool>,
    /// Failure messages per row, in validator order
    pub errors: Vec<Vec<String>>,
}

impl ValidatedBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Joined error text of row `idx`, `None` if it passed every check
    pub fn message(&self, idx: usize) -> Option<String> {
        self.errors
            .get(idx)
            .filter(|e| !e.is_empty())
            .map(|e| e.join("; "))
    }

    pub fn invalid_count(&self) -> usize {
        self.valid.iter().filter(|v| !**v).count()
    }
}

/// Runs a fixed list of validators over a batch
#[derive(Default)]
pub struct ValidationPipeline {
    validators: Vec<Box<dyn BatchValidator>>,
}

impl ValidationPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, validator: impl BatchValidator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Standard validators for a file: duplicates, date format, internal transfers
    pub fn for_config(config: &FileConfig) -> Self {
        Self::new()
            .with(DuplicateDetector::from_config(config))
            .with(DateFormatValidator::new(config.date_format.clone()))
            .with(InternalTransferDetector::from_config(config))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    pub fn run(&self, rows: Vec<RawRecord>) -> ValidatedBatch {
        let mut valid = vec![true; rows.len()];
        let mut errors: Vec<Vec<String>> = vec![Vec::new(); rows.len()];

        for validator in &self.validators {
            let outcome = validator.validate(&rows);
            if outcome.valid.len() != rows.len() {
                warn!(
                    validator = validator.name(),
                    verdicts = outcome.valid.len(),
                    rows = rows.len(),
                    "Validator returned the wrong number of verdicts, unchecked rows are invalid"
                );
            }

            for (idx, (ok, row_errors)) in valid.iter_mut().zip(errors.iter_mut()).enumerate() {
                let message = match outcome.valid.get(idx) {
                    Some(true) => continue,
                    Some(false) => outcome.message.clone(),
                    None => format!("Not checked by validator '{}'.", validator.name()),
                };
                *ok = false;
                row_errors.push(message);
            }
            debug!(
                validator = validator.name(),
                invalid = outcome.invalid_count(),
                "Validator finished"
            );
        }

        ValidatedBatch {
            rows,
            valid,
            errors,
        }
    }
}
