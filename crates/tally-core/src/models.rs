//! Domain models for Tally

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Canonical column names expected in uploaded files (headers are trimmed and upper-cased)
pub const COL_DATE: &str = "TRANSACTION_DATE";
pub const COL_AMOUNT: &str = "AMOUNT";
pub const COL_DESCRIPTION: &str = "DESCRIPTION";
pub const COL_CATEGORY: &str = "CATEGORY";
pub const COL_ACCOUNT: &str = "ACCOUNT";

/// Free-text columns touched by the trim cleaner
pub const TEXT_COLUMNS: [&str; 3] = [COL_DESCRIPTION, COL_CATEGORY, COL_ACCOUNT];

/// A single cell of a row while it moves through the cleaning chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    Amount(Decimal),
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{}", s),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Amount(a) => write!(f, "{}", a),
        }
    }
}

/// One row of an uploaded file before (and during) cleaning
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawRecord {
    /// 1-based line in the source file (header is line 1)
    pub line: usize,
    pub fields: BTreeMap<String, FieldValue>,
}

impl RawRecord {
    pub fn new(line: usize) -> Self {
        Self {
            line,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style setter for text cells, mostly useful in tests
    pub fn with(mut self, column: &str, value: &str) -> Self {
        self.set(column, FieldValue::Text(value.to_string()));
        self
    }

    pub fn set(&mut self, column: &str, value: FieldValue) {
        self.fields.insert(column.to_string(), value);
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }

    /// Text value of a column, `None` if absent or already typed
    pub fn text(&self, column: &str) -> Option<&str> {
        match self.fields.get(column) {
            Some(FieldValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Text value trimmed, with empty strings treated as missing
    pub fn non_empty_text(&self, column: &str) -> Option<&str> {
        self.text(column).map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn date(&self, column: &str) -> Option<NaiveDate> {
        match self.fields.get(column) {
            Some(FieldValue::Date(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn amount(&self, column: &str) -> Option<Decimal> {
        match self.fields.get(column) {
            Some(FieldValue::Amount(a)) => Some(*a),
            _ => None,
        }
    }

    /// Render any cell back to a string, for storage in a rejected record
    pub fn render(&self, column: &str) -> Option<String> {
        self.fields.get(column).map(|v| v.to_string())
    }
}

/// Lifecycle status of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Uploaded,
    Processing,
    Completed,
    PartiallyCompleted,
    Failed,
}

impl FileStatus {
    /// Stable numeric code stored in the database
    pub fn code(&self) -> i64 {
        match self {
            Self::Uploaded => 1,
            Self::Processing => 2,
            Self::Completed => 3,
            Self::PartiallyCompleted => 4,
            Self::Failed => 9,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Uploaded),
            2 => Some(Self::Processing),
            3 => Some(Self::Completed),
            4 => Some(Self::PartiallyCompleted),
            9 => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::PartiallyCompleted => "partially_completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::PartiallyCompleted | Self::Failed
        )
    }

    /// Terminal status for a run given its outcome mix
    ///
    /// A file with no rejects is `Completed`, including one with no rows.
    pub fn from_outcome(accepted: usize, rejected: usize) -> Self {
        if rejected == 0 {
            Self::Completed
        } else if accepted == 0 {
            Self::Failed
        } else {
            Self::PartiallyCompleted
        }
    }
}

impl std::str::FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uploaded" => Ok(Self::Uploaded),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "partially_completed" | "partial" => Ok(Self::PartiallyCompleted),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown file status: {}", s)),
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How amount strings are disambiguated between grouping and decimal marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AmountFormat {
    /// Guess from the characters present: the last of `,`/`.` is the decimal mark
    #[default]
    Heuristic,
    /// Use the file config's decimal separator; the other mark is grouping
    Explicit,
}

impl AmountFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::Explicit => "explicit",
        }
    }
}

impl std::str::FromStr for AmountFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "heuristic" => Ok(Self::Heuristic),
            "explicit" => Ok(Self::Explicit),
            _ => Err(format!("Unknown amount format: {}", s)),
        }
    }
}

impl std::fmt::Display for AmountFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_delimiter() -> char {
    ','
}

fn default_encoding() -> String {
    "windows-1252".to_string()
}

fn default_decimal_separator() -> char {
    '.'
}

fn default_date_format() -> String {
    "%d.%m.%y".to_string()
}

fn default_amount_sign() -> i32 {
    1
}

fn default_expected_columns() -> Vec<String> {
    vec![
        COL_DATE.to_string(),
        COL_AMOUNT.to_string(),
        COL_DESCRIPTION.to_string(),
    ]
}

/// A file parsing contract to be stored (before DB insertion)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFileConfig {
    /// Regex matched against the uploaded file name
    pub file_pattern: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default = "default_decimal_separator")]
    pub decimal_separator: char,
    #[serde(default)]
    pub amount_format: AmountFormat,
    /// chrono strftime pattern, e.g. `%d.%m.%y`
    #[serde(default = "default_date_format")]
    pub date_format: String,
    /// +1 or -1, applied to every amount
    #[serde(default = "default_amount_sign")]
    pub amount_sign: i32,
    #[serde(default = "default_expected_columns")]
    pub expected_columns: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewFileConfig {
    /// A config matching `file_pattern` with every other field defaulted
    pub fn for_pattern(file_pattern: &str) -> Self {
        Self {
            file_pattern: file_pattern.to_string(),
            delimiter: default_delimiter(),
            encoding: default_encoding(),
            decimal_separator: default_decimal_separator(),
            amount_format: AmountFormat::default(),
            date_format: default_date_format(),
            amount_sign: default_amount_sign(),
            expected_columns: default_expected_columns(),
            description: None,
        }
    }
}

/// A stored file parsing contract
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileConfig {
    pub id: i64,
    pub file_pattern: String,
    pub delimiter: char,
    pub encoding: String,
    pub decimal_separator: char,
    pub amount_format: AmountFormat,
    pub date_format: String,
    pub amount_sign: i32,
    pub expected_columns: Vec<String>,
    pub description: Option<String>,
}

impl FileConfig {
    pub fn from_new(id: i64, new: NewFileConfig) -> Self {
        Self {
            id,
            file_pattern: new.file_pattern,
            delimiter: new.delimiter,
            encoding: new.encoding,
            decimal_separator: new.decimal_separator,
            amount_format: new.amount_format,
            date_format: new.date_format,
            amount_sign: new.amount_sign,
            expected_columns: new.expected_columns,
            description: new.description,
        }
    }

    /// Sign multiplier as a decimal (anything negative counts as -1)
    pub fn sign(&self) -> Decimal {
        if self.amount_sign < 0 {
            Decimal::NEGATIVE_ONE
        } else {
            Decimal::ONE
        }
    }
}

/// Metadata for an uploaded batch
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub size: i64,
    pub row_count: i64,
    /// SHA-224 of the raw bytes, hex encoded; unique across files
    pub checksum: String,
    pub config_id: i64,
    pub status: FileStatus,
    pub error_message: Option<String>,
    pub inserted_at: DateTime<Utc>,
    pub ingested_at: Option<DateTime<Utc>>,
}

/// File metadata to be inserted at upload time
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub id: String,
    pub name: String,
    pub size: i64,
    pub row_count: i64,
    pub checksum: String,
    pub config_id: i64,
}

/// A validated, cleaned transaction
#[derive(Debug, Clone, Serialize)]
pub struct AcceptedRecord {
    pub id: i64,
    pub file_id: String,
    pub source_line: i64,
    pub transaction_date: NaiveDate,
    /// Negative = outgoing, positive = incoming
    pub amount: Decimal,
    pub description: String,
    pub category: Option<String>,
    pub account: Option<String>,
}

/// An accepted transaction before DB insertion
#[derive(Debug, Clone, PartialEq)]
pub struct NewAcceptedRecord {
    pub source_line: i64,
    pub transaction_date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    pub category: Option<String>,
    pub account: Option<String>,
}

/// A transaction that failed validation or cleaning, kept as raw strings
#[derive(Debug, Clone, Serialize)]
pub struct RejectedRecord {
    pub id: i64,
    pub file_id: String,
    pub source_line: i64,
    pub transaction_date: Option<String>,
    pub amount: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub account: Option<String>,
    /// Every failed check's message, joined
    pub error_message: String,
    pub ready_for_reload: bool,
}

/// A rejected transaction before DB insertion
#[derive(Debug, Clone, PartialEq)]
pub struct NewRejectedRecord {
    pub source_line: i64,
    pub transaction_date: Option<String>,
    pub amount: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub account: Option<String>,
    pub error_message: String,
}

impl NewRejectedRecord {
    /// Capture a row's current values as strings along with the failure reason
    pub fn from_raw(row: &RawRecord, error_message: String) -> Self {
        Self {
            source_line: row.line as i64,
            transaction_date: row.render(COL_DATE),
            amount: row.render(COL_AMOUNT),
            description: row.render(COL_DESCRIPTION),
            category: row.render(COL_CATEGORY),
            account: row.render(COL_ACCOUNT),
            error_message,
        }
    }
}

/// Monthly income/expense/savings rollup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySummary {
    /// First day of the month
    pub transaction_month: NaiveDate,
    pub total_expenses: Decimal,
    pub total_earnings: Decimal,
    pub total_savings: Decimal,
    pub net_total: Decimal,
    pub transaction_count: i64,
    pub computed_at: DateTime<Utc>,
}

/// Per month and category rollup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub transaction_month: NaiveDate,
    pub category: String,
    pub total_amount: Decimal,
    pub transaction_count: i64,
    pub computed_at: DateTime<Utc>,
}

/// Share of monthly earnings that went to savings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavingsRateSummary {
    pub transaction_month: NaiveDate,
    /// 0 when the month had no earnings
    pub savings_rate: Decimal,
    pub computed_at: DateTime<Utc>,
}

/// Stored definition of one summary table's recomputation job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationTaskConfig {
    pub id: i64,
    pub target_table: String,
    /// Identifier of a registered aggregation routine (e.g. `monthly_summary`)
    pub routine: String,
    pub active: bool,
    /// Task that must have a current result before this one runs
    pub depends_on: Option<i64>,
    pub description: Option<String>,
}

/// Aggregation task definition to be stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAggregationTask {
    pub target_table: String,
    pub routine: String,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Target table of the dependency, resolved to an id when stored
    #[serde(default)]
    pub depends_on: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_active() -> bool {
    true
}
