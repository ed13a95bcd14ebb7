//! Classification and persistence of a validated batch
//!
//! Every input row ends up in exactly one of the accepted or rejected sets.
//! Persistence is two-phase: rows first, then the file's terminal status,
//! and the outcome says which phases completed.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::cleaning::CleaningChain;
use crate::db::Database;
use crate::error::{CleaningError, Error, Result};
use crate::models::{
    FileStatus, NewAcceptedRecord, NewRejectedRecord, RawRecord, COL_ACCOUNT, COL_AMOUNT,
    COL_CATEGORY, COL_DATE, COL_DESCRIPTION,
};
use crate::validation::ValidatedBatch;

/// Accepted and rejected rows of one batch, both in source order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub accepted: Vec<NewAcceptedRecord>,
    pub rejected: Vec<NewRejectedRecord>,
}

impl Classification {
    pub fn total(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }

    /// Terminal file status implied by the accepted/rejected mix
    pub fn status(&self) -> FileStatus {
        FileStatus::from_outcome(self.accepted.len(), self.rejected.len())
    }
}

fn to_accepted(row: &RawRecord) -> std::result::Result<NewAcceptedRecord, CleaningError> {
    let transaction_date = row
        .date(COL_DATE)
        .ok_or_else(|| CleaningError::Missing(COL_DATE.to_string()))?;
    let amount = row
        .amount(COL_AMOUNT)
        .ok_or_else(|| CleaningError::Missing(COL_AMOUNT.to_string()))?;
    let description = row
        .non_empty_text(COL_DESCRIPTION)
        .ok_or_else(|| CleaningError::Missing(COL_DESCRIPTION.to_string()))?;

    Ok(NewAcceptedRecord {
        source_line: row.line as i64,
        transaction_date,
        amount,
        description: description.to_string(),
        category: row.non_empty_text(COL_CATEGORY).map(str::to_string),
        account: row.non_empty_text(COL_ACCOUNT).map(str::to_string),
    })
}

/// Split a validated batch into accepted and rejected records
///
/// Rows that failed validation are rejected with their joined messages.
/// Rows that passed go through the cleaning chain; a cleaning failure
/// rejects the row with the values it held when the chain stopped.
pub fn classify(batch: ValidatedBatch, chain: &CleaningChain) -> Classification {
    let mut result = Classification::default();
    let messages: Vec<Option<String>> = (0..batch.len()).map(|i| batch.message(i)).collect();

    for ((mut row, valid), message) in batch.rows.into_iter().zip(batch.valid).zip(messages) {
        if !valid {
            let message = message.unwrap_or_else(|| "Validation failed.".to_string());
            result
                .rejected
                .push(NewRejectedRecord::from_raw(&row, message));
            continue;
        }

        let cleaned = chain.apply(&mut row).and_then(|_| to_accepted(&row));
        match cleaned {
            Ok(record) => result.accepted.push(record),
            Err(e) => result.rejected.push(NewRejectedRecord::from_raw(
                &row,
                format!("Cleaning error: {}", e),
            )),
        }
    }

    debug!(
        accepted = result.accepted.len(),
        rejected = result.rejected.len(),
        "Classified batch"
    );
    result
}

/// Write target for the Silver stage
pub trait RecordSink {
    fn insert_accepted(&self, file_id: &str, record: &NewAcceptedRecord) -> Result<i64>;

    fn insert_rejected(&self, file_id: &str, record: &NewRejectedRecord) -> Result<i64>;

    fn update_file_status(
        &self,
        file_id: &str,
        status: FileStatus,
        ingested_at: DateTime<Utc>,
        error_message: Option<&str>,
    ) -> Result<()>;
}

impl RecordSink for Database {
    fn insert_accepted(&self, file_id: &str, record: &NewAcceptedRecord) -> Result<i64> {
        Database::insert_accepted(self, file_id, record)
    }

    fn insert_rejected(&self, file_id: &str, record: &NewRejectedRecord) -> Result<i64> {
        Database::insert_rejected(self, file_id, record)
    }

    fn update_file_status(
        &self,
        file_id: &str,
        status: FileStatus,
        ingested_at: DateTime<Utc>,
        error_message: Option<&str>,
    ) -> Result<()> {
        Database::update_file_status(self, file_id, status, ingested_at, error_message)
    }
}

/// Result of writing a classification
#[derive(Debug, Clone, PartialEq)]
pub struct PersistOutcome {
    pub accepted: usize,
    pub rejected: usize,
    pub status: FileStatus,
    pub ingested_at: DateTime<Utc>,
    /// Every accepted and rejected row is durable
    pub data_persisted: bool,
    /// The terminal status was recorded on the file
    pub status_updated: bool,
    /// Why the status update failed, when it did
    pub error: Option<String>,
}

/// Human-readable note stored on the file next to its status
pub fn status_message(accepted: usize, rejected: usize) -> Option<String> {
    match FileStatus::from_outcome(accepted, rejected) {
        FileStatus::Completed if accepted == 0 => Some("File contains no rows".to_string()),
        FileStatus::Completed => None,
        FileStatus::PartiallyCompleted => Some(format!(
            "{} of {} rows rejected",
            rejected,
            accepted + rejected
        )),
        _ => Some(format!("All {} rows rejected", rejected)),
    }
}

/// Persist accepted then rejected rows, then record the terminal status
///
/// The first failed insert stops the batch with `Error::Persistence`; rows
/// written before it stay and the status is left untouched. A failed status
/// update is not an error: the outcome reports `status_updated: false` so the
/// caller can retry only that step.
pub fn persist(
    sink: &dyn RecordSink,
    file_id: &str,
    classification: &Classification,
) -> Result<PersistOutcome> {
    let mut written = 0usize;

    for record in &classification.accepted {
        sink.insert_accepted(file_id, record)
            .map_err(|e| persistence_error(file_id, written, e))?;
        written += 1;
    }
    for record in &classification.rejected {
        sink.insert_rejected(file_id, record)
            .map_err(|e| persistence_error(file_id, written, e))?;
        written += 1;
    }

    let accepted = classification.accepted.len();
    let rejected = classification.rejected.len();
    let status = classification.status();
    let ingested_at = Utc::now();
    let note = status_message(accepted, rejected);

    let (status_updated, error) =
        match sink.update_file_status(file_id, status, ingested_at, note.as_deref()) {
            Ok(()) => (true, None),
            Err(e) => {
                warn!(file_id, error = %e, "Rows persisted but file status update failed");
                (false, Some(Error::Metadata(e.to_string()).to_string()))
            }
        };

    if status_updated {
        info!(file_id, accepted, rejected, status = %status, "Persisted batch");
    }

    Ok(PersistOutcome {
        accepted,
        rejected,
        status,
        ingested_at,
        data_persisted: true,
        status_updated,
        error,
    })
}

fn persistence_error(file_id: &str, written: usize, e: Error) -> Error {
    warn!(file_id, written, error = %e, "Insert failed, stopping batch");
    Error::Persistence {
        written,
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileConfig, NewFileConfig};
    use crate::validation::{ValidationPipeline, DUPLICATE_MESSAGE, TRANSFER_MESSAGE};
    use rust_decimal::Decimal;
    use std::cell::{Cell, RefCell};

    fn config() -> FileConfig {
        FileConfig::from_new(1, NewFileConfig::for_pattern(".*"))
    }

    fn row(line: usize, date: &str, amount: &str, description: &str) -> RawRecord {
        RawRecord::new(line)
            .with(COL_DATE, date)
            .with(COL_AMOUNT, amount)
            .with(COL_DESCRIPTION, description)
    }

    fn run(rows: Vec<RawRecord>) -> Classification {
        let config = config();
        let batch = ValidationPipeline::for_config(&config).run(rows);
        classify(batch, &CleaningChain::for_config(&config))
    }

    /// In-memory sink that fails on the n-th insert or on the status update
    #[derive(Default)]
    struct ScriptedSink {
        fail_insert_at: Option<usize>,
        fail_status: bool,
        inserts: Cell<usize>,
        statuses: RefCell<Vec<FileStatus>>,
    }

    impl ScriptedSink {
        fn insert(&self) -> Result<i64> {
            let n = self.inserts.get();
            if Some(n) == self.fail_insert_at {
                return Err(Error::InvalidData("disk full".into()));
            }
            self.inserts.set(n + 1);
            Ok(n as i64 + 1)
        }
    }

    impl RecordSink for ScriptedSink {
        fn insert_accepted(&self, _: &str, _: &NewAcceptedRecord) -> Result<i64> {
            self.insert()
        }

        fn insert_rejected(&self, _: &str, _: &NewRejectedRecord) -> Result<i64> {
            self.insert()
        }

        fn update_file_status(
            &self,
            _: &str,
            status: FileStatus,
            _: DateTime<Utc>,
            _: Option<&str>,
        ) -> Result<()> {
            if self.fail_status {
                return Err(Error::InvalidData("connection lost".into()));
            }
            self.statuses.borrow_mut().push(status);
            Ok(())
        }
    }

    #[test]
    fn test_every_row_lands_once() {
        let rows = vec![
            row(2, "05.01.24", "-10.00", "coffee"),
            row(3, "05.01.24", "-10.00", "coffee"),
            row(4, "nope", "1", "bad date"),
            row(5, "06.01.24", "ten", "bad amount"),
            row(6, "06.01.24", "3", ""),
            row(7, "07.01.24", "3000", "salary"),
        ];
        let result = run(rows);

        assert_eq!(result.total(), 6);
        assert_eq!(result.accepted.len(), 2);
        let lines: Vec<i64> = result.rejected.iter().map(|r| r.source_line).collect();
        assert_eq!(lines, vec![3, 4, 5, 6]);
        assert_eq!(result.status(), FileStatus::PartiallyCompleted);
    }

    #[test]
    fn test_duplicate_coffee() {
        let result = run(vec![
            row(2, "05.01.24", "-10.00", "coffee"),
            row(3, "05.01.24", "-10.00", "coffee"),
        ]);
        assert_eq!(result.accepted.len(), 1);
        assert_eq!(result.accepted[0].amount, Decimal::new(-1000, 2));
        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.rejected[0].error_message, DUPLICATE_MESSAGE);
    }

    #[test]
    fn test_cleaning_error_message() {
        let result = run(vec![row(2, "05.01.24", "ten", " coffee ")]);
        let rejected = &result.rejected[0];
        assert!(rejected.error_message.starts_with("Cleaning error: "));
        assert!(rejected.error_message.contains("ten"));
        // trimmed by the chain before the amount failed
        assert_eq!(rejected.description.as_deref(), Some("coffee"));
        assert_eq!(result.status(), FileStatus::Failed);
    }

    #[test]
    fn test_transfer_rejected() {
        let result = run(vec![
            row(2, "05.01.24", "500", "in").with(COL_ACCOUNT, "savings"),
            row(3, "05.01.24", "-500", "out").with(COL_ACCOUNT, "checking"),
        ]);
        assert_eq!(result.accepted.len(), 1);
        assert_eq!(result.accepted[0].account.as_deref(), Some("savings"));
        assert_eq!(result.rejected[0].error_message, TRANSFER_MESSAGE);
    }

    #[test]
    fn test_persist_all() {
        let result = run(vec![
            row(2, "05.01.24", "1", "a"),
            row(3, "05.01.24", "1", "a"),
        ]);
        let sink = ScriptedSink::default();
        let outcome = persist(&sink, "f1", &result).unwrap();

        assert!(outcome.data_persisted);
        assert!(outcome.status_updated);
        assert_eq!(outcome.status, FileStatus::PartiallyCompleted);
        assert_eq!(sink.inserts.get(), 2);
        assert_eq!(*sink.statuses.borrow(), vec![FileStatus::PartiallyCompleted]);
    }

    #[test]
    fn test_persist_stops_at_first_failure() {
        let result = run(vec![
            row(2, "05.01.24", "1", "a"),
            row(3, "05.01.24", "2", "b"),
            row(4, "05.01.24", "3", "c"),
        ]);
        let sink = ScriptedSink {
            fail_insert_at: Some(1),
            ..Default::default()
        };

        match persist(&sink, "f1", &result) {
            Err(Error::Persistence { written, message }) => {
                assert_eq!(written, 1);
                assert!(message.contains("disk full"));
            }
            other => panic!("expected persistence error, got {:?}", other),
        }
        assert_eq!(sink.inserts.get(), 1);
        assert!(sink.statuses.borrow().is_empty());
    }

    #[test]
    fn test_status_failure_is_reported_not_raised() {
        let result = run(vec![row(2, "05.01.24", "1", "a")]);
        let sink = ScriptedSink {
            fail_status: true,
            ..Default::default()
        };
        let outcome = persist(&sink, "f1", &result).unwrap();

        assert!(outcome.data_persisted);
        assert!(!outcome.status_updated);
        assert!(outcome.error.unwrap().contains("connection lost"));
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(status_message(8, 0), None);
        assert_eq!(status_message(5, 3).as_deref(), Some("3 of 8 rows rejected"));
        assert_eq!(status_message(0, 4).as_deref(), Some("All 4 rows rejected"));
        assert_eq!(status_message(0, 0).as_deref(), Some("File contains no rows"));
    }
}
