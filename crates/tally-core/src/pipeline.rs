//! Stage orchestration
//!
//! - `SilverStage` turns one uploaded file into accepted/rejected records
//! - `GoldStage` recomputes every configured summary table
//! - `Pipeline` runs Silver for a file, then Gold if Silver succeeded
//!
//! Entry points return reports instead of errors so callers always get a
//! success flag and a readable message, whatever went wrong.

use serde::Serialize;
use tracing::{info, warn};

use crate::aggregation::{AggregationRegistry, AggregationRunner, GoldReport};
use crate::classify::{classify, persist, status_message, RecordSink};
use crate::cleaning::CleaningChain;
use crate::config::SummaryLabels;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{FileConfig, FileRecord, FileStatus};
use crate::object_store::ObjectStore;
use crate::reader::{self, ParsedFile};
use crate::validation::ValidationPipeline;

/// Outcome of a Silver run for one file
#[derive(Debug, Clone, Serialize)]
pub struct SilverReport {
    pub file_id: String,
    /// Rows are durable and the terminal status is recorded
    pub success: bool,
    pub message: String,
    /// Terminal status derived for the file, once classification ran
    pub status: Option<FileStatus>,
    pub accepted: usize,
    pub rejected: usize,
    pub rows_written: usize,
    pub data_persisted: bool,
    pub status_updated: bool,
}

impl SilverReport {
    fn failure(file_id: &str, message: impl Into<String>) -> Self {
        Self {
            file_id: file_id.to_string(),
            success: false,
            message: message.into(),
            status: None,
            accepted: 0,
            rejected: 0,
            rows_written: 0,
            data_persisted: false,
            status_updated: false,
        }
    }
}

/// Validation, cleaning, classification and persistence of uploaded files
pub struct SilverStage<'a> {
    db: &'a Database,
    store: &'a dyn ObjectStore,
    sink: &'a dyn RecordSink,
}

impl<'a> SilverStage<'a> {
    pub fn new(db: &'a Database, store: &'a dyn ObjectStore) -> Self {
        Self {
            db,
            store,
            sink: db,
        }
    }

    /// Write records and statuses somewhere other than `db`
    pub fn with_sink(mut self, sink: &'a dyn RecordSink) -> Self {
        self.sink = sink;
        self
    }

    /// Look up the file and its config and make sure it may be processed
    fn prepare(&self, file_id: &str) -> Result<(FileRecord, FileConfig)> {
        let file = self
            .db
            .get_file(file_id)?
            .ok_or_else(|| Error::NotFound(format!("File {}", file_id)))?;

        if file.status.is_terminal() {
            return Err(Error::InvalidData(format!(
                "File {} was already processed ({})",
                file_id, file.status
            )));
        }

        let config = self.db.get_file_config(file.config_id)?.ok_or_else(|| {
            Error::NotFound(format!(
                "File config {} for file {}",
                file.config_id, file_id
            ))
        })?;
        Ok((file, config))
    }

    fn load(&self, file_id: &str, config: &FileConfig) -> Result<ParsedFile> {
        let bytes = self.store.download(file_id)?;
        reader::read_records(&bytes, config)
    }

    /// Process one uploaded file
    ///
    /// Transport and parse failures leave the file untouched. A file left in
    /// `Processing` by an interrupted run has that run's rows cleared first.
    pub fn run(&self, file_id: &str) -> SilverReport {
        let (file, config) = match self.prepare(file_id) {
            Ok(found) => found,
            Err(e) => {
                warn!(file_id, error = %e, "Silver run refused");
                return SilverReport::failure(file_id, e.to_string());
            }
        };

        let parsed = match self.load(file_id, &config) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(file_id, error = %e, "Could not read uploaded file");
                return SilverReport::failure(file_id, e.to_string());
            }
        };

        if file.status == FileStatus::Processing {
            match self.db.delete_records_for_file(file_id) {
                Ok(removed) => {
                    warn!(file_id, removed, "Cleared rows of an interrupted run")
                }
                Err(e) => return SilverReport::failure(file_id, e.to_string()),
            }
        } else if let Err(e) = self.db.mark_file_processing(file_id) {
            return SilverReport::failure(file_id, e.to_string());
        }

        info!(file_id, name = %file.name, rows = parsed.rows.len(), "Silver run started");

        let batch = ValidationPipeline::for_config(&config).run(parsed.rows);
        let classification = classify(batch, &CleaningChain::for_config(&config));

        match persist(self.sink, file_id, &classification) {
            Ok(outcome) => {
                let success = outcome.data_persisted && outcome.status_updated;
                let message = match &outcome.error {
                    Some(e) => format!("Rows saved but status not recorded: {}", e),
                    None => format!(
                        "{} accepted, {} rejected ({})",
                        outcome.accepted, outcome.rejected, outcome.status
                    ),
                };
                SilverReport {
                    file_id: file_id.to_string(),
                    success,
                    message,
                    status: Some(outcome.status),
                    accepted: outcome.accepted,
                    rejected: outcome.rejected,
                    rows_written: outcome.accepted + outcome.rejected,
                    data_persisted: outcome.data_persisted,
                    status_updated: outcome.status_updated,
                }
            }
            Err(e) => {
                let written = match &e {
                    Error::Persistence { written, .. } => *written,
                    _ => 0,
                };
                SilverReport {
                    status: Some(classification.status()),
                    accepted: classification.accepted.len(),
                    rejected: classification.rejected.len(),
                    rows_written: written,
                    ..SilverReport::failure(file_id, e.to_string())
                }
            }
        }
    }

    /// Record the terminal status of a file whose rows are already stored
    ///
    /// Only the metadata step runs; the status is derived from the rows
    /// in the database.
    pub fn retry_status_update(&self, file_id: &str) -> SilverReport {
        let file = match self.db.get_file(file_id) {
            Ok(Some(file)) => file,
            Ok(None) => return SilverReport::failure(file_id, format!("File {} not found", file_id)),
            Err(e) => return SilverReport::failure(file_id, e.to_string()),
        };
        if file.status != FileStatus::Processing {
            return SilverReport::failure(
                file_id,
                format!("File {} is {}, nothing to retry", file_id, file.status),
            );
        }

        let (accepted, rejected) = match self.db.count_records_for_file(file_id) {
            Ok((a, r)) => (a as usize, r as usize),
            Err(e) => return SilverReport::failure(file_id, e.to_string()),
        };
        let status = FileStatus::from_outcome(accepted, rejected);
        let note = status_message(accepted, rejected);

        let updated =
            self.sink
                .update_file_status(file_id, status, chrono::Utc::now(), note.as_deref());
        let (success, message) = match updated {
            Ok(()) => {
                info!(file_id, status = %status, "File status recorded on retry");
                (true, format!("Status recorded: {}", status))
            }
            Err(e) => {
                warn!(file_id, error = %e, "Status retry failed");
                (false, Error::Metadata(e.to_string()).to_string())
            }
        };

        SilverReport {
            file_id: file_id.to_string(),
            success,
            message,
            status: Some(status),
            accepted,
            rejected,
            rows_written: 0,
            data_persisted: true,
            status_updated: success,
        }
    }
}

/// Recomputation of all configured summary tables
pub struct GoldStage<'a> {
    db: &'a Database,
    registry: AggregationRegistry,
    labels: SummaryLabels,
}

impl<'a> GoldStage<'a> {
    pub fn new(db: &'a Database, labels: SummaryLabels) -> Self {
        Self {
            db,
            registry: AggregationRegistry::new(),
            labels,
        }
    }

    /// Use a custom routine registry
    pub fn with_registry(mut self, registry: AggregationRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn run(&self) -> GoldReport {
        info!("Gold run started");
        AggregationRunner::new(&self.registry, self.labels.clone()).run(self.db)
    }
}

/// Result of Silver followed by Gold
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub success: bool,
    pub silver: SilverReport,
    /// Absent when Silver did not succeed
    pub gold: Option<GoldReport>,
}

/// Silver then Gold
pub struct Pipeline<'a> {
    silver: SilverStage<'a>,
    gold: GoldStage<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(silver: SilverStage<'a>, gold: GoldStage<'a>) -> Self {
        Self { silver, gold }
    }

    pub fn run(&self, file_id: &str) -> PipelineReport {
        let silver = self.silver.run(file_id);
        if !silver.success {
            warn!(file_id, "Silver did not succeed, skipping Gold");
            return PipelineReport {
                success: false,
                silver,
                gold: None,
            };
        }

        let gold = self.gold.run();
        PipelineReport {
            success: gold.success,
            silver,
            gold: Some(gold),
        }
    }
}
