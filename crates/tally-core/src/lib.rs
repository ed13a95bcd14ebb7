//! Tally Core Library
//!
//! Shared functionality for the Tally transaction ingestion pipeline:
//! - Database access and migrations
//! - File intake with checksum de-duplication and config resolution
//! - Silver stage: cleaning chain, batch validators, classification
//! - Gold stage: aggregation registry and dependency-ordered runner
//! - Pipeline orchestration and run reports
//! - Object store with pluggable backends

pub mod aggregation;
pub mod classify;
pub mod cleaning;
pub mod config;
pub mod db;
pub mod error;
pub mod intake;
pub mod models;
pub mod object_store;
pub mod pipeline;
pub mod reader;
pub mod validation;

pub use aggregation::{
    Aggregation, AggregationContext, AggregationKind, AggregationRegistry, AggregationRunner,
    GoldReport, TaskResult, TaskState,
};
pub use classify::{classify, persist, Classification, PersistOutcome, RecordSink};
pub use cleaning::{Cleaner, CleaningChain};
pub use config::{AppConfig, SummaryLabels};
pub use db::Database;
pub use error::{CleaningError, Error, Result};
pub use intake::{FileIntake, IntakeReceipt};
pub use object_store::{LocalObjectStore, ObjectStore};
pub use pipeline::{GoldStage, Pipeline, PipelineReport, SilverReport, SilverStage};
pub use validation::{BatchValidator, ValidatedBatch, ValidationOutcome, ValidationPipeline};
