//! Pipeline commands: upload, silver, gold, ingest, retry-status

use std::path::Path;

use anyhow::{bail, Context, Result};
use tally_core::{
    aggregation::{GoldReport, TaskState},
    config::AppConfig,
    db::Database,
    intake::{FileIntake, IntakeReceipt},
    object_store::LocalObjectStore,
    pipeline::{GoldStage, Pipeline, SilverReport, SilverStage},
};
use tracing::warn;

use super::print_json;

fn print_receipt(receipt: &IntakeReceipt) {
    println!("📥 Uploaded {}", receipt.name);
    println!("   File id:  {}", receipt.file_id);
    println!("   Rows:     {}", receipt.row_count);
    println!("   Size:     {} bytes", receipt.size);
    println!("   Config:   #{}", receipt.config_id);
}

fn print_silver(report: &SilverReport) {
    let icon = if report.success { "✅" } else { "❌" };
    println!("{} Silver {}: {}", icon, report.file_id, report.message);
    if report.accepted + report.rejected > 0 {
        println!("   Accepted: {}", report.accepted);
        println!("   Rejected: {}", report.rejected);
    }
    if let Some(status) = report.status {
        println!("   Status:   {}", status);
    }
    if report.data_persisted && !report.status_updated {
        println!(
            "   💡 Rows are saved; run `tally retry-status --file-id {}`",
            report.file_id
        );
    }
}

fn print_gold(report: &GoldReport) {
    let icon = if report.success { "✅" } else { "❌" };
    println!("{} Gold: {}", icon, report.message);
    for task in &report.tasks {
        let marker = match task.state {
            TaskState::Succeeded => "✓",
            TaskState::Failed => "✗",
            TaskState::Skipped => "-",
        };
        match &task.error {
            Some(e) => println!("   {} {:<24} {}", marker, task.target_table, e),
            None => println!("   {} {:<24} {} rows", marker, task.target_table, task.rows),
        }
    }
}

/// Upload a file, returning its new id
pub fn cmd_upload(
    db: &Database,
    store: &LocalObjectStore,
    file: &Path,
    json: bool,
) -> Result<String> {
    let receipt = FileIntake::new(db, store)
        .upload_path(file)
        .with_context(|| format!("Failed to upload {}", file.display()))?;

    if json {
        print_json(&receipt)?;
    } else {
        print_receipt(&receipt);
    }
    Ok(receipt.file_id)
}

pub fn cmd_silver(db: &Database, store: &LocalObjectStore, file_id: &str, json: bool) -> Result<()> {
    let report = SilverStage::new(db, store).run(file_id);

    if json {
        print_json(&report)?;
    } else {
        print_silver(&report);
    }
    if !report.success {
        bail!("Silver run failed for {}", file_id);
    }
    Ok(())
}

pub fn cmd_gold(db: &Database, config: &AppConfig, json: bool) -> Result<()> {
    let report = GoldStage::new(db, config.labels.clone()).run();

    if json {
        print_json(&report)?;
    } else {
        print_gold(&report);
    }
    if !report.success {
        bail!("Gold run did not complete");
    }
    Ok(())
}

pub fn cmd_ingest(
    db: &Database,
    store: &LocalObjectStore,
    config: &AppConfig,
    file: &Path,
    json: bool,
) -> Result<()> {
    let receipt = FileIntake::new(db, store)
        .upload_path(file)
        .with_context(|| format!("Failed to upload {}", file.display()))?;

    let pipeline = Pipeline::new(
        SilverStage::new(db, store),
        GoldStage::new(db, config.labels.clone()),
    );
    let report = pipeline.run(&receipt.file_id);

    if json {
        print_json(&report)?;
    } else {
        print_receipt(&receipt);
        print_silver(&report.silver);
        match &report.gold {
            Some(gold) => print_gold(gold),
            None => println!("   Gold skipped"),
        }
    }

    if !report.success {
        warn!(file_id = %receipt.file_id, "Ingest did not complete");
        bail!("Ingest of {} did not complete", file.display());
    }
    Ok(())
}

pub fn cmd_retry_status(
    db: &Database,
    store: &LocalObjectStore,
    file_id: &str,
    json: bool,
) -> Result<()> {
    let report = SilverStage::new(db, store).retry_status_update(file_id);

    if json {
        print_json(&report)?;
    } else {
        print_silver(&report);
    }
    if !report.success {
        bail!("Status retry failed for {}", file_id);
    }
    Ok(())
}
