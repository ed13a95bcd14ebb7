//! Accepted and rejected transaction record operations

use rusqlite::{params, Row};

use super::{parse_date, parse_decimal, Database, DATE_FORMAT};
use crate::error::{Error, Result};
use crate::models::{AcceptedRecord, NewAcceptedRecord, NewRejectedRecord, RejectedRecord};

const ACCEPTED_COLUMNS: &str =
    "id, file_id, source_line, transaction_date, amount, description, category, account";

const REJECTED_COLUMNS: &str = "id, file_id, source_line, transaction_date, amount, description, \
     category, account, error_message, ready_for_reload";

fn row_to_accepted(row: &Row) -> rusqlite::Result<AcceptedRecord> {
    let date: String = row.get(3)?;
    let amount: String = row.get(4)?;
    Ok(AcceptedRecord {
        id: row.get(0)?,
        file_id: row.get(1)?,
        source_line: row.get(2)?,
        transaction_date: parse_date(&date)?,
        amount: parse_decimal(&amount)?,
        description: row.get(5)?,
        category: row.get(6)?,
        account: row.get(7)?,
    })
}

fn row_to_rejected(row: &Row) -> rusqlite::Result<RejectedRecord> {
    Ok(RejectedRecord {
        id: row.get(0)?,
        file_id: row.get(1)?,
        source_line: row.get(2)?,
        transaction_date: row.get(3)?,
        amount: row.get(4)?,
        description: row.get(5)?,
        category: row.get(6)?,
        account: row.get(7)?,
        error_message: row.get(8)?,
        ready_for_reload: row.get(9)?,
    })
}

impl Database {
    /// Insert one accepted record, returning its id
    pub fn insert_accepted(&self, file_id: &str, record: &NewAcceptedRecord) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO accepted_records (file_id, source_line, transaction_date, amount, description, category, account)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                file_id,
                record.source_line,
                record.transaction_date.format(DATE_FORMAT).to_string(),
                record.amount.to_string(),
                record.description,
                record.category,
                record.account,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert one rejected record, returning its id
    pub fn insert_rejected(&self, file_id: &str, record: &NewRejectedRecord) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO rejected_records (file_id, source_line, transaction_date, amount, description, category, account, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                file_id,
                record.source_line,
                record.transaction_date,
                record.amount,
                record.description,
                record.category,
                record.account,
                record.error_message,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All accepted records across files, oldest transaction first
    pub fn list_accepted_records(&self) -> Result<Vec<AcceptedRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accepted_records ORDER BY transaction_date, id",
            ACCEPTED_COLUMNS
        ))?;
        let records = stmt
            .query_map([], row_to_accepted)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Accepted records of one file in source order
    pub fn list_accepted_for_file(&self, file_id: &str) -> Result<Vec<AcceptedRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accepted_records WHERE file_id = ? ORDER BY source_line, id",
            ACCEPTED_COLUMNS
        ))?;
        let records = stmt
            .query_map(params![file_id], row_to_accepted)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Rejected records of one file in source order
    pub fn list_rejected_for_file(&self, file_id: &str) -> Result<Vec<RejectedRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM rejected_records WHERE file_id = ? ORDER BY source_line, id",
            REJECTED_COLUMNS
        ))?;
        let records = stmt
            .query_map(params![file_id], row_to_rejected)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Rejected records flagged as fixed and ready to be loaded again
    pub fn list_reloadable(&self) -> Result<Vec<RejectedRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM rejected_records WHERE ready_for_reload = 1 ORDER BY file_id, source_line",
            REJECTED_COLUMNS
        ))?;
        let records = stmt
            .query_map([], row_to_rejected)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Flag or unflag a rejected record for reload
    pub fn set_ready_for_reload(&self, rejected_id: i64, ready: bool) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE rejected_records SET ready_for_reload = ? WHERE id = ?",
            params![ready, rejected_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Rejected record {}", rejected_id)));
        }
        Ok(())
    }

    /// Remove every accepted and rejected row of a file, returning how many were removed
    pub fn delete_records_for_file(&self, file_id: &str) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let accepted = tx.execute(
            "DELETE FROM accepted_records WHERE file_id = ?",
            params![file_id],
        )?;
        let rejected = tx.execute(
            "DELETE FROM rejected_records WHERE file_id = ?",
            params![file_id],
        )?;
        tx.commit()?;
        Ok(accepted + rejected)
    }

    /// (accepted, rejected) row counts for a file
    pub fn count_records_for_file(&self, file_id: &str) -> Result<(i64, i64)> {
        let conn = self.conn()?;
        let accepted: i64 = conn.query_row(
            "SELECT COUNT(*) FROM accepted_records WHERE file_id = ?",
            params![file_id],
            |row| row.get(0),
        )?;
        let rejected: i64 = conn.query_row(
            "SELECT COUNT(*) FROM rejected_records WHERE file_id = ?",
            params![file_id],
            |row| row.get(0),
        )?;
        Ok((accepted, rejected))
    }
}
