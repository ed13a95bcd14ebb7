//! Aggregation task configuration

use rusqlite::{params, OptionalExtension, Row};

use super::Database;
use crate::error::{Error, Result};
use crate::models::{AggregationTaskConfig, NewAggregationTask};

const TASK_COLUMNS: &str = "id, target_table, routine, active, depends_on, description";

fn row_to_task(row: &Row) -> rusqlite::Result<AggregationTaskConfig> {
    Ok(AggregationTaskConfig {
        id: row.get(0)?,
        target_table: row.get(1)?,
        routine: row.get(2)?,
        active: row.get(3)?,
        depends_on: row.get(4)?,
        description: row.get(5)?,
    })
}

impl Database {
    /// Store an aggregation task; `depends_on` names an already stored target table
    pub fn insert_aggregation_task(&self, task: &NewAggregationTask) -> Result<i64> {
        let depends_on = match &task.depends_on {
            Some(target) => Some(
                self.get_task_by_target(target)?
                    .ok_or_else(|| {
                        Error::Config(format!(
                            "Task '{}' depends on unknown task '{}'",
                            task.target_table, target
                        ))
                    })?
                    .id,
            ),
            None => None,
        };

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO aggregation_tasks (target_table, routine, active, depends_on, description)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                task.target_table,
                task.routine,
                task.active,
                depends_on,
                task.description
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_task_by_target(&self, target_table: &str) -> Result<Option<AggregationTaskConfig>> {
        let conn = self.conn()?;
        let task = conn
            .query_row(
                &format!(
                    "SELECT {} FROM aggregation_tasks WHERE target_table = ?",
                    TASK_COLUMNS
                ),
                params![target_table],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    pub fn list_aggregation_tasks(&self) -> Result<Vec<AggregationTaskConfig>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM aggregation_tasks ORDER BY id",
            TASK_COLUMNS
        ))?;
        let tasks = stmt
            .query_map([], row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    pub fn list_active_tasks(&self) -> Result<Vec<AggregationTaskConfig>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM aggregation_tasks WHERE active = 1 ORDER BY id",
            TASK_COLUMNS
        ))?;
        let tasks = stmt
            .query_map([], row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    pub fn set_task_active(&self, id: i64, active: bool) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE aggregation_tasks SET active = ? WHERE id = ?",
            params![active, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Aggregation task {}", id)));
        }
        Ok(())
    }

    /// Point a task at a (possibly different) dependency
    pub fn set_task_dependency(&self, id: i64, depends_on: Option<i64>) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE aggregation_tasks SET depends_on = ? WHERE id = ?",
            params![depends_on, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Aggregation task {}", id)));
        }
        Ok(())
    }
}
