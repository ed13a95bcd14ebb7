//! Dependency-ordered execution of configured aggregation tasks

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{AggregationContext, AggregationRegistry};
use crate::config::SummaryLabels;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::AggregationTaskConfig;

pub const NO_ACTIVE_TASKS: &str = "No active aggregation tasks found.";

/// How a task ended in one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Succeeded,
    Failed,
    /// Not run because a dependency did not succeed in this run
    Skipped,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub task_id: i64,
    pub target_table: String,
    pub routine: String,
    pub state: TaskState,
    /// Summary rows written
    pub rows: usize,
    pub error: Option<String>,
}

/// Outcome of a Gold run
#[derive(Debug, Clone, Serialize)]
pub struct GoldReport {
    /// Every task succeeded
    pub success: bool,
    pub message: String,
    pub computed_at: DateTime<Utc>,
    /// Per-task results in execution order
    pub tasks: Vec<TaskResult>,
}

impl GoldReport {
    fn failure(message: impl Into<String>, computed_at: DateTime<Utc>) -> Self {
        Self {
            success: false,
            message: message.into(),
            computed_at,
            tasks: Vec::new(),
        }
    }

    /// Messages of every failed or skipped task
    pub fn errors(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter_map(|t| {
                t.error
                    .as_ref()
                    .map(|e| format!("{}: {}", t.target_table, e))
            })
            .collect()
    }
}

/// Order tasks so each runs after the task it depends on (Kahn, ties by id)
///
/// Dependencies pointing outside `tasks` do not constrain the order. A cycle
/// is a configuration error.
pub fn order_tasks(tasks: &[AggregationTaskConfig]) -> Result<Vec<&AggregationTaskConfig>> {
    let by_id: HashMap<i64, &AggregationTaskConfig> = tasks.iter().map(|t| (t.id, t)).collect();

    let mut pending_deps: HashMap<i64, usize> = HashMap::new();
    let mut dependents: HashMap<i64, Vec<i64>> = HashMap::new();
    for task in tasks {
        let in_set = task.depends_on.filter(|dep| by_id.contains_key(dep));
        pending_deps.insert(task.id, usize::from(in_set.is_some()));
        if let Some(dep) = in_set {
            dependents.entry(dep).or_default().push(task.id);
        }
    }

    let mut ready: BTreeSet<i64> = pending_deps
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut ordered = Vec::with_capacity(tasks.len());

    while let Some(id) = ready.pop_first() {
        if let Some(task) = by_id.get(&id) {
            ordered.push(*task);
        }
        for dependent in dependents.get(&id).into_iter().flatten() {
            if let Some(n) = pending_deps.get_mut(dependent) {
                *n -= 1;
                if *n == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if ordered.len() < tasks.len() {
        let mut stuck: Vec<&str> = tasks
            .iter()
            .filter(|t| !ordered.iter().any(|o| o.id == t.id))
            .map(|t| t.target_table.as_str())
            .collect();
        stuck.sort_unstable();
        return Err(Error::Config(format!(
            "Cyclic aggregation task dependencies: {}",
            stuck.join(", ")
        )));
    }

    Ok(ordered)
}

/// Executes the active aggregation tasks against a database
pub struct AggregationRunner<'a> {
    registry: &'a AggregationRegistry,
    labels: SummaryLabels,
}

impl<'a> AggregationRunner<'a> {
    pub fn new(registry: &'a AggregationRegistry, labels: SummaryLabels) -> Self {
        Self { registry, labels }
    }

    /// Run every active task in dependency order
    ///
    /// Task failures are collected, not raised: independent tasks still run,
    /// and tasks whose dependency did not succeed are skipped.
    pub fn run(&self, db: &Database) -> GoldReport {
        let ctx = AggregationContext::new(db, &self.labels);

        let tasks = match db.list_active_tasks() {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "Failed to load aggregation tasks");
                return GoldReport::failure(
                    format!("Failed to load aggregation tasks: {}", e),
                    ctx.computed_at,
                );
            }
        };
        if tasks.is_empty() {
            warn!("{}", NO_ACTIVE_TASKS);
            return GoldReport::failure(NO_ACTIVE_TASKS, ctx.computed_at);
        }

        let ordered = match order_tasks(&tasks) {
            Ok(ordered) => ordered,
            Err(e) => {
                warn!(error = %e, "Refusing to run aggregation tasks");
                return GoldReport::failure(e.to_string(), ctx.computed_at);
            }
        };

        let active: HashMap<i64, &AggregationTaskConfig> =
            tasks.iter().map(|t| (t.id, t)).collect();
        let mut states: HashMap<i64, TaskState> = HashMap::new();
        let mut results = Vec::with_capacity(ordered.len());

        for task in ordered {
            let result = self.run_task(&ctx, task, &active, &states);
            states.insert(task.id, result.state);
            results.push(result);
        }

        let failed = results
            .iter()
            .filter(|r| r.state != TaskState::Succeeded)
            .count();
        let success = failed == 0;
        let message = if success {
            format!("{} aggregation tasks completed", results.len())
        } else {
            format!(
                "{} of {} aggregation tasks did not complete",
                failed,
                results.len()
            )
        };
        info!(
            tasks = results.len(),
            failed,
            "Gold run finished"
        );

        GoldReport {
            success,
            message,
            computed_at: ctx.computed_at,
            tasks: results,
        }
    }

    fn run_task(
        &self,
        ctx: &AggregationContext<'_>,
        task: &AggregationTaskConfig,
        active: &HashMap<i64, &AggregationTaskConfig>,
        states: &HashMap<i64, TaskState>,
    ) -> TaskResult {
        let mut result = TaskResult {
            task_id: task.id,
            target_table: task.target_table.clone(),
            routine: task.routine.clone(),
            state: TaskState::Failed,
            rows: 0,
            error: None,
        };

        if let Some(dep) = task.depends_on {
            let Some(dep_task) = active.get(&dep) else {
                let message = format!("Depends on task {} which is not active", dep);
                warn!(task = %task.target_table, "{}", message);
                result.error = Some(message);
                return result;
            };
            if states.get(&dep) != Some(&TaskState::Succeeded) {
                let message = format!(
                    "Skipped because dependency '{}' did not complete",
                    dep_task.target_table
                );
                warn!(task = %task.target_table, "{}", message);
                result.state = TaskState::Skipped;
                result.error = Some(message);
                return result;
            }
        }

        let Some(routine) = self.registry.resolve(&task.routine) else {
            let message = format!("Unknown aggregation routine '{}'", task.routine);
            warn!(task = %task.target_table, "{}", message);
            result.error = Some(message);
            return result;
        };

        match routine.run(ctx) {
            Ok(rows) => {
                debug!(task = %task.target_table, routine = routine.name(), rows, "Aggregation task finished");
                result.state = TaskState::Succeeded;
                result.rows = rows;
            }
            Err(e) => {
                warn!(task = %task.target_table, error = %e, "Aggregation task failed");
                result.error = Some(e.to_string());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{Aggregation, AggregationKind};
    use crate::models::NewAggregationTask;

    fn task(id: i64, target: &str, depends_on: Option<i64>) -> AggregationTaskConfig {
        AggregationTaskConfig {
            id,
            target_table: target.to_string(),
            routine: target.to_string(),
            active: true,
            depends_on,
            description: None,
        }
    }

    fn add_task(db: &Database, target: &str, routine: &str, depends_on: Option<&str>) -> i64 {
        db.insert_aggregation_task(&NewAggregationTask {
            target_table: target.to_string(),
            routine: routine.to_string(),
            active: true,
            depends_on: depends_on.map(str::to_string),
            description: None,
        })
        .unwrap()
    }

    struct FailingMonthly;

    impl Aggregation for FailingMonthly {
        fn id(&self) -> AggregationKind {
            AggregationKind::MonthlySummary
        }

        fn name(&self) -> &'static str {
            "Failing monthly"
        }

        fn run(&self, _: &AggregationContext<'_>) -> Result<usize> {
            Err(Error::Aggregation("boom".into()))
        }
    }

    #[test]
    fn test_order_respects_dependencies() {
        let tasks = vec![task(1, "c", Some(3)), task(2, "b", None), task(3, "a", None)];
        let ids: Vec<i64> = order_tasks(&tasks).unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_order_detects_cycle() {
        let tasks = vec![task(1, "a", Some(2)), task(2, "b", Some(1)), task(3, "c", None)];
        match order_tasks(&tasks) {
            Err(Error::Config(msg)) => assert!(msg.contains("a, b")),
            other => panic!("expected cycle error, got {:?}", other.map(|o| o.len())),
        }
    }

    #[test]
    fn test_order_ignores_outside_dependency() {
        let tasks = vec![task(5, "a", Some(99))];
        assert_eq!(order_tasks(&tasks).unwrap().len(), 1);
    }

    #[test]
    fn test_no_active_tasks() {
        let db = Database::in_memory().unwrap();
        let registry = AggregationRegistry::new();
        let report = AggregationRunner::new(&registry, SummaryLabels::default()).run(&db);
        assert!(!report.success);
        assert_eq!(report.message, NO_ACTIVE_TASKS);
    }

    #[test]
    fn test_cycle_runs_nothing() {
        let db = Database::in_memory().unwrap();
        let monthly = add_task(&db, "monthly_summary", "monthly_summary", None);
        let savings = add_task(&db, "savings_rate_summary", "savings_rate", Some("monthly_summary"));
        db.set_task_dependency(monthly, Some(savings)).unwrap();

        let registry = AggregationRegistry::new();
        let report = AggregationRunner::new(&registry, SummaryLabels::default()).run(&db);
        assert!(!report.success);
        assert!(report.message.contains("Cyclic"));
        assert!(report.tasks.is_empty());
    }

    #[test]
    fn test_failure_isolated_and_dependents_skipped() {
        let db = Database::in_memory().unwrap();
        add_task(&db, "monthly_summary", "monthly_summary", None);
        add_task(&db, "category_summary", "category_summary", None);
        add_task(&db, "savings_rate_summary", "savings_rate", Some("monthly_summary"));

        let mut registry = AggregationRegistry::new();
        registry.register(Box::new(FailingMonthly));
        let report = AggregationRunner::new(&registry, SummaryLabels::default()).run(&db);

        assert!(!report.success);
        let states: Vec<(&str, TaskState)> = report
            .tasks
            .iter()
            .map(|t| (t.target_table.as_str(), t.state))
            .collect();
        assert_eq!(
            states,
            vec![
                ("monthly_summary", TaskState::Failed),
                ("category_summary", TaskState::Succeeded),
                ("savings_rate_summary", TaskState::Skipped),
            ]
        );
        assert_eq!(report.errors().len(), 2);
    }

    #[test]
    fn test_unknown_routine_and_inactive_dependency() {
        let db = Database::in_memory().unwrap();
        let monthly = add_task(&db, "monthly_summary", "monthly_summary", None);
        add_task(&db, "savings_rate_summary", "savings_rate", Some("monthly_summary"));
        add_task(&db, "weekly_summary", "weekly_summary", None);
        db.set_task_active(monthly, false).unwrap();

        let registry = AggregationRegistry::new();
        let report = AggregationRunner::new(&registry, SummaryLabels::default()).run(&db);

        assert_eq!(report.tasks.len(), 2);
        assert!(report.tasks.iter().all(|t| t.state == TaskState::Failed));
        assert!(report.tasks[0].error.as_deref().unwrap().contains("not active"));
        assert!(report.tasks[1].error.as_deref().unwrap().contains("weekly_summary"));
    }

    #[test]
    fn test_overflowing_amounts_fail_the_task() {
        use crate::models::{NewAcceptedRecord, NewFileConfig, NewFileRecord};
        use chrono::NaiveDate;
        use rust_decimal::Decimal;

        let db = Database::in_memory().unwrap();
        let config_id = db
            .insert_file_config(&NewFileConfig::for_pattern(r"\.csv$"))
            .unwrap();
        db.insert_file(&NewFileRecord {
            id: "big".to_string(),
            name: "big.csv".to_string(),
            size: 1,
            row_count: 2,
            checksum: "c".to_string(),
            config_id,
        })
        .unwrap();
        for line in [2, 3] {
            db.insert_accepted(
                "big",
                &NewAcceptedRecord {
                    source_line: line,
                    transaction_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
                    amount: Decimal::MAX,
                    description: "windfall".to_string(),
                    category: Some("Salary".to_string()),
                    account: None,
                },
            )
            .unwrap();
        }
        add_task(&db, "monthly_summary", "monthly_summary", None);
        add_task(&db, "savings_rate_summary", "savings_rate", Some("monthly_summary"));

        let registry = AggregationRegistry::new();
        let report = AggregationRunner::new(&registry, SummaryLabels::default()).run(&db);

        assert!(!report.success);
        assert_eq!(report.tasks[0].state, TaskState::Failed);
        assert!(report.tasks[0].error.as_deref().unwrap().contains("overflowed"));
        assert_eq!(report.tasks[1].state, TaskState::Skipped);
        assert!(db.list_monthly_summaries().unwrap().is_empty());
    }
}
