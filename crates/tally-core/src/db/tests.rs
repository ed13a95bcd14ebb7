//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn new_file(db: &Database, id: &str, checksum: &str) -> NewFileRecord {
        let config_id = db
            .insert_file_config(&NewFileConfig::for_pattern(".*"))
            .unwrap();
        let file = NewFileRecord {
            id: id.to_string(),
            name: format!("{}.csv", id),
            size: 120,
            row_count: 3,
            checksum: checksum.to_string(),
            config_id,
        };
        db.insert_file(&file).unwrap();
        file
    }

    fn accepted(line: i64, date: (i32, u32, u32), amount: &str) -> NewAcceptedRecord {
        NewAcceptedRecord {
            source_line: line,
            transaction_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            amount: amount.parse().unwrap(),
            description: format!("row {}", line),
            category: Some("Expenses".to_string()),
            account: None,
        }
    }

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().unwrap();
        assert!(db.list_files(None).unwrap().is_empty());
        assert!(db.list_aggregation_tasks().unwrap().is_empty());
    }

    #[test]
    fn test_summary_tables_have_unique_keys() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();

        conn.execute(
            "INSERT INTO monthly_summary (transaction_month, total_expenses, total_earnings, total_savings, net_total, transaction_count, computed_at) VALUES ('2024-01-01', '0', '0', '0', '0', 0, '2024-02-01 00:00:00')",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO monthly_summary (transaction_month, total_expenses, total_earnings, total_savings, net_total, transaction_count, computed_at) VALUES ('2024-01-01', '1', '1', '1', '1', 1, '2024-02-01 00:00:00')",
            [],
        );
        assert!(result.is_err(), "month must be unique in monthly_summary");
    }

    #[test]
    fn test_resolve_config_by_pattern() {
        let db = Database::in_memory().unwrap();

        let mut ubs = NewFileConfig::for_pattern(r"^ubs_.*\.csv$");
        ubs.delimiter = ';';
        ubs.amount_sign = -1;
        let ubs_id = db.insert_file_config(&ubs).unwrap();
        let any_id = db
            .insert_file_config(&NewFileConfig::for_pattern(r"\.csv$"))
            .unwrap();

        let resolved = db.resolve_config("ubs_2024_01.csv").unwrap();
        assert_eq!(resolved.id, ubs_id);
        assert_eq!(resolved.delimiter, ';');
        assert_eq!(resolved.amount_sign, -1);
        assert_eq!(resolved.sign(), Decimal::NEGATIVE_ONE);

        let resolved = db.resolve_config("revolut.csv").unwrap();
        assert_eq!(resolved.id, any_id);

        let missing = db.resolve_config("statement.pdf");
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_file_config_rejects_bad_input() {
        let db = Database::in_memory().unwrap();

        let bad_pattern = NewFileConfig::for_pattern("(unclosed");
        assert!(matches!(
            db.insert_file_config(&bad_pattern),
            Err(Error::Regex(_))
        ));

        let mut bad_sign = NewFileConfig::for_pattern(".*");
        bad_sign.amount_sign = 2;
        assert!(matches!(
            db.insert_file_config(&bad_sign),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_corrupt_amount_format_is_an_error() {
        let db = Database::in_memory().unwrap();
        let id = db
            .insert_file_config(&NewFileConfig::for_pattern(".*"))
            .unwrap();
        db.conn()
            .unwrap()
            .execute(
                "UPDATE file_configs SET amount_format = 'guess' WHERE id = ?1",
                [id],
            )
            .unwrap();

        assert!(matches!(
            db.get_file_config(id),
            Err(Error::Database(rusqlite::Error::FromSqlConversionFailure(5, _, _)))
        ));
        assert!(db.resolve_config("a.csv").is_err());
    }

    #[test]
    fn test_file_status_lifecycle() {
        let db = Database::in_memory().unwrap();
        new_file(&db, "f1", "abc");

        let file = db.get_file("f1").unwrap().unwrap();
        assert_eq!(file.status, FileStatus::Uploaded);
        assert!(file.ingested_at.is_none());

        db.mark_file_processing("f1").unwrap();
        assert_eq!(
            db.get_file("f1").unwrap().unwrap().status,
            FileStatus::Processing
        );

        db.update_file_status("f1", FileStatus::PartiallyCompleted, Utc::now(), None)
            .unwrap();
        let file = db.get_file("f1").unwrap().unwrap();
        assert_eq!(file.status, FileStatus::PartiallyCompleted);
        assert!(file.ingested_at.is_some());

        let partial = db
            .list_files(Some(FileStatus::PartiallyCompleted))
            .unwrap();
        assert_eq!(partial.len(), 1);
        assert!(db.list_files(Some(FileStatus::Failed)).unwrap().is_empty());

        let missing = db.update_file_status("nope", FileStatus::Failed, Utc::now(), None);
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_checksum_is_unique() {
        let db = Database::in_memory().unwrap();
        let file = new_file(&db, "f1", "same");

        assert_eq!(
            db.get_file_by_checksum("same").unwrap().unwrap().id,
            file.id
        );
        assert!(db.get_file_by_checksum("other").unwrap().is_none());

        let dup = NewFileRecord {
            id: "f2".to_string(),
            ..file
        };
        assert!(db.insert_file(&dup).is_err());
    }

    #[test]
    fn test_records_roundtrip_exact_amounts() {
        let db = Database::in_memory().unwrap();
        new_file(&db, "f1", "abc");

        db.insert_accepted("f1", &accepted(2, (2024, 1, 5), "-1234.56"))
            .unwrap();
        db.insert_rejected(
            "f1",
            &NewRejectedRecord {
                source_line: 3,
                transaction_date: Some("32.01.24".to_string()),
                amount: Some("abc".to_string()),
                description: Some("broken".to_string()),
                category: None,
                account: None,
                error_message: "Invalid date format found.".to_string(),
            },
        )
        .unwrap();

        let rows = db.list_accepted_for_file("f1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, Decimal::new(-123456, 2));
        assert_eq!(
            rows[0].transaction_date,
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
        );

        let rejected = db.list_rejected_for_file("f1").unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].amount.as_deref(), Some("abc"));
        assert!(!rejected[0].ready_for_reload);

        assert_eq!(db.count_records_for_file("f1").unwrap(), (1, 1));
    }

    #[test]
    fn test_ready_for_reload_flag() {
        let db = Database::in_memory().unwrap();
        new_file(&db, "f1", "abc");
        let id = db
            .insert_rejected(
                "f1",
                &NewRejectedRecord {
                    source_line: 2,
                    transaction_date: None,
                    amount: None,
                    description: None,
                    category: None,
                    account: None,
                    error_message: "Cleaning error: missing value".to_string(),
                },
            )
            .unwrap();

        assert!(db.list_reloadable().unwrap().is_empty());
        db.set_ready_for_reload(id, true).unwrap();
        assert_eq!(db.list_reloadable().unwrap().len(), 1);
        assert!(db.set_ready_for_reload(999, true).is_err());
    }

    #[test]
    fn test_records_cascade_with_file() {
        let db = Database::in_memory().unwrap();
        new_file(&db, "f1", "abc");
        db.insert_accepted("f1", &accepted(2, (2024, 1, 5), "1"))
            .unwrap();

        let conn = db.conn().unwrap();
        conn.execute("DELETE FROM files WHERE id = 'f1'", []).unwrap();
        drop(conn);

        assert!(db.list_accepted_records().unwrap().is_empty());
    }

    #[test]
    fn test_accepted_requires_existing_file() {
        let db = Database::in_memory().unwrap();
        let result = db.insert_accepted("ghost", &accepted(2, (2024, 1, 5), "1"));
        assert!(result.is_err(), "foreign key should reject unknown file");
    }

    #[test]
    fn test_monthly_upsert_overwrites() {
        let db = Database::in_memory().unwrap();
        let month = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let mut summary = MonthlySummary {
            transaction_month: month,
            total_expenses: Decimal::new(-5000, 2),
            total_earnings: Decimal::new(300000, 2),
            total_savings: Decimal::new(50000, 2),
            net_total: Decimal::new(295000, 2),
            transaction_count: 3,
            computed_at: Utc::now(),
        };
        db.upsert_monthly_summary(&summary).unwrap();

        summary.total_expenses = Decimal::new(-7000, 2);
        summary.transaction_count = 4;
        db.upsert_monthly_summary(&summary).unwrap();

        let rows = db.list_monthly_summaries().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_expenses, Decimal::new(-7000, 2));
        assert_eq!(rows[0].transaction_count, 4);
    }

    #[test]
    fn test_category_upsert_keyed_by_month_and_category() {
        let db = Database::in_memory().unwrap();
        let month = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        for (category, total) in [("Food", 10), ("Rent", 900), ("Food", 12)] {
            db.upsert_category_summary(&CategorySummary {
                transaction_month: month,
                category: category.to_string(),
                total_amount: Decimal::from(total),
                transaction_count: 1,
                computed_at: Utc::now(),
            })
            .unwrap();
        }

        let rows = db.list_category_summaries().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].category, "Food");
        assert_eq!(rows[0].total_amount, Decimal::from(12));
    }

    #[test]
    fn test_task_dependency_resolution() {
        let db = Database::in_memory().unwrap();

        let monthly = db
            .insert_aggregation_task(&NewAggregationTask {
                target_table: "monthly_summary".to_string(),
                routine: "monthly_summary".to_string(),
                active: true,
                depends_on: None,
                description: None,
            })
            .unwrap();
        db.insert_aggregation_task(&NewAggregationTask {
            target_table: "savings_rate_summary".to_string(),
            routine: "savings_rate".to_string(),
            active: false,
            depends_on: Some("monthly_summary".to_string()),
            description: None,
        })
        .unwrap();

        let savings = db
            .get_task_by_target("savings_rate_summary")
            .unwrap()
            .unwrap();
        assert_eq!(savings.depends_on, Some(monthly));
        assert_eq!(db.list_active_tasks().unwrap().len(), 1);

        db.set_task_active(savings.id, true).unwrap();
        assert_eq!(db.list_active_tasks().unwrap().len(), 2);

        let unknown = db.insert_aggregation_task(&NewAggregationTask {
            target_table: "x".to_string(),
            routine: "monthly_summary".to_string(),
            active: true,
            depends_on: Some("missing".to_string()),
            description: None,
        });
        assert!(matches!(unknown, Err(Error::Config(_))));
    }
}
