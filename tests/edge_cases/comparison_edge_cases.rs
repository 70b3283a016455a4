//! Edge cases in triggering and comparing runs

use crate::common::sample_data::{ORDERS_DDL, ORDERS_SOURCE, ORDERS_TARGET};
use crate::common::{setup_request, TestFixture};
use tabrecon::{JobState, ReconError, RunSelection};

#[test]
fn test_trigger_while_in_progress_conflicts() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .create_tables(ORDERS_DDL, ORDERS_SOURCE, ORDERS_TARGET)
        .unwrap();
    let setup = fixture
        .engine
        .setup(&setup_request("busy", "orders", &["k"]))
        .unwrap();

    // Simulate a walk that is still running
    fixture.engine.jobs().begin(&setup.batch_id).unwrap();
    let err = fixture
        .engine
        .trigger(&setup.batch_id, RunSelection::Unresolved)
        .unwrap_err();
    assert!(matches!(err, ReconError::ConcurrencyConflict { .. }));

    let report = fixture.engine.status("busy", &setup.batch_id).unwrap();
    assert_eq!(report.execution_status, JobState::InProgress);
}

#[test]
fn test_trigger_unknown_batch_is_config_missing() {
    let fixture = TestFixture::new().unwrap();
    let err = fixture
        .engine
        .trigger("00000000-0000-0000-0000-000000000000", RunSelection::Unresolved)
        .unwrap_err();
    assert!(matches!(err, ReconError::ConfigMissing { .. }));
}

#[test]
fn test_missing_target_row_is_no_data() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .create_tables(
            "CREATE TABLE t (k VARCHAR, v INTEGER)",
            "INSERT INTO t VALUES ('A', 1), ('B', 2)",
            "INSERT INTO t VALUES ('A', 1)",
        )
        .unwrap();
    let setup = fixture
        .engine
        .setup(&setup_request("gaps", "t", &["k"]))
        .unwrap();
    let summary = fixture
        .engine
        .run_batch(&setup.batch_id, RunSelection::Unresolved)
        .unwrap();

    assert_eq!((summary.pass, summary.no_data), (1, 1));
    let report = fixture.engine.status("gaps", &setup.batch_id).unwrap();
    assert_eq!(report.counts.no_data, 1);
    assert_eq!(
        fixture
            .session_count("gaps", "SELECT COUNT(*) FROM differences")
            .unwrap(),
        0
    );
}

#[test]
fn test_duplicate_target_rows_mark_run_as_error() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .create_tables(
            "CREATE TABLE t (k VARCHAR, v INTEGER)",
            "INSERT INTO t VALUES ('A', 1), ('B', 2)",
            "INSERT INTO t VALUES ('A', 1), ('B', 2), ('B', 3)",
        )
        .unwrap();
    let setup = fixture
        .engine
        .setup(&setup_request("dupes", "t", &["k"]))
        .unwrap();
    let summary = fixture
        .engine
        .run_batch(&setup.batch_id, RunSelection::Unresolved)
        .unwrap();

    // The batch still completes; only the ambiguous run errors
    assert_eq!((summary.pass, summary.error), (1, 1));
    let report = fixture.engine.status("dupes", &setup.batch_id).unwrap();
    assert_eq!(report.execution_status, JobState::Completed);
    assert_eq!(report.counts.error, 1);

    // Errored runs are retried by the next default walk
    fixture.target_sql("DELETE FROM t WHERE v = 3").unwrap();
    let retry = fixture
        .engine
        .run_batch(&setup.batch_id, RunSelection::Unresolved)
        .unwrap();
    assert_eq!((retry.processed, retry.pass), (1, 1));
}

#[test]
fn test_null_key_values_match_null_keys() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .create_tables(
            "CREATE TABLE t (k VARCHAR, v INTEGER)",
            "INSERT INTO t VALUES (NULL, 1), ('A', 2)",
            "INSERT INTO t VALUES (NULL, 1), ('A', 2)",
        )
        .unwrap();
    let setup = fixture
        .engine
        .setup(&setup_request("nulls", "t", &["k"]))
        .unwrap();
    let summary = fixture
        .engine
        .run_batch(&setup.batch_id, RunSelection::Unresolved)
        .unwrap();
    assert_eq!(summary.pass, 2);
}

#[test]
fn test_numeric_types_compare_by_value() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .source_sql("CREATE TABLE m (k VARCHAR, amount DECIMAL(10,2), flag BOOLEAN); INSERT INTO m VALUES ('A', 1.50, true)")
        .unwrap();
    fixture
        .target_sql("CREATE TABLE m (k VARCHAR, amount DOUBLE, flag VARCHAR); INSERT INTO m VALUES ('A', 1.5, 'true')")
        .unwrap();

    let setup = fixture
        .engine
        .setup(&setup_request("typed", "m", &["k"]))
        .unwrap();
    let summary = fixture
        .engine
        .run_batch(&setup.batch_id, RunSelection::Unresolved)
        .unwrap();
    assert_eq!(summary.pass, 1);
}

#[test]
fn test_schema_drift_after_setup_fails_batch() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .create_tables(ORDERS_DDL, ORDERS_SOURCE, ORDERS_TARGET)
        .unwrap();
    let setup = fixture
        .engine
        .setup(&setup_request("drift", "orders", &["k"]))
        .unwrap();

    fixture
        .target_sql("ALTER TABLE orders ADD COLUMN extra INTEGER")
        .unwrap();
    let err = fixture
        .engine
        .run_batch(&setup.batch_id, RunSelection::Unresolved)
        .unwrap_err();
    assert!(matches!(err, ReconError::SchemaMismatch { .. }));

    let report = fixture.engine.status("drift", &setup.batch_id).unwrap();
    assert_eq!(report.execution_status, JobState::Failed);
    assert!(report.last_error.is_some());
    assert_eq!(report.counts.pending, 2);
}

#[test]
fn test_wide_decimals_differing_in_last_digit_fail() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .create_tables(
            "CREATE TABLE ledger (k VARCHAR, amount DECIMAL(38,2))",
            "INSERT INTO ledger VALUES ('A', 12345678901234567.01), ('B', 5.10)",
            "INSERT INTO ledger VALUES ('A', 12345678901234567.02), ('B', 5.1)",
        )
        .unwrap();
    let setup = fixture
        .engine
        .setup(&setup_request("ledger", "ledger", &["k"]))
        .unwrap();
    let summary = fixture
        .engine
        .run_batch(&setup.batch_id, RunSelection::Unresolved)
        .unwrap();

    assert_eq!((summary.pass, summary.fail), (1, 1));
    assert_eq!(
        fixture
            .session_count(
                "ledger",
                "SELECT COUNT(*) FROM differences WHERE column_name = 'amount' \
                 AND old_value = '12345678901234567.01' AND new_value = '12345678901234567.02'"
            )
            .unwrap(),
        1
    );
}

#[test]
fn test_real_and_double_columns_agree_on_same_literal() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .source_sql("CREATE TABLE r (k VARCHAR, v REAL, n BIGINT); INSERT INTO r VALUES ('A', 0.1, 9007199254740993)")
        .unwrap();
    fixture
        .target_sql("CREATE TABLE r (k VARCHAR, v DOUBLE, n DOUBLE); INSERT INTO r VALUES ('A', 0.1, 9007199254740992)")
        .unwrap();

    let setup = fixture
        .engine
        .setup(&setup_request("widths", "r", &["k"]))
        .unwrap();
    let summary = fixture
        .engine
        .run_batch(&setup.batch_id, RunSelection::Unresolved)
        .unwrap();

    // Only the integer that a double cannot hold differs
    assert_eq!(summary.fail, 1);
    assert_eq!(
        fixture
            .session_count("widths", "SELECT COUNT(*) FROM differences WHERE column_name = 'n'")
            .unwrap(),
        1
    );
    assert_eq!(
        fixture
            .session_count("widths", "SELECT COUNT(*) FROM differences")
            .unwrap(),
        1
    );
}
