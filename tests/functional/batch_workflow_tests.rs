//! End-to-end setup, trigger and status tests

use crate::common::sample_data::{ORDERS_DDL, ORDERS_SOURCE, ORDERS_TARGET};
use crate::common::{setup_request, TestFixture};
use tabrecon::{CombinationMode, JobState, RunSelection};

fn orders_fixture() -> TestFixture {
    let fixture = TestFixture::new().unwrap();
    fixture
        .create_tables(ORDERS_DDL, ORDERS_SOURCE, ORDERS_TARGET)
        .unwrap();
    fixture
}

#[test]
fn test_setup_creates_one_pending_run_per_key() {
    let fixture = orders_fixture();
    let response = fixture
        .engine
        .setup(&setup_request("nightly", "orders", &["k"]))
        .unwrap();

    assert_eq!(response.total_combinations, 2);
    assert_eq!(
        fixture
            .session_count(
                "nightly",
                &format!(
                    "SELECT COUNT(*) FROM nightly WHERE batch_id = '{}' AND result IS NULL",
                    response.batch_id
                )
            )
            .unwrap(),
        2
    );
}

#[test]
fn test_end_to_end_reconciliation() {
    let fixture = orders_fixture();
    let mut request = setup_request("nightly", "orders", &["k"]);
    request.excluded_columns = vec!["updated_at".into()];

    let setup = fixture.engine.setup(&request).unwrap();
    let handle = fixture
        .engine
        .trigger(&setup.batch_id, RunSelection::Unresolved)
        .unwrap();
    assert_eq!(handle.batch_id(), setup.batch_id);
    while !handle.is_finished() {
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    let summary = handle.join().unwrap();
    assert_eq!(summary.processed, 2);

    let report = fixture.engine.status("nightly", &setup.batch_id).unwrap();
    assert_eq!(report.execution_status, JobState::Completed);
    assert_eq!(report.counts.pass, 1);
    assert_eq!(report.counts.fail, 1);
    assert_eq!(report.counts.pending, 0);

    // Run A differs only on x, 1 -> 2
    let diffs = fixture
        .session_count(
            "nightly",
            "SELECT COUNT(*) FROM differences d JOIN nightly r ON d.run_id = r.id \
             WHERE r.k = 'A' AND d.column_name = 'x' AND d.old_value = '1' AND d.new_value = '2'",
        )
        .unwrap();
    assert_eq!(diffs, 1);
    assert_eq!(
        fixture
            .session_count("nightly", "SELECT COUNT(*) FROM differences")
            .unwrap(),
        1
    );
}

#[test]
fn test_excluded_columns_never_recorded() {
    let fixture = orders_fixture();

    // Without exclusion, updated_at differs on both rows
    let setup = fixture
        .engine
        .setup(&setup_request("full", "orders", &["k"]))
        .unwrap();
    let summary = fixture
        .engine
        .run_batch(&setup.batch_id, RunSelection::Unresolved)
        .unwrap();
    assert_eq!(summary.fail, 2);

    let mut request = setup_request("trimmed", "orders", &["k"]);
    request.excluded_columns = vec!["UPDATED_AT".into()];
    let setup = fixture.engine.setup(&request).unwrap();
    fixture
        .engine
        .run_batch(&setup.batch_id, RunSelection::Unresolved)
        .unwrap();

    assert_eq!(
        fixture
            .session_count(
                "trimmed",
                "SELECT COUNT(*) FROM differences WHERE lower(column_name) = 'updated_at'"
            )
            .unwrap(),
        0
    );
}

#[test]
fn test_untriggered_batch_reports_failed_with_all_pending() {
    let fixture = orders_fixture();
    let setup = fixture
        .engine
        .setup(&setup_request("idle", "orders", &["k"]))
        .unwrap();

    let report = fixture.engine.status("idle", &setup.batch_id).unwrap();
    assert_eq!(report.execution_status, JobState::Failed);
    assert_eq!(report.counts.pending, setup.total_combinations);
    assert_eq!(report.counts.total(), setup.total_combinations);
}

#[test]
fn test_rerunning_batch_is_idempotent() {
    let fixture = orders_fixture();
    let setup = fixture
        .engine
        .setup(&setup_request("again", "orders", &["k"]))
        .unwrap();

    fixture
        .engine
        .run_batch(&setup.batch_id, RunSelection::Unresolved)
        .unwrap();
    let first_diffs = fixture
        .session_count("again", "SELECT COUNT(*) FROM differences")
        .unwrap();
    let first = fixture.engine.status("again", &setup.batch_id).unwrap();

    // Nothing is unresolved, so the default walk visits no runs
    let summary = fixture
        .engine
        .run_batch(&setup.batch_id, RunSelection::Unresolved)
        .unwrap();
    assert_eq!(summary.processed, 0);

    let summary = fixture
        .engine
        .run_batch(&setup.batch_id, RunSelection::All)
        .unwrap();
    assert_eq!(summary.processed, 2);

    let second = fixture.engine.status("again", &setup.batch_id).unwrap();
    assert_eq!(first.counts, second.counts);
    assert_eq!(
        fixture
            .session_count("again", "SELECT COUNT(*) FROM differences")
            .unwrap(),
        first_diffs
    );
}

#[test]
fn test_batches_in_one_session_are_independent() {
    let fixture = orders_fixture();
    let first = fixture
        .engine
        .setup(&setup_request("shared", "orders", &["k"]))
        .unwrap();
    let second = fixture
        .engine
        .setup(&setup_request("shared", "orders", &["k"]))
        .unwrap();
    assert_ne!(first.batch_id, second.batch_id);

    fixture
        .engine
        .run_batch(&first.batch_id, RunSelection::Unresolved)
        .unwrap();

    let untouched = fixture.engine.status("shared", &second.batch_id).unwrap();
    assert_eq!(untouched.counts.pending, 2);
    assert_eq!(
        fixture.engine.batch_config(&second.batch_id).unwrap().unwrap().total_runs,
        2
    );
}

#[test]
fn test_combinatorial_mode_creates_binomial_runs() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .create_tables(
            "CREATE TABLE pairs (a VARCHAR, b VARCHAR, v INTEGER)",
            "INSERT INTO pairs VALUES ('1', 'x', 1), ('2', 'y', 1), ('3', 'z', 1), ('4', 'w', 1)",
            "INSERT INTO pairs VALUES ('1', 'x', 1)",
        )
        .unwrap();

    let mut request = setup_request("combos", "pairs", &["a", "b"]);
    request.mode = Some(CombinationMode::Combinatorial);
    let response = fixture.engine.setup(&request).unwrap();

    // C(4, 2)
    assert_eq!(response.total_combinations, 6);
}

#[test]
fn test_composite_keys_per_row() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .create_tables(
            "CREATE TABLE stock (region VARCHAR, sku INTEGER, qty INTEGER)",
            "INSERT INTO stock VALUES ('eu', 1, 10), ('eu', 2, 20), ('us', 1, 30)",
            "INSERT INTO stock VALUES ('eu', 1, 10), ('eu', 2, 21), ('us', 1, 30)",
        )
        .unwrap();

    let setup = fixture
        .engine
        .setup(&setup_request("stock check", "stock", &["region", "sku"]))
        .unwrap();
    assert_eq!(setup.total_combinations, 3);

    let summary = fixture
        .engine
        .run_batch(&setup.batch_id, RunSelection::Unresolved)
        .unwrap();
    assert_eq!((summary.pass, summary.fail), (2, 1));

    // Session names are normalized
    let report = fixture.engine.status("stock_check", &setup.batch_id).unwrap();
    assert_eq!(report.counts.fail, 1);
}
