//! Edge cases in setup validation

use crate::common::sample_data::{ORDERS_DDL, ORDERS_SOURCE, ORDERS_TARGET};
use crate::common::{setup_request, TestFixture};
use tabrecon::{CombinationMode, ReconError, SetupRequest};

fn orders_fixture() -> TestFixture {
    let fixture = TestFixture::new().unwrap();
    fixture
        .create_tables(ORDERS_DDL, ORDERS_SOURCE, ORDERS_TARGET)
        .unwrap();
    fixture
}

fn assert_nothing_written(fixture: &TestFixture, session: &str) {
    let name = tabrecon::session::SessionName::normalize(session).unwrap();
    assert!(
        !fixture.workspace().session_exists(&name),
        "rejected setup must not create a session store"
    );
}

#[test]
fn test_identifiers_with_quotes_or_spaces_are_rejected() {
    let fixture = orders_fixture();

    let cases: Vec<SetupRequest> = vec![
        SetupRequest {
            source_table: "orders\"; DROP TABLE orders; --".into(),
            ..setup_request("inj", "orders", &["k"])
        },
        SetupRequest {
            target_table: "order s".into(),
            ..setup_request("inj", "orders", &["k"])
        },
        setup_request("inj", "orders", &["k\""]),
        setup_request("in\"j", "orders", &["k"]),
    ];

    for request in cases {
        let err = fixture.engine.setup(&request).unwrap_err();
        assert!(
            matches!(err, ReconError::InvalidIdentifier { .. }),
            "{:?} gave {}",
            request,
            err
        );
    }
    assert_nothing_written(&fixture, "inj");
}

#[test]
fn test_reserved_names_are_rejected() {
    let fixture = orders_fixture();
    assert!(fixture
        .engine
        .setup(&setup_request("differences", "orders", &["k"]))
        .is_err());
    assert!(fixture
        .engine
        .setup(&setup_request("s", "orders", &["id"]))
        .is_err());
}

#[test]
fn test_missing_table_is_schema_error() {
    let fixture = orders_fixture();
    let err = fixture
        .engine
        .setup(&setup_request("missing", "nope", &["k"]))
        .unwrap_err();
    assert!(matches!(err, ReconError::Schema { .. }));
    assert_nothing_written(&fixture, "missing");
}

#[test]
fn test_missing_key_column_is_schema_error() {
    let fixture = orders_fixture();
    let err = fixture
        .engine
        .setup(&setup_request("nokey", "orders", &["sku"]))
        .unwrap_err();
    assert!(matches!(err, ReconError::Schema { .. }));
    assert_nothing_written(&fixture, "nokey");
}

#[test]
fn test_column_set_mismatch_rejected_before_writing() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .source_sql("CREATE TABLE t (k VARCHAR, a INTEGER); INSERT INTO t VALUES ('A', 1)")
        .unwrap();
    fixture
        .target_sql("CREATE TABLE t (k VARCHAR, b INTEGER); INSERT INTO t VALUES ('A', 1)")
        .unwrap();

    let err = fixture
        .engine
        .setup(&setup_request("mismatch", "t", &["k"]))
        .unwrap_err();
    assert!(matches!(err, ReconError::SchemaMismatch { .. }));
    assert_nothing_written(&fixture, "mismatch");
}

#[test]
fn test_existing_session_with_other_keys_is_rejected() {
    let fixture = orders_fixture();
    fixture
        .engine
        .setup(&setup_request("keyed", "orders", &["k"]))
        .unwrap();

    let err = fixture
        .engine
        .setup(&setup_request("keyed", "orders", &["k", "note"]))
        .unwrap_err();
    assert!(matches!(err, ReconError::Schema { .. }));
}

#[test]
fn test_run_limit_guards_combinatorial_blowup() {
    let fixture = TestFixture::with_config(r#"{"max_runs": 1000}"#).unwrap();
    fixture
        .create_tables(
            "CREATE TABLE wide (a INTEGER, b INTEGER, c INTEGER)",
            "INSERT INTO wide SELECT i, i, i FROM range(200) t(i)",
            "",
        )
        .unwrap();

    // C(200, 3) is far above the limit
    let mut request = setup_request("wide", "wide", &["a", "b", "c"]);
    request.mode = Some(CombinationMode::Combinatorial);
    let err = fixture.engine.setup(&request).unwrap_err();
    assert!(matches!(err, ReconError::InvalidInput { .. }));
    assert_nothing_written(&fixture, "wide");

    // Per-row stays within the limit
    request.mode = None;
    assert_eq!(fixture.engine.setup(&request).unwrap().total_combinations, 200);
}

#[test]
fn test_empty_source_creates_empty_batch() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .create_tables("CREATE TABLE t (k VARCHAR, v INTEGER)", "", "")
        .unwrap();
    let setup = fixture
        .engine
        .setup(&setup_request("empty", "t", &["k"]))
        .unwrap();
    assert_eq!(setup.total_combinations, 0);

    let report = fixture.engine.status("empty", &setup.batch_id).unwrap();
    assert_eq!(report.counts.total(), 0);
}

#[test]
fn test_excluded_columns_match_declared_names_with_spaces() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .create_tables(
            "CREATE TABLE sheet (k VARCHAR, qty INTEGER, \"Updated At\" VARCHAR)",
            "INSERT INTO sheet VALUES ('A', 1, 'mon'), ('B', 2, 'mon')",
            "INSERT INTO sheet VALUES ('A', 1, 'tue'), ('B', 3, 'tue')",
        )
        .unwrap();

    let request = SetupRequest {
        excluded_columns: vec!["updated at".into()],
        ..setup_request("sheet", "sheet", &["k"])
    };
    let setup = fixture.engine.setup(&request).unwrap();
    let config = fixture.engine.batch_config(&setup.batch_id).unwrap().unwrap();
    assert_eq!(config.excluded_columns, vec!["updated at".to_string()]);

    let summary = fixture
        .engine
        .run_batch(&setup.batch_id, tabrecon::RunSelection::Unresolved)
        .unwrap();
    assert_eq!((summary.pass, summary.fail), (1, 1));
    assert_eq!(
        fixture
            .session_count(
                "sheet",
                "SELECT COUNT(*) FROM differences WHERE column_name = 'Updated At'"
            )
            .unwrap(),
        0
    );
}

#[test]
fn test_unknown_excluded_column_is_schema_error() {
    let fixture = orders_fixture();
    let request = SetupRequest {
        excluded_columns: vec!["x y".into()],
        ..setup_request("ghost", "orders", &["k"])
    };
    let err = fixture.engine.setup(&request).unwrap_err();
    assert!(matches!(err, ReconError::Schema { .. }));
    assert_nothing_written(&fixture, "ghost");
}

#[test]
fn test_failed_config_write_leaves_no_runs() {
    let fixture = orders_fixture();
    let catalog = fixture
        .engine
        .stores()
        .connect(&fixture.workspace().store_path("catalog"))
        .unwrap();
    catalog
        .execute_batch("DROP TABLE IF EXISTS batch_configs; CREATE TABLE batch_configs (batch_id INTEGER)")
        .unwrap();

    assert!(fixture
        .engine
        .setup(&setup_request("orphan", "orders", &["k"]))
        .is_err());
    assert_nothing_written(&fixture, "orphan");
}

#[test]
fn test_failed_run_write_discards_config() {
    let fixture = orders_fixture();
    fixture
        .engine
        .setup(&setup_request("keyed", "orders", &["k"]))
        .unwrap();

    // Same session with other keys fails when the job table is checked
    assert!(fixture
        .engine
        .setup(&setup_request("keyed", "orders", &["note"]))
        .is_err());

    let catalog = fixture
        .engine
        .stores()
        .connect(&fixture.workspace().store_path("catalog"))
        .unwrap();
    let configs: i64 = catalog
        .query_row("SELECT COUNT(*) FROM batch_configs", [], |row| row.get(0))
        .unwrap();
    assert_eq!(configs, 1);
}
