//! Integration tests for running order files end to end.
//!
//! Uses tempfile for input directories and audit databases.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use site_admission::config::{ArrivalOrdering, ControllerConfig, OvertimePolicy};
use site_admission::{db, runner};
use tempfile::TempDir;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn run(input: &Path, config: &ControllerConfig) -> (Vec<String>, Vec<runner::SiteRun>) {
    let mut out = Vec::new();
    let runs = runner::simulate_path(input, config, &mut out, None).unwrap();
    let text = String::from_utf8(out).unwrap();
    (text.lines().map(str::to_string).collect(), runs)
}

const R1: &str = "R1,4,5,3,4,2,3,10,10,10,10,10
R1,2020-12-08 19:15:31,O1,BLT,LT,VLT
R1,2020-12-08 19:15:00,O2,LT
";

const R2: &str = "R2,2C,60,2A,60,2P,60,20,20,20,20,20
R2,2020-12-08 10:00:00,A1,BLT,BLT,BLT,BLT
R2,2020-12-08 10:00:01,A2,LT,LT,LT,LT
R2,2020-12-08 10:00:02,A3,L
R2,2020-12-08 11:00:00,A4,L
";

// =============================================================================
// SINGLE FILE
// =============================================================================

#[test]
fn test_reference_site_output() {
    let temp = create_temp_dir();
    let input = write_file(temp.path(), "r1.csv", R1);

    let (lines, runs) = run(&input, &ControllerConfig::default());
    assert_eq!(
        lines,
        vec![
            "R1, O1, ACCEPT, 36",
            "R1, O2, REJECT,",
            "R1, TOTAL, 36",
            "R1, INVENTORY, 4, 7, 7, 9, 9",
        ]
    );
    assert_eq!(runs.len(), 1);
}

#[test]
fn test_budget_and_ceiling_interplay() {
    // Four units: 2 per stage at 60s plus 2 units of overtime per stage = 720s
    let temp = create_temp_dir();
    let input = write_file(temp.path(), "r2.csv", R2);

    let (lines, runs) = run(&input, &ControllerConfig::default());
    assert_eq!(
        lines,
        vec![
            "R2, A1, ACCEPT, 720",
            "R2, A2, REJECT,",
            "R2, A3, ACCEPT, 180",
            "R2, A4, ACCEPT, 180",
            "R2, TOTAL, 1080",
            "R2, INVENTORY, 8, 14, 16, 20, 16",
        ]
    );
    assert_eq!(runs[0].stats.verdicts.exceeds_budget, 1);
}

#[test]
fn test_short_ceiling_rejects_everything_long() {
    let temp = create_temp_dir();
    let input = write_file(temp.path(), "r2.csv", R2);
    let config = ControllerConfig::from_minutes(5, 20, OvertimePolicy::Clamped, ArrivalOrdering::Strict);

    let (lines, runs) = run(&input, &config);
    assert_eq!(lines[0], "R2, A1, REJECT,");
    assert_eq!(lines[1], "R2, A2, REJECT,");
    assert_eq!(runs[0].stats.verdicts.exceeds_ceiling, 2);
    assert_eq!(runs[0].report.cumulative_time, 360);
}

#[test]
fn test_file_order_mode_keeps_late_orders() {
    let temp = create_temp_dir();
    let input = write_file(temp.path(), "r1.csv", R1);
    let config = ControllerConfig {
        ordering: ArrivalOrdering::FileOrder,
        ..ControllerConfig::default()
    };

    let (lines, _) = run(&input, &config);
    assert_eq!(lines[1], "R1, O2, ACCEPT, 12");
    assert_eq!(lines[2], "R1, TOTAL, 48");
}

#[test]
fn test_malformed_timestamp_halts_run() {
    let temp = create_temp_dir();
    let input = write_file(
        temp.path(),
        "bad.csv",
        "R1,4,5,3,4,2,3,10,10,10,10,10\nR1,08/12/2020 19:15,O1,BLT\n",
    );

    let mut out = Vec::new();
    let err = runner::simulate_path(&input, &ControllerConfig::default(), &mut out, None).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("bad.csv"));
    assert!(message.contains("line 2"));
    assert!(message.contains("malformed timestamp"));
    assert!(out.is_empty());
}

#[test]
fn test_missing_file_is_an_error() {
    let temp = create_temp_dir();
    let mut out = Vec::new();
    let result = runner::simulate_path(
        &temp.path().join("absent.csv"),
        &ControllerConfig::default(),
        &mut out,
        None,
    );
    assert!(result.is_err());
}

// =============================================================================
// DIRECTORY RUNS
// =============================================================================

#[test]
fn test_directory_runs_each_site_independently() {
    let temp = create_temp_dir();
    write_file(temp.path(), "a_r1.csv", R1);
    write_file(temp.path(), "b_r2.csv", R2);
    write_file(temp.path(), "notes.txt", "not an order file");

    let (lines, runs) = run(temp.path(), &ControllerConfig::default());
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].report.site_id, "R1");
    assert_eq!(runs[1].report.site_id, "R2");
    assert_eq!(lines.len(), 4 + 6);
    assert_eq!(lines[3], "R1, INVENTORY, 4, 7, 7, 9, 9");
    assert_eq!(lines[4], "R2, A1, ACCEPT, 720");
}

#[test]
fn test_directory_finds_nested_inputs() {
    let temp = create_temp_dir();
    let nested = temp.path().join("north");
    std::fs::create_dir(&nested).unwrap();
    write_file(&nested, "r2.csv", R2);

    let files = runner::find_input_files(temp.path()).unwrap();
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("north/r2.csv"));
}

#[test]
fn test_duplicate_site_is_refused() {
    let temp = create_temp_dir();
    write_file(temp.path(), "first.csv", R1);
    write_file(temp.path(), "second.csv", R1);

    let mut out = Vec::new();
    let err = runner::simulate_path(temp.path(), &ControllerConfig::default(), &mut out, None).unwrap_err();
    assert!(err.to_string().contains("site R1"));
    assert!(out.is_empty());
}

#[test]
fn test_bad_file_in_directory_stops_before_any_output() {
    let temp = create_temp_dir();
    write_file(temp.path(), "a_r1.csv", R1);
    write_file(
        temp.path(),
        "b_bad.csv",
        "R3,4,5,3,4,2,3,10,10,10,10,10\nR3,not a time,O1,BLT\n",
    );
    let db_path = temp.path().join("audit.db");
    let conn = Connection::open(&db_path).unwrap();
    db::init_schema(&conn).unwrap();

    let mut out = Vec::new();
    let err = runner::simulate_path(temp.path(), &ControllerConfig::default(), &mut out, Some(&conn)).unwrap_err();
    assert!(format!("{:#}", err).contains("b_bad.csv"));
    assert!(out.is_empty());
    assert!(db::list_runs(&conn).unwrap().is_empty());
}

// =============================================================================
// AUDIT DATABASE
// =============================================================================

#[test]
fn test_recorded_run_survives_reopen() {
    let temp = create_temp_dir();
    let input = write_file(temp.path(), "r1.csv", R1);
    let db_path = temp.path().join("audit.db");

    {
        let conn = Connection::open(&db_path).unwrap();
        db::init_schema(&conn).unwrap();
        let mut out = Vec::new();
        runner::simulate_path(&input, &ControllerConfig::default(), &mut out, Some(&conn)).unwrap();
    }

    let conn = Connection::open(&db_path).unwrap();
    let runs = db::list_runs(&conn).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].site_id, "R1");
    assert_eq!(runs[0].accepted, 1);
    assert_eq!(runs[0].rejected, 1);

    let history = db::list_decisions(&conn, None, 50).unwrap();
    assert_eq!(history[0].to_string(), format!("[run {} #0] 2020-12-08 19:15:31 R1, O1, ACCEPT, 36", runs[0].id));
    assert_eq!(history[1].reason.as_deref(), Some("out_of_order"));
}
