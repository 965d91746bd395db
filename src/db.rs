//! Audit database schema and operations
//!
//! Records what each run decided. Nothing here is read back into a controller.

use anyhow::Result;
use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::controller::{Decision, Report};
use crate::models::{DecisionRow, RunRow};
use crate::parser::TIMESTAMP_FORMAT;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per site stream processed
        CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            site_id TEXT NOT NULL,
            recorded_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            total_seconds INTEGER
        );

        -- Every verdict, in arrival order within a run
        CREATE TABLE IF NOT EXISTS decisions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id INTEGER NOT NULL,
            seq INTEGER NOT NULL,
            site_id TEXT NOT NULL,
            order_id TEXT NOT NULL,
            arrival TEXT NOT NULL,
            verdict TEXT NOT NULL,
            duration INTEGER,
            reason TEXT
        );

        -- Stock left when a run finished
        CREATE TABLE IF NOT EXISTS inventory (
            run_id INTEGER,
            item TEXT,
            remaining INTEGER NOT NULL,
            PRIMARY KEY (run_id, item)
        );

        CREATE INDEX IF NOT EXISTS idx_decisions_run ON decisions(run_id);
        CREATE INDEX IF NOT EXISTS idx_decisions_site ON decisions(site_id);
        "#,
    )?;
    Ok(())
}

/// Open a run for a site and return its id
pub fn begin_run(conn: &Connection, source: &str, site_id: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO runs (source, site_id) VALUES (?1, ?2)",
        (source, site_id),
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert a decision
pub fn insert_decision(
    conn: &Connection,
    run_id: i64,
    seq: usize,
    arrival: &NaiveDateTime,
    decision: &Decision,
) -> Result<()> {
    conn.execute(
        "INSERT INTO decisions (run_id, seq, site_id, order_id, arrival, verdict, duration, reason)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        (
            run_id,
            seq as i64,
            &decision.site_id,
            &decision.order_id,
            arrival.format(TIMESTAMP_FORMAT).to_string(),
            decision.verdict(),
            decision.duration(),
            decision.reason().map(|r| r.as_label()),
        ),
    )?;
    Ok(())
}

/// Store the final report against a run
pub fn finish_run(conn: &Connection, run_id: i64, report: &Report) -> Result<()> {
    conn.execute(
        "UPDATE runs SET total_seconds = ?1 WHERE id = ?2",
        (report.cumulative_time, run_id),
    )?;
    for (item, remaining) in report.inventory.iter() {
        conn.execute(
            "INSERT OR REPLACE INTO inventory (run_id, item, remaining) VALUES (?1, ?2, ?3)",
            (run_id, item.code().to_string(), remaining),
        )?;
    }
    Ok(())
}

/// Wipe all recorded history
pub fn clear_history(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM inventory;
        DELETE FROM decisions;
        DELETE FROM runs;
        "#,
    )?;
    Ok(())
}

/// Most recent decisions, oldest first, optionally for one site
pub fn list_decisions(conn: &Connection, site_id: Option<&str>, limit: usize) -> Result<Vec<DecisionRow>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, seq, site_id, order_id, arrival, verdict, duration, reason
         FROM decisions
         WHERE ?1 IS NULL OR site_id = ?1
         ORDER BY id DESC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map((site_id, limit as i64), |row| {
        Ok(DecisionRow {
            run_id: row.get(0)?,
            seq: row.get(1)?,
            site_id: row.get(2)?,
            order_id: row.get(3)?,
            arrival: row.get(4)?,
            verdict: row.get(5)?,
            duration: row.get(6)?,
            reason: row.get(7)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    results.reverse();
    Ok(results)
}

/// List every recorded run with its verdict counts
pub fn list_runs(conn: &Connection) -> Result<Vec<RunRow>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.source, r.site_id, r.recorded_at, r.total_seconds,
                COALESCE(SUM(d.verdict = 'ACCEPT'), 0),
                COALESCE(SUM(d.verdict = 'REJECT'), 0)
         FROM runs r
         LEFT JOIN decisions d ON d.run_id = r.id
         GROUP BY r.id
         ORDER BY r.id",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(RunRow {
            id: row.get(0)?,
            source: row.get(1)?,
            site_id: row.get(2)?,
            recorded_at: row.get(3)?,
            total_seconds: row.get(4)?,
            accepted: row.get(5)?,
            rejected: row.get(6)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Remaining stock recorded for a run, in report order
pub fn run_inventory(conn: &Connection, run_id: i64) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT item, remaining FROM inventory WHERE run_id = ?1
         ORDER BY CASE item WHEN 'P' THEN 0 WHEN 'L' THEN 1 WHEN 'T' THEN 2 WHEN 'V' THEN 3 ELSE 4 END",
    )?;

    let rows = stmt.query_map([run_id], |row| Ok((row.get(0)?, row.get(1)?)))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::controller::AdmissionController;
    use crate::parser::{parse_request, parse_site_metadata};

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn records_a_run_end_to_end() {
        let conn = open();
        let mut ctl = AdmissionController::new(
            parse_site_metadata("R1,4,5,3,4,2,3,10,10,10,10,10").unwrap(),
            ControllerConfig::default(),
        );
        let run_id = begin_run(&conn, "sample.csv", "R1").unwrap();

        let orders = [
            "R1,2020-12-08 19:15:31,O1,BLT,LT,VLT",
            "R1,2020-12-08 19:15:00,O2,LT",
        ];
        for (seq, line) in orders.iter().enumerate() {
            let req = parse_request(line).unwrap();
            let decision = ctl.accept(&req);
            insert_decision(&conn, run_id, seq, &req.arrival, &decision).unwrap();
        }
        finish_run(&conn, run_id, &ctl.final_report()).unwrap();

        let decisions = list_decisions(&conn, Some("R1"), 10).unwrap();
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].order_id, "O1");
        assert_eq!(decisions[0].duration, Some(36));
        assert_eq!(decisions[0].arrival, "2020-12-08 19:15:31");
        assert_eq!(decisions[1].verdict, "REJECT");
        assert_eq!(decisions[1].reason.as_deref(), Some("out_of_order"));

        let runs = list_runs(&conn).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].total_seconds, Some(36));
        assert_eq!(runs[0].accepted, 1);
        assert_eq!(runs[0].rejected, 1);

        let stock = run_inventory(&conn, run_id).unwrap();
        let remaining: Vec<i64> = stock.iter().map(|(_, n)| *n).collect();
        assert_eq!(remaining, vec![4, 7, 7, 9, 9]);
        assert_eq!(stock[0].0, "P");
    }

    #[test]
    fn history_filters_by_site_and_limit() {
        let conn = open();
        let mut ctl = AdmissionController::new(
            parse_site_metadata("R2,4,5,3,4,2,3,10,10,10,10,10").unwrap(),
            ControllerConfig::default(),
        );
        let run_id = begin_run(&conn, "r2.csv", "R2").unwrap();
        for (seq, line) in [
            "R2,2020-12-08 19:00:00,A,L",
            "R2,2020-12-08 19:01:00,B,T",
            "R2,2020-12-08 19:02:00,C,V",
        ]
        .iter()
        .enumerate()
        {
            let req = parse_request(line).unwrap();
            insert_decision(&conn, run_id, seq, &req.arrival, &ctl.accept(&req)).unwrap();
        }

        assert!(list_decisions(&conn, Some("R1"), 10).unwrap().is_empty());
        let latest: Vec<String> = list_decisions(&conn, None, 2)
            .unwrap()
            .into_iter()
            .map(|d| d.order_id)
            .collect();
        assert_eq!(latest, vec!["B", "C"]);
    }

    #[test]
    fn clear_history_empties_tables() {
        let conn = open();
        let run_id = begin_run(&conn, "x.csv", "R1").unwrap();
        assert!(run_id > 0);
        clear_history(&conn).unwrap();
        assert!(list_runs(&conn).unwrap().is_empty());
    }
}
