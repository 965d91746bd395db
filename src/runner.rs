//! Drive order streams through admission controllers
//!
//! Each input file describes one site. A directory run gives every file its
//! own controller; no state is shared between sites.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::ControllerConfig;
use crate::controller::{AdmissionController, ControllerStats, Report};
use crate::db;
use crate::models::{RequestRecord, SiteMetadata};
use crate::parser;

/// Find all `*.csv` inputs under a directory, in path order
pub fn find_input_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();

    for entry in WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "csv") {
            inputs.push(path.to_path_buf());
        }
    }

    Ok(inputs)
}

/// Outcome of running one site's stream
#[derive(Debug, Clone)]
pub struct SiteRun {
    pub report: Report,
    pub stats: RunStats,
}

#[derive(Debug, Clone)]
pub struct RunStats {
    pub source: String,
    pub site_id: String,
    pub verdicts: ControllerStats,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let v = &self.verdicts;
        write!(
            f,
            "{} ({}): {} accepted, {} rejected (out of order: {}, over ceiling: {}, over budget: {}, stock depleted: {})",
            self.site_id,
            self.source,
            v.accepted,
            v.rejected(),
            v.out_of_order,
            v.exceeds_ceiling,
            v.exceeds_budget,
            v.stock_depleted
        )
    }
}

/// Read and parse one site file
pub fn load(path: &Path) -> Result<(SiteMetadata, Vec<RequestRecord>)> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let parsed = parser::parse_stream(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(parsed)
}

/// Run already-parsed requests through a fresh controller, writing one line per
/// decision and the final report to `out`
pub fn run_site<W: Write>(
    source: &str,
    site: SiteMetadata,
    requests: &[RequestRecord],
    config: &ControllerConfig,
    out: &mut W,
    audit: Option<&Connection>,
) -> Result<SiteRun> {
    let mut controller = AdmissionController::new(site, config.clone());

    let tx = audit.map(|conn| conn.unchecked_transaction()).transpose()?;
    let run_id = match &tx {
        Some(tx) => Some(db::begin_run(tx, source, controller.site_id())?),
        None => None,
    };

    for (seq, request) in requests.iter().enumerate() {
        let decision = controller.accept(request);
        writeln!(out, "{}", decision)?;

        if let (Some(tx), Some(run_id)) = (&tx, run_id) {
            db::insert_decision(tx, run_id, seq, &request.arrival, &decision)?;
        }
    }

    let report = controller.final_report();
    writeln!(out, "{}", report)?;

    if let (Some(tx), Some(run_id)) = (&tx, run_id) {
        db::finish_run(tx, run_id, &report)?;
    }
    if let Some(tx) = tx {
        tx.commit()?;
    }

    let stats = RunStats {
        source: source.to_string(),
        site_id: report.site_id.clone(),
        verdicts: controller.stats(),
    };
    info!("{}", stats);

    Ok(SiteRun { report, stats })
}

/// Parse a complete stream from text and run it
pub fn simulate<W: Write>(
    source: &str,
    text: &str,
    config: &ControllerConfig,
    out: &mut W,
    audit: Option<&Connection>,
) -> Result<SiteRun> {
    let (site, requests) =
        parser::parse_stream(text).with_context(|| format!("Failed to parse {}", source))?;
    run_site(source, site, &requests, config, out, audit)
}

/// Run a single file, or every `*.csv` file under a directory
pub fn simulate_path<W: Write>(
    input: &Path,
    config: &ControllerConfig,
    out: &mut W,
    audit: Option<&Connection>,
) -> Result<Vec<SiteRun>> {
    let files = if input.is_dir() {
        let files = find_input_files(input)?;
        info!("Found {} input files under {}", files.len(), input.display());
        if files.is_empty() {
            warn!("No .csv inputs under {}", input.display());
        }
        files
    } else {
        vec![input.to_path_buf()]
    };

    // Every input parses and names a distinct site before any output is written
    let mut seen = HashSet::new();
    let mut loaded = Vec::with_capacity(files.len());
    for path in &files {
        let (site, requests) = load(path)?;
        if !seen.insert(site.site_id.clone()) {
            bail!(
                "site {} is described by more than one input ({})",
                site.site_id,
                path.display()
            );
        }
        loaded.push((path.display().to_string(), site, requests));
    }

    let mut runs = Vec::with_capacity(loaded.len());
    for (source, site, requests) in loaded {
        runs.push(run_site(&source, site, &requests, config, out, audit)?);
    }

    Ok(runs)
}
