//! Site Admission CLI
//!
//! Replays order streams through per-site admission controllers.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing_subscriber::EnvFilter;

use site_admission::config::{ArrivalOrdering, ControllerConfig, DEFAULT_LIMIT_SECONDS, OvertimePolicy};
use site_admission::{db, runner};

#[derive(Parser)]
#[command(name = "site-admission")]
#[command(about = "Order admission controller for production sites")]
struct Cli {
    /// Path to the SQLite audit database
    #[arg(short, long, default_value = "admission.db")]
    database: PathBuf,

    /// Log more (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an order file, or every .csv file in a directory
    Run {
        /// Input file or directory
        input: PathBuf,

        /// Record every decision in the audit database
        #[arg(long)]
        record: bool,

        /// Longest a single order may take, in minutes
        #[arg(long, default_value_t = DEFAULT_LIMIT_SECONDS / 60)]
        ceiling_minutes: i64,

        /// Rolling time budget a site opens with, in minutes
        #[arg(long, default_value_t = DEFAULT_LIMIT_SECONDS / 60)]
        budget_minutes: i64,

        /// How time beyond a stage's capacity is charged
        #[arg(long, value_enum, default_value_t = OvertimePolicy::Clamped)]
        overtime: OvertimePolicy,

        /// How orders that do not move the clock forward are handled
        #[arg(long, value_enum, default_value_t = ArrivalOrdering::Strict)]
        ordering: ArrivalOrdering,
    },

    /// Show recorded decisions
    History {
        /// Only this site
        #[arg(long)]
        site: Option<String>,

        /// Number of most recent decisions to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// List recorded runs
    Runs,

    /// Initialize empty audit database with schema
    Init,

    /// Delete all recorded history
    Clear,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            input,
            record,
            ceiling_minutes,
            budget_minutes,
            overtime,
            ordering,
        } => {
            let config = ControllerConfig::from_minutes(ceiling_minutes, budget_minutes, overtime, ordering);
            let conn = if record {
                Some(open_database(&cli.database)?)
            } else {
                None
            };

            let stdout = io::stdout();
            let mut out = stdout.lock();
            runner::simulate_path(&input, &config, &mut out, conn.as_ref())?;
            out.flush()?;
        }

        Commands::History { site, limit } => {
            let conn = open_database(&cli.database)?;
            let decisions = db::list_decisions(&conn, site.as_deref(), limit)?;
            if decisions.is_empty() {
                println!("No decisions recorded. Run 'run --record' first.");
            } else {
                for d in decisions {
                    println!("{}", d);
                }
            }
        }

        Commands::Runs => {
            let conn = open_database(&cli.database)?;
            let runs = db::list_runs(&conn)?;
            if runs.is_empty() {
                println!("No runs recorded. Run 'run --record' first.");
            } else {
                println!(
                    "{:>4} {:<8} {:>8} {:>8} {:>10}  {:<20} {}",
                    "Run", "Site", "Accept", "Reject", "Total (s)", "Recorded", "Source"
                );
                println!("{}", "-".repeat(80));
                for r in runs {
                    let total = r
                        .total_seconds
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:>4} {:<8} {:>8} {:>8} {:>10}  {:<20} {}",
                        r.id, r.site_id, r.accepted, r.rejected, total, r.recorded_at, r.source
                    );
                    let stock = db::run_inventory(&conn, r.id)?;
                    if !stock.is_empty() {
                        let parts: Vec<String> =
                            stock.iter().map(|(item, n)| format!("{}={}", item, n)).collect();
                        println!("     stock: {}", parts.join(" "));
                    }
                }
            }
        }

        Commands::Init => {
            open_database(&cli.database)?;
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::Clear => {
            let conn = open_database(&cli.database)?;
            db::clear_history(&conn)?;
            println!("Cleared recorded history in {}", cli.database.display());
        }
    }

    Ok(())
}
