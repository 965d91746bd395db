//! Site Admission
//!
//! Decides, request by request, whether a production site can take on an
//! order given its stage capacities, its remaining stock and a rolling time
//! budget, and tracks the site's state over simulated time.

pub mod config;
pub mod controller;
pub mod db;
pub mod error;
pub mod models;
pub mod parser;
pub mod runner;

pub use config::{ArrivalOrdering, ControllerConfig, OvertimePolicy};
pub use controller::{AdmissionController, Decision, Outcome, RejectReason, Report, WorkItem, WorkPlan};
pub use error::ParseError;
pub use models::{Inventory, RequestRecord, SiteMetadata, Stage, StageSpec, StockItem};
