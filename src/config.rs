//! Controller configuration.
//!
//! [`ControllerConfig`] holds the business rules that are not part of a site's
//! metadata line: the admission ceiling, the starting time budget, how overtime
//! is charged and how strictly arrival order is enforced.
//!
//! # Example
//! ```
//! use site_admission::config::{ControllerConfig, OvertimePolicy};
//!
//! let mut cfg = ControllerConfig::default();
//! cfg.overtime = OvertimePolicy::Signed;
//! assert_eq!(cfg.ceiling_seconds, 20 * 60);
//! ```

use clap::ValueEnum;

/// Default admission ceiling and starting budget
pub const DEFAULT_LIMIT_SECONDS: i64 = 20 * 60;

/// How the per-stage overtime term `(quantity - capacity) * unit_seconds` is charged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, ValueEnum)]
pub enum OvertimePolicy {
    /// Stages under capacity contribute nothing.
    #[default]
    Clamped,
    /// Stages under capacity contribute a negative term, lowering the total.
    Signed,
}

/// How a request that does not advance the site clock is treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, ValueEnum)]
pub enum ArrivalOrdering {
    /// A request not strictly later than the clock is rejected.
    #[default]
    Strict,
    /// Requests are taken in file order; the clock never rewinds.
    FileOrder,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// No single request may take longer than this.
    pub ceiling_seconds: i64,
    /// Rolling allowance for in-flight work when the site opens.
    pub initial_budget_seconds: i64,
    pub overtime: OvertimePolicy,
    pub ordering: ArrivalOrdering,
}

impl Default for ControllerConfig {
    /// - `ceiling_seconds = 1200`
    /// - `initial_budget_seconds = 1200`
    /// - `overtime = OvertimePolicy::Clamped`
    /// - `ordering = ArrivalOrdering::Strict`
    fn default() -> Self {
        Self {
            ceiling_seconds: DEFAULT_LIMIT_SECONDS,
            initial_budget_seconds: DEFAULT_LIMIT_SECONDS,
            overtime: OvertimePolicy::default(),
            ordering: ArrivalOrdering::default(),
        }
    }
}

impl ControllerConfig {
    /// Build from whole minutes, as taken on the command line
    pub fn from_minutes(
        ceiling_minutes: i64,
        budget_minutes: i64,
        overtime: OvertimePolicy,
        ordering: ArrivalOrdering,
    ) -> Self {
        Self {
            ceiling_seconds: ceiling_minutes * 60,
            initial_budget_seconds: budget_minutes * 60,
            overtime,
            ordering,
        }
    }
}
