//! Admission controller logic
//!
//! One controller owns one site's mutable state: remaining stock, the rolling
//! time budget, the simulated clock and the work still in flight. Time only
//! passes when a request arrives; each arrival sweeps the in-flight list and
//! hands finished stage time back to the budget before the request is judged.

use std::fmt;

use chrono::{Duration, NaiveDateTime};
use tracing::debug;

use crate::config::{ArrivalOrdering, ControllerConfig, OvertimePolicy};
use crate::models::{Inventory, RequestRecord, SiteMetadata, Stage, StockItem};

/// Durations a request would take at this site, fixed at admission time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkPlan {
    pub stage_seconds: [i64; 3],
    pub overtime_seconds: i64,
    pub total_seconds: i64,
}

impl WorkPlan {
    pub fn stage(&self, stage: Stage) -> i64 {
        self.stage_seconds[stage.index()]
    }
}

/// An admitted request that still holds part of the time budget
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub order_id: String,
    pub arrival: NaiveDateTime,
    pub quantity: i64,
    pub plan: WorkPlan,
    stage_done_at: [NaiveDateTime; 3],
    final_done_at: NaiveDateTime,
    stage_done: [bool; 3],
    overtime_done: bool,
}

impl WorkItem {
    /// None when a completion instant falls outside the representable calendar
    fn new(request: &RequestRecord, plan: WorkPlan) -> Option<Self> {
        let mut stage_done_at = [request.arrival; 3];
        let mut at = request.arrival;
        for stage in Stage::ALL {
            at = at.checked_add_signed(Duration::try_seconds(plan.stage(stage))?)?;
            stage_done_at[stage.index()] = at;
        }
        let final_done_at = request
            .arrival
            .checked_add_signed(Duration::try_seconds(plan.total_seconds)?)?;

        Some(WorkItem {
            order_id: request.order_id.clone(),
            arrival: request.arrival,
            quantity: request.quantity(),
            plan,
            stage_done_at,
            final_done_at,
            stage_done: [false; 3],
            overtime_done: false,
        })
    }

    pub fn done_at(&self, stage: Stage) -> NaiveDateTime {
        self.stage_done_at[stage.index()]
    }

    pub fn final_done_at(&self) -> NaiveDateTime {
        self.final_done_at
    }

    pub fn is_stage_done(&self, stage: Stage) -> bool {
        self.stage_done[stage.index()]
    }

    pub fn is_overtime_done(&self) -> bool {
        self.overtime_done
    }

    pub fn is_complete(&self) -> bool {
        self.overtime_done && self.stage_done.iter().all(|&done| done)
    }

    /// Flag everything finished by `now`; returns the seconds handed back
    fn release(&mut self, now: NaiveDateTime) -> i64 {
        let mut released: i64 = 0;
        for stage in Stage::ALL {
            let i = stage.index();
            if !self.stage_done[i] && self.stage_done_at[i] <= now {
                self.stage_done[i] = true;
                released = released.saturating_add(self.plan.stage_seconds[i]);
                debug!(order = %self.order_id, stage = stage.name(), "stage complete");
            }
        }
        if !self.overtime_done && self.final_done_at <= now {
            self.overtime_done = true;
            released = released.saturating_add(self.plan.overtime_seconds);
        }
        released
    }
}

/// Why a request was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    OutOfOrder,     // Arrived no later than the site clock
    ExceedsCeiling, // Longer than any single request may take
    ExceedsBudget,  // Not enough rolling budget left
    StockDepleted,  // Some tracked item had already run out
}

impl RejectReason {
    pub fn as_label(&self) -> &'static str {
        match self {
            RejectReason::OutOfOrder => "out_of_order",
            RejectReason::ExceedsCeiling => "exceeds_ceiling",
            RejectReason::ExceedsBudget => "exceeds_budget",
            RejectReason::StockDepleted => "stock_depleted",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accepted { duration: i64 },
    Rejected { reason: RejectReason },
}

/// The verdict on a single request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub site_id: String,
    pub order_id: String,
    pub outcome: Outcome,
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, Outcome::Accepted { .. })
    }

    pub fn verdict(&self) -> &'static str {
        if self.is_accepted() { "ACCEPT" } else { "REJECT" }
    }

    pub fn duration(&self) -> Option<i64> {
        match self.outcome {
            Outcome::Accepted { duration } => Some(duration),
            Outcome::Rejected { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self.outcome {
            Outcome::Accepted { .. } => None,
            Outcome::Rejected { reason } => Some(reason),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.duration() {
            Some(duration) => write!(
                f,
                "{}, {}, {}, {}",
                self.site_id,
                self.order_id,
                self.verdict(),
                duration
            ),
            None => write!(f, "{}, {}, {},", self.site_id, self.order_id, self.verdict()),
        }
    }
}

/// End-of-stream summary for a site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub site_id: String,
    pub cumulative_time: i64,
    pub inventory: Inventory,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}, TOTAL, {}", self.site_id, self.cumulative_time)?;
        write!(f, "{}, INVENTORY, {}", self.site_id, self.inventory)
    }
}

/// Running tally of verdicts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub accepted: usize,
    pub out_of_order: usize,
    pub exceeds_ceiling: usize,
    pub exceeds_budget: usize,
    pub stock_depleted: usize,
}

impl ControllerStats {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Accepted { .. } => self.accepted += 1,
            Outcome::Rejected { reason } => match reason {
                RejectReason::OutOfOrder => self.out_of_order += 1,
                RejectReason::ExceedsCeiling => self.exceeds_ceiling += 1,
                RejectReason::ExceedsBudget => self.exceeds_budget += 1,
                RejectReason::StockDepleted => self.stock_depleted += 1,
            },
        }
    }

    pub fn rejected(&self) -> usize {
        self.out_of_order + self.exceeds_ceiling + self.exceeds_budget + self.stock_depleted
    }
}

#[derive(Debug, Clone)]
pub struct AdmissionController {
    site: SiteMetadata,
    config: ControllerConfig,
    stock: Inventory,
    budget: i64,
    clock: Option<NaiveDateTime>,
    in_flight: Vec<WorkItem>,
    cumulative: i64,
    stats: ControllerStats,
}

impl AdmissionController {
    pub fn new(site: SiteMetadata, config: ControllerConfig) -> Self {
        AdmissionController {
            stock: site.stock,
            budget: config.initial_budget_seconds,
            site,
            config,
            clock: None,
            in_flight: Vec::new(),
            cumulative: 0,
            stats: ControllerStats::default(),
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site.site_id
    }

    pub fn time_budget(&self) -> i64 {
        self.budget
    }

    pub fn clock(&self) -> Option<NaiveDateTime> {
        self.clock
    }

    pub fn inventory(&self) -> &Inventory {
        &self.stock
    }

    pub fn in_flight(&self) -> &[WorkItem] {
        &self.in_flight
    }

    pub fn cumulative_time(&self) -> i64 {
        self.cumulative
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    /// Compute stage, overtime and total durations for `quantity` units.
    /// None when the arithmetic does not fit in an `i64`.
    pub fn plan(&self, quantity: i64) -> Option<WorkPlan> {
        let mut stage_seconds = [0i64; 3];
        let mut overtime_seconds: i64 = 0;

        for stage in Stage::ALL {
            let spec = self.site.stage(stage);
            stage_seconds[stage.index()] = quantity.min(spec.capacity).checked_mul(spec.unit_seconds)?;

            let excess = quantity.checked_sub(spec.capacity)?;
            let excess = match self.config.overtime {
                OvertimePolicy::Clamped => excess.max(0),
                OvertimePolicy::Signed => excess,
            };
            overtime_seconds = overtime_seconds.checked_add(excess.checked_mul(spec.unit_seconds)?)?;
        }

        let total_seconds = stage_seconds
            .iter()
            .try_fold(overtime_seconds, |acc, &secs| acc.checked_add(secs))?;

        Some(WorkPlan {
            stage_seconds,
            overtime_seconds,
            total_seconds,
        })
    }

    /// Decide whether `request` can be admitted and update the site state
    pub fn accept(&mut self, request: &RequestRecord) -> Decision {
        let outcome = self.judge(request);
        self.stats.record(&outcome);

        let decision = Decision {
            site_id: self.site.site_id.clone(),
            order_id: request.order_id.clone(),
            outcome,
        };
        debug!(
            site = %decision.site_id,
            order = %decision.order_id,
            verdict = decision.verdict(),
            reason = decision.reason().map(|r| r.as_label()),
            budget = self.budget,
            in_flight = self.in_flight.len(),
            "decision"
        );
        decision
    }

    fn judge(&mut self, request: &RequestRecord) -> Outcome {
        if !self.advance_clock(request.arrival) {
            return Outcome::Rejected {
                reason: RejectReason::OutOfOrder,
            };
        }
        self.sweep();

        // Work that cannot be timed on the calendar can never fit under the ceiling
        let unschedulable = Outcome::Rejected {
            reason: RejectReason::ExceedsCeiling,
        };
        let Some(plan) = self.plan(request.quantity()) else {
            return unschedulable;
        };
        if let Some(reason) = self.check(&plan) {
            return Outcome::Rejected { reason };
        }

        let (Some(item), Some(budget), Some(cumulative)) = (
            WorkItem::new(request, plan),
            self.budget.checked_sub(plan.total_seconds),
            self.cumulative.checked_add(plan.total_seconds),
        ) else {
            return unschedulable;
        };

        self.budget = budget;
        self.cumulative = cumulative;
        self.commit(request, item);
        Outcome::Accepted {
            duration: plan.total_seconds,
        }
    }

    /// Move the clock to `arrival`; false when the arrival must be refused
    fn advance_clock(&mut self, arrival: NaiveDateTime) -> bool {
        let next = match (self.clock, self.config.ordering) {
            (None, _) => arrival,
            (Some(now), ArrivalOrdering::Strict) if arrival <= now => return false,
            (Some(_), ArrivalOrdering::Strict) => arrival,
            (Some(now), ArrivalOrdering::FileOrder) => now.max(arrival),
        };
        self.clock = Some(next);
        true
    }

    /// Release finished stage time and drop work that is fully done
    fn sweep(&mut self) {
        let Some(now) = self.clock else {
            return;
        };

        let released = self
            .in_flight
            .iter_mut()
            .fold(0i64, |acc, item| acc.saturating_add(item.release(now)));
        let before = self.in_flight.len();
        self.in_flight.retain(|item| !item.is_complete());
        self.budget = self.budget.saturating_add(released);

        if released != 0 || before != self.in_flight.len() {
            debug!(
                site = %self.site.site_id,
                released,
                retired = before - self.in_flight.len(),
                budget = self.budget,
                "sweep"
            );
        }
    }

    fn check(&self, plan: &WorkPlan) -> Option<RejectReason> {
        if plan.total_seconds > self.config.ceiling_seconds {
            Some(RejectReason::ExceedsCeiling)
        } else if plan.total_seconds > self.budget {
            Some(RejectReason::ExceedsBudget)
        } else if self.stock.any_depleted() {
            Some(RejectReason::StockDepleted)
        } else {
            None
        }
    }

    fn commit(&mut self, request: &RequestRecord, item: WorkItem) {
        let used = request.ingredient_counts();
        for item in StockItem::ALL {
            self.stock.take(item, used[item.index()]);
        }

        self.in_flight.push(item);
    }

    /// Total admitted time and remaining stock. Does not change state.
    pub fn final_report(&self) -> Report {
        Report {
            site_id: self.site.site_id.clone(),
            cumulative_time: self.cumulative,
            inventory: self.stock,
        }
    }
}
