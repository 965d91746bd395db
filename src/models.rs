//! Data models for sites, stages, stock and incoming requests

use std::fmt;

use chrono::NaiveDateTime;

/// One of the three sequential processing stages a request passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Cook,
    Assemble,
    Package,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Cook, Stage::Assemble, Stage::Package];

    pub fn index(self) -> usize {
        match self {
            Stage::Cook => 0,
            Stage::Assemble => 1,
            Stage::Package => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Cook => "cook",
            Stage::Assemble => "assemble",
            Stage::Package => "package",
        }
    }
}

/// Throughput parameters for a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSpec {
    pub capacity: i64,     // Units processed concurrently
    pub unit_seconds: i64, // Seconds contributed per unit of work
}

/// A tracked consumable. `Bun` is the base component, consumed twice per unit
/// ordered and never named by an item code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StockItem {
    Bun,
    Lettuce,
    Tomato,
    Veggie,
    Bacon,
}

impl StockItem {
    /// Report order, which is also the order stock appears on the metadata line
    pub const ALL: [StockItem; 5] = [
        StockItem::Bun,
        StockItem::Lettuce,
        StockItem::Tomato,
        StockItem::Veggie,
        StockItem::Bacon,
    ];

    pub fn index(self) -> usize {
        match self {
            StockItem::Bun => 0,
            StockItem::Lettuce => 1,
            StockItem::Tomato => 2,
            StockItem::Veggie => 3,
            StockItem::Bacon => 4,
        }
    }

    pub fn code(self) -> char {
        match self {
            StockItem::Bun => 'P',
            StockItem::Lettuce => 'L',
            StockItem::Tomato => 'T',
            StockItem::Veggie => 'V',
            StockItem::Bacon => 'B',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StockItem::Bun => "Bun",
            StockItem::Lettuce => "Lettuce",
            StockItem::Tomato => "Tomatoes",
            StockItem::Veggie => "Veggie Burger",
            StockItem::Bacon => "Bacon",
        }
    }

    /// Map a letter from an item code to the ingredient it consumes
    pub fn from_ingredient(letter: char) -> Option<StockItem> {
        match letter {
            'L' => Some(StockItem::Lettuce),
            'T' => Some(StockItem::Tomato),
            'V' => Some(StockItem::Veggie),
            'B' => Some(StockItem::Bacon),
            _ => None,
        }
    }
}

/// Remaining count per tracked item. Counts may go negative once a site
/// runs dry mid-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Inventory {
    counts: [i64; 5],
}

impl Inventory {
    /// Build from counts in `StockItem::ALL` order
    pub fn new(counts: [i64; 5]) -> Self {
        Inventory { counts }
    }

    pub fn get(&self, item: StockItem) -> i64 {
        self.counts[item.index()]
    }

    pub fn take(&mut self, item: StockItem, amount: i64) {
        self.counts[item.index()] -= amount;
    }

    /// True when any tracked item has nothing left
    pub fn any_depleted(&self) -> bool {
        self.counts.iter().any(|&c| c <= 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StockItem, i64)> + '_ {
        StockItem::ALL.into_iter().map(move |item| (item, self.get(item)))
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.counts.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Fixed description of a site, read once from the first input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteMetadata {
    pub site_id: String,
    pub cook: StageSpec,
    pub assemble: StageSpec,
    pub package: StageSpec,
    pub stock: Inventory,
}

impl SiteMetadata {
    pub fn stage(&self, stage: Stage) -> StageSpec {
        match stage {
            Stage::Cook => self.cook,
            Stage::Assemble => self.assemble,
            Stage::Package => self.package,
        }
    }
}

/// One inbound work request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    pub order_id: String,
    pub site_id: String,
    pub arrival: NaiveDateTime,
    pub items: Vec<String>, // Item codes, e.g. "BLT"
}

impl RequestRecord {
    pub fn quantity(&self) -> i64 {
        self.items.len() as i64
    }

    /// Per-ingredient consumption across every item code, in `StockItem::ALL` order.
    /// Letters that are not tracked ingredients are ignored here; the parser
    /// refuses them before a record is built.
    pub fn ingredient_counts(&self) -> [i64; 5] {
        let mut counts = [0i64; 5];
        for letter in self.items.iter().flat_map(|code| code.chars()) {
            if let Some(item) = StockItem::from_ingredient(letter) {
                counts[item.index()] += 1;
            }
        }
        counts[StockItem::Bun.index()] = 2 * self.quantity();
        counts
    }
}

/// A decision as recorded in the audit database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRow {
    pub run_id: i64,
    pub seq: i64,
    pub site_id: String,
    pub order_id: String,
    pub arrival: String,
    pub verdict: String,
    pub duration: Option<i64>, // Blank on reject
    pub reason: Option<String>,
}

impl fmt::Display for DecisionRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[run {} #{}] {} {}, {}, {},",
            self.run_id, self.seq, self.arrival, self.site_id, self.order_id, self.verdict
        )?;
        if let Some(duration) = self.duration {
            write!(f, " {}", duration)?;
        }
        if let Some(reason) = &self.reason {
            write!(f, " ({})", reason)?;
        }
        Ok(())
    }
}

/// A recorded run over one site's input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRow {
    pub id: i64,
    pub source: String,
    pub site_id: String,
    pub recorded_at: String,
    pub total_seconds: Option<i64>, // None until the run finishes
    pub accepted: i64,
    pub rejected: i64,
}
