//! Per-asset budget classification and scoring.

use serde::{Deserialize, Serialize};

use crate::manifest::CatalogEntry;

/// Penalty for each red classification.
pub const RED_PENALTY: u32 = 30;
/// Penalty for each yellow classification.
pub const YELLOW_PENALTY: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetLevel {
    Green,
    Yellow,
    Red,
}

/// Two-step threshold: green up to `green_max`, yellow up to `yellow_max`, red above.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub green_max: f64,
    pub yellow_max: f64,
}

impl Threshold {
    pub const fn new(green_max: f64, yellow_max: f64) -> Self {
        Self {
            green_max,
            yellow_max,
        }
    }

    pub fn classify(&self, value: f64) -> BudgetLevel {
        if value <= self.green_max {
            BudgetLevel::Green
        } else if value <= self.yellow_max {
            BudgetLevel::Yellow
        } else {
            BudgetLevel::Red
        }
    }
}

/// Fixed budgets for real-time avatar assets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Budgets {
    pub triangles: Threshold,
    pub vertices: Threshold,
    pub joints: Threshold,
    pub gpu_memory_kb: Threshold,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            triangles: Threshold::new(15_000.0, 30_000.0),
            vertices: Threshold::new(20_000.0, 40_000.0),
            joints: Threshold::new(75.0, 150.0),
            gpu_memory_kb: Threshold::new(2_048.0, 4_096.0),
        }
    }
}

/// The four independent classifications of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetChecks {
    pub triangles: BudgetLevel,
    pub vertices: BudgetLevel,
    pub joints: BudgetLevel,
    pub gpu_memory: BudgetLevel,
}

impl BudgetChecks {
    fn levels(&self) -> [BudgetLevel; 4] {
        [self.triangles, self.vertices, self.joints, self.gpu_memory]
    }

    pub fn red_count(&self) -> u32 {
        self.levels().iter().filter(|l| **l == BudgetLevel::Red).count() as u32
    }

    pub fn yellow_count(&self) -> u32 {
        self.levels().iter().filter(|l| **l == BudgetLevel::Yellow).count() as u32
    }

    pub fn status(&self) -> EntryStatus {
        if self.red_count() > 0 {
            EntryStatus::Fail
        } else if self.yellow_count() > 0 {
            EntryStatus::Warn
        } else {
            EntryStatus::Pass
        }
    }

    pub fn score(&self) -> u32 {
        budget_score(self.red_count(), self.yellow_count())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pass,
    Warn,
    Fail,
}

/// `max(0, 100 - 30*red - 10*yellow)`.
pub fn budget_score(red: u32, yellow: u32) -> u32 {
    100u32
        .saturating_sub(red.saturating_mul(RED_PENALTY))
        .saturating_sub(yellow.saturating_mul(YELLOW_PENALTY))
}

impl Budgets {
    pub fn classify(&self, entry: &CatalogEntry) -> BudgetChecks {
        BudgetChecks {
            triangles: self.triangles.classify(entry.triangles() as f64),
            vertices: self.vertices.classify(entry.total_vertices as f64),
            joints: self.joints.classify(entry.joints() as f64),
            gpu_memory: self.gpu_memory_kb.classify(entry.total_gpu_memory_kb),
        }
    }
}
