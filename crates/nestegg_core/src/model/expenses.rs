//! Expense budget, category modifiers and contingency reserves

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::ids::CategoryId;
use crate::date_math::YearMonth;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExpenseKind {
    Essential,
    /// Scaled by the spending curve
    Discretionary,
    /// Grows faster than inflation with age
    Healthcare,
    /// Ends when a mortgage payoff event fires for the category
    Housing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpenseCategory {
    pub category_id: CategoryId,
    pub name: String,
    pub kind: ExpenseKind,
    /// Monthly amount in start-of-simulation dollars
    pub monthly_amount: f64,
    #[serde(default)]
    pub start: Option<YearMonth>,
    #[serde(default)]
    pub end: Option<YearMonth>,
    /// Fixed nominal payments (e.g. a mortgage) are not inflated
    #[serde(default = "default_true")]
    pub inflation_adjusted: bool,
}

fn default_true() -> bool {
    true
}

impl ExpenseCategory {
    #[must_use]
    pub fn is_active(&self, month: YearMonth) -> bool {
        self.start.is_none_or(|s| month >= s) && self.end.is_none_or(|e| month <= e)
    }
}

/// Retirement spending phases ("go-go", "slow-go", "no-go")
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SpendingPhase {
    #[default]
    GoGo,
    SlowGo,
    NoGo,
}

/// Discretionary multipliers per spending phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SpendingCurve {
    pub slow_go: f64,
    pub no_go: f64,
}

impl SpendingCurve {
    #[must_use]
    pub fn multiplier(&self, phase: SpendingPhase) -> f64 {
        match phase {
            SpendingPhase::GoGo => 1.0,
            SpendingPhase::SlowGo => self.slow_go,
            SpendingPhase::NoGo => self.no_go,
        }
    }
}

impl Default for SpendingCurve {
    fn default() -> Self {
        Self {
            slow_go: 0.85,
            no_go: 0.70,
        }
    }
}

/// The household budget handed to the expense calculator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpenseBudget {
    pub categories: Vec<ExpenseCategory>,
    #[serde(default)]
    pub spending_curve: SpendingCurve,
    /// Extra annual healthcare growth above inflation, per year past `healthcare_start_age`
    #[serde(default = "default_healthcare_growth")]
    pub healthcare_growth: f64,
    #[serde(default = "default_healthcare_start_age")]
    pub healthcare_start_age: u8,
    /// Multiplier on non-housing spending once one spouse has died
    #[serde(default = "default_survivor_factor")]
    pub survivor_factor: f64,
}

fn default_healthcare_growth() -> f64 {
    0.02
}

fn default_healthcare_start_age() -> u8 {
    65
}

fn default_survivor_factor() -> f64 {
    0.75
}

impl Default for ExpenseBudget {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            spending_curve: SpendingCurve::default(),
            healthcare_growth: default_healthcare_growth(),
            healthcare_start_age: default_healthcare_start_age(),
            survivor_factor: default_survivor_factor(),
        }
    }
}

/// State-dependent switches read by the expense calculator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpenseFlags {
    pub spending_phase: SpendingPhase,
    pub survivor_mode: bool,
    /// Age of the oldest living household member
    pub oldest_age: u8,
    /// Monthly long-term-care cost currently incurred (before inflation)
    pub long_term_care: f64,
    /// Categories ended by a payoff event
    pub paid_off: BTreeSet<CategoryId>,
    /// Cumulative inflation since the simulation start
    pub inflation_factor: f64,
}

/// One month of household expenses, split by kind
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct MonthlyExpenses {
    pub essential: f64,
    pub discretionary: f64,
    pub healthcare: f64,
    pub housing: f64,
    pub long_term_care: f64,
}

impl MonthlyExpenses {
    #[must_use]
    pub fn total(&self) -> f64 {
        self.essential + self.discretionary + self.healthcare + self.housing + self.long_term_care
    }
}

/// A cash reserve earmarked for one category's contingency spending.
/// Reserves sit outside the invested portfolio.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContingencyReserve {
    pub category_id: CategoryId,
    pub name: String,
    pub target: f64,
    pub initial_balance: f64,
}
