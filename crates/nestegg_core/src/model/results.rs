//! Simulation results: the monthly time series and Monte Carlo aggregates

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::events::FiredEvent;
use super::expenses::MonthlyExpenses;
use super::ids::{AccountId, PersonId};
use super::income::MonthlyIncome;
use super::people::LifePhase;
use super::plan::PlanSummary;
use super::tax::TaxSummary;
use crate::date_math::YearMonth;

/// Why a run stopped
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TerminationReason {
    /// Reached the configured end month
    Completed,
    AllPersonsDeceased,
    PortfolioDepleted,
    /// Safety cap on simulated years was hit
    MaxYearsReached,
}

impl TerminationReason {
    /// Whether the run counts as a success for the success rate
    #[must_use]
    pub fn is_success(self) -> bool {
        !matches!(self, TerminationReason::PortfolioDepleted)
    }
}

/// Net monthly flow for one account.
/// `ending = starting + contributions - withdrawals + returns` holds exactly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AccountFlow {
    pub account_id: AccountId,
    pub owner: PersonId,
    pub starting: f64,
    pub contributions: f64,
    pub withdrawals: f64,
    pub returns: f64,
    pub ending: f64,
}

/// One month of the projection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlySnapshot {
    pub month: YearMonth,
    /// Months since the simulation start
    pub index: u32,
    pub phases: Vec<(PersonId, Option<LifePhase>)>,
    pub accounts: Vec<AccountFlow>,
    pub total_balance: f64,
    pub income: MonthlyIncome,
    pub expenses: MonthlyExpenses,
    pub contributions: f64,
    pub withdrawals: f64,
    pub returns: f64,
    /// Balance of all contingency reserves after this month
    pub reserve_balance: f64,
    /// Cash routed into reserves this month
    pub reserve_refill: f64,
    /// Present for months where the spending orchestrator ran
    pub plan: Option<PlanSummary>,
    /// Mandatory minimums that left the portfolio under `RmdExcessDisposition::Distribute`
    pub rmd_excess_distributed: f64,
    pub inflation_factor: f64,
    pub survivor_mode: bool,
    /// Set on the terminal snapshot only
    pub termination: Option<TerminationReason>,
}

/// A deceased pension rewritten for the survivor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PensionRewrite {
    pub name: String,
    pub monthly_before: f64,
    pub monthly_after: f64,
}

/// One-time record of a first death in a couple
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SurvivorTransition {
    pub month: YearMonth,
    pub deceased: PersonId,
    pub survivor: PersonId,
    pub transferred_accounts: Vec<AccountId>,
    pub balance_before: f64,
    pub balance_after: f64,
    pub survivor_social_security_before: f64,
    pub survivor_social_security_after: f64,
    pub pensions: Vec<PensionRewrite>,
}

/// Complete results from a single run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSeries {
    pub seed: u64,
    pub snapshots: Vec<MonthlySnapshot>,
    pub termination: TerminationReason,
    pub yearly_taxes: Vec<TaxSummary>,
    pub fired_events: Vec<FiredEvent>,
    pub survivor_transitions: Vec<SurvivorTransition>,
}

impl TimeSeries {
    #[must_use]
    pub fn final_balance(&self) -> f64 {
        self.snapshots.last().map_or(0.0, |s| s.total_balance)
    }

    #[must_use]
    pub fn last_month(&self) -> Option<YearMonth> {
        self.snapshots.last().map(|s| s.month)
    }

    /// First month whose ending balance was exhausted
    #[must_use]
    pub fn depletion_month(&self) -> Option<YearMonth> {
        (self.termination == TerminationReason::PortfolioDepleted)
            .then(|| self.last_month())
            .flatten()
    }

    #[must_use]
    pub fn total_withdrawals(&self) -> f64 {
        self.snapshots.iter().map(|s| s.withdrawals).sum()
    }

    #[must_use]
    pub fn total_contributions(&self) -> f64 {
        self.snapshots.iter().map(|s| s.contributions).sum()
    }

    #[must_use]
    pub fn total_returns(&self) -> f64 {
        self.snapshots.iter().map(|s| s.returns).sum()
    }

    /// Months whose plan could not be fully funded. Counts deficits while
    /// someone still works, which never end the run as depleted.
    #[must_use]
    pub fn shortfall_months(&self) -> usize {
        self.snapshots
            .iter()
            .filter(|s| s.plan.is_some_and(|p| !p.meets_target))
            .count()
    }

    #[must_use]
    pub fn total_shortfall(&self) -> f64 {
        self.snapshots
            .iter()
            .filter_map(|s| s.plan)
            .map(|p| p.shortfall)
            .sum()
    }

    /// Check if an event fired at any point
    #[must_use]
    pub fn event_fired(&self, name: &str) -> bool {
        self.fired_events.iter().any(|e| e.name == name)
    }

    /// Ending balance of every month, in order
    #[must_use]
    pub fn balances(&self) -> Vec<f64> {
        self.snapshots.iter().map(|s| s.total_balance).collect()
    }
}

/// How per-run seeds are chosen
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SeedPolicy {
    /// Reproducible: run seeds derived from this base seed
    Fixed(u64),
    /// Fresh entropy for every batch
    Entropy,
}

impl Default for SeedPolicy {
    fn default() -> Self {
        SeedPolicy::Fixed(42)
    }
}

/// What a failing run does to the rest of its batch
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record the failure, keep running
    Continue,
    /// Record the failure, skip runs not yet started and stop runs in flight
    #[default]
    CancelBatch,
}

/// Configuration for a Monte Carlo batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonteCarloConfig {
    pub num_runs: usize,
    #[serde(default)]
    pub seed_policy: SeedPolicy,
    /// Percentiles to report (0.0 - 1.0)
    pub percentiles: Vec<f64>,
    /// Number of full time series to keep (the first N run indices)
    #[serde(default)]
    pub sample_runs: usize,
    /// Re-simulate and keep the runs at each reported final-balance percentile
    #[serde(default)]
    pub keep_percentile_runs: bool,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Overall wall-clock budget for the batch, in milliseconds
    #[serde(default)]
    pub time_budget_ms: Option<u64>,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            num_runs: 1_000,
            seed_policy: SeedPolicy::default(),
            percentiles: vec![0.05, 0.25, 0.50, 0.75, 0.95],
            sample_runs: 0,
            keep_percentile_runs: false,
            failure_policy: FailurePolicy::default(),
            time_budget_ms: None,
        }
    }
}

/// A run that stopped with an error
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunFailure {
    pub run_index: usize,
    pub seed: u64,
    pub message: String,
}

/// Percentile values of total balance at one month index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PercentileBand {
    pub index: u32,
    pub month: YearMonth,
    /// (percentile, value)
    pub values: Vec<(f64, f64)>,
}

/// Aggregated statistics over all completed runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonteCarloStats {
    pub requested_runs: usize,
    pub completed_runs: usize,
    pub failed_runs: usize,
    /// Runs skipped by cancellation or the time budget
    pub skipped_runs: usize,
    pub termination_counts: BTreeMap<TerminationReason, usize>,
    /// Fraction of completed runs that did not deplete the portfolio
    pub success_rate: f64,
    pub mean_final_balance: f64,
    pub std_dev_final_balance: f64,
    pub min_final_balance: f64,
    pub max_final_balance: f64,
    /// (percentile, final balance)
    pub final_balance_percentiles: Vec<(f64, f64)>,
    /// (percentile, months until depletion) over depleted runs
    pub depletion_month_percentiles: Vec<(f64, f64)>,
    pub balance_bands: Vec<PercentileBand>,
}

/// Everything a Monte Carlo batch returns
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonteCarloSummary {
    pub stats: MonteCarloStats,
    pub failures: Vec<RunFailure>,
    /// Full time series for the first `sample_runs` completed run indices
    pub sampled_runs: Vec<TimeSeries>,
    /// (percentile, run) re-simulated from the seed nearest each final-balance percentile
    pub percentile_runs: Vec<(f64, TimeSeries)>,
    /// Seeds of completed runs in run-index order, for reproducing any run
    pub seeds: Vec<u64>,
}
