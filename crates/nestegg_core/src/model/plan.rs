//! Withdrawal plans produced by the spending orchestrator

use serde::{Deserialize, Serialize};

use super::ids::AccountId;

/// What a guardrail strategy did at its review
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GuardrailAction {
    /// Baseline carried forward (plus inflation at a review)
    Hold,
    /// Inflation raise skipped after a losing year
    SkipInflation,
    /// Upper guardrail breached: spending cut
    Cut,
    /// Lower guardrail breached: spending raised (a ratchet)
    Raise,
    /// Clamped to the absolute floor
    Floor,
    /// Clamped to the absolute ceiling
    Ceiling,
}

/// Strategy output: how much to withdraw this month, not where from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpendingDecision {
    pub target_withdrawal: f64,
    pub strategy_used: &'static str,
    pub guardrail: Option<GuardrailAction>,
}

impl SpendingDecision {
    #[must_use]
    pub fn new(target_withdrawal: f64, strategy_used: &'static str) -> Self {
        Self {
            target_withdrawal: target_withdrawal.max(0.0),
            strategy_used,
            guardrail: None,
        }
    }

    #[must_use]
    pub fn with_guardrail(mut self, action: GuardrailAction) -> Self {
        self.guardrail = Some(action);
        self
    }

    #[must_use]
    pub fn is_ratchet(&self) -> bool {
        self.guardrail == Some(GuardrailAction::Raise)
    }
}

/// Amount taken from a single account
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AccountWithdrawal {
    pub account_id: AccountId,
    pub amount: f64,
    /// Portion of `amount` that was a mandatory minimum distribution
    pub required_minimum: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanMetadata {
    /// Sum of mandatory minimums this period
    pub rmd_required: f64,
    /// Minimums exceeded the strategy target
    pub rmd_forced: bool,
    /// `max(0, rmd_required - strategy target)`; disposition is the caller's
    pub rmd_excess: f64,
    pub guardrail: Option<GuardrailAction>,
    pub ratcheted: bool,
}

/// Executable withdrawal plan. Consumed exactly once by `SimulationState::apply`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WithdrawalPlan {
    /// What the strategy asked for
    pub target_withdrawal: f64,
    /// What will actually be withdrawn (minimum floor applied, capped by balances)
    pub adjusted_withdrawal: f64,
    pub account_withdrawals: Vec<AccountWithdrawal>,
    pub meets_target: bool,
    pub shortfall: f64,
    pub strategy_used: String,
    pub metadata: PlanMetadata,
}

impl WithdrawalPlan {
    /// Plan that withdraws nothing
    #[must_use]
    pub fn empty(strategy_used: &str) -> Self {
        Self {
            target_withdrawal: 0.0,
            adjusted_withdrawal: 0.0,
            account_withdrawals: Vec::new(),
            meets_target: true,
            shortfall: 0.0,
            strategy_used: strategy_used.to_string(),
            metadata: PlanMetadata::default(),
        }
    }

    #[must_use]
    pub fn withdrawn_from(&self, account_id: AccountId) -> f64 {
        self.account_withdrawals
            .iter()
            .filter(|w| w.account_id == account_id)
            .map(|w| w.amount)
            .sum()
    }

    #[must_use]
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            target_withdrawal: self.target_withdrawal,
            adjusted_withdrawal: self.adjusted_withdrawal,
            meets_target: self.meets_target,
            shortfall: self.shortfall,
            metadata: self.metadata,
        }
    }
}

/// What remains of a plan after it has been applied; stored in the time series
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanSummary {
    pub target_withdrawal: f64,
    pub adjusted_withdrawal: f64,
    pub meets_target: bool,
    pub shortfall: f64,
    pub metadata: PlanMetadata,
}

/// What to do with mandatory minimums withdrawn beyond the spending need.
///
/// There is deliberately no default: every configuration must choose.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RmdExcessDisposition {
    /// Deposit the excess into this (taxable) account
    Reinvest { account: AccountId },
    /// The excess leaves the portfolio; it is reported per month
    Distribute,
}
