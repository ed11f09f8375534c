//! Turns a strategy decision into an executable withdrawal plan
//!
//! The orchestrator combines three inputs: the strategy's target, the
//! mandatory minimum distributions owed this period and the sequencer's
//! account order. Minimums are always withdrawn, even beyond the target; the
//! plan records the excess and leaves its disposition to the caller.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::collaborators::MinimumDistributionCalculator;
use crate::error::CalcResult;
use crate::model::{
    AccountId, AccountWithdrawal, PersonId, PlanMetadata, SpendingDecision, WithdrawalPlan,
};
use crate::sequencer::{AccountSequencer, pro_rata_split};
use crate::simulation_state::SimulationView;
use crate::strategy::{SpendingContext, SpendingPolicy};

const SHORTFALL_TOLERANCE: f64 = 1e-6;

/// Age facts needed to look up an owner's minimum distribution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OwnerInfo {
    pub person_id: PersonId,
    pub age: u8,
    pub birth_year: i16,
}

#[derive(Debug, Clone, Copy)]
pub struct SpendingOrchestrator<'a> {
    pub sequencer: &'a AccountSequencer,
    pub distributions: &'a dyn MinimumDistributionCalculator,
}

fn add_withdrawal(
    list: &mut Vec<AccountWithdrawal>,
    account_id: AccountId,
    amount: f64,
    required: f64,
) {
    if amount <= 0.0 {
        return;
    }
    match list.iter_mut().find(|w| w.account_id == account_id) {
        Some(existing) => {
            existing.amount += amount;
            existing.required_minimum += required;
        }
        None => list.push(AccountWithdrawal {
            account_id,
            amount,
            required_minimum: required,
        }),
    }
}

impl<'a> SpendingOrchestrator<'a> {
    #[must_use]
    pub fn new(
        sequencer: &'a AccountSequencer,
        distributions: &'a dyn MinimumDistributionCalculator,
    ) -> Self {
        Self {
            sequencer,
            distributions,
        }
    }

    /// Required distribution per account this month, capped at its balance
    pub fn minimums(
        &self,
        view: &SimulationView,
        owners: &[OwnerInfo],
        year: i16,
    ) -> CalcResult<FxHashMap<AccountId, f64>> {
        let mut minimums = FxHashMap::default();
        for account in view.accounts.iter().filter(|a| a.subject_to_rmd) {
            let Some(owner) = owners.iter().find(|o| o.person_id == account.owner) else {
                continue;
            };
            let required = self.distributions.required_distribution(
                account.balance,
                owner.age,
                owner.birth_year,
                year,
            )?;
            let required = required.min(account.balance);
            if required > 0.0 {
                minimums.insert(account.account_id, required);
            }
        }
        Ok(minimums)
    }

    /// Query the strategy and build this month's plan
    pub fn plan(
        &self,
        ctx: &SpendingContext<'_>,
        policy: &dyn SpendingPolicy,
        owners: &[OwnerInfo],
    ) -> CalcResult<(WithdrawalPlan, SpendingDecision)> {
        let minimums = self.minimums(ctx.view, owners, ctx.date.year)?;
        let decision = if ctx.withdrawals_active {
            policy.decide(ctx)
        } else {
            SpendingDecision::new(0.0, "inactive")
        };

        let rmd_required: f64 = minimums.values().sum();
        let target = decision.target_withdrawal;
        let metadata = PlanMetadata {
            rmd_required,
            rmd_forced: rmd_required > target + SHORTFALL_TOLERANCE,
            rmd_excess: (rmd_required - target).max(0.0),
            guardrail: decision.guardrail,
            ratcheted: decision.is_ratchet(),
        };
        if metadata.rmd_forced {
            debug!(
                month = %ctx.date,
                rmd_required,
                target,
                "minimum distributions exceed spending target"
            );
        }

        let plan = self.build(
            ctx.view,
            &minimums,
            target,
            decision.strategy_used,
            metadata,
        );
        Ok((plan, decision))
    }

    /// Plan a one-off withdrawal of `amount` in sequencer order (no minimums)
    #[must_use]
    pub fn cover(&self, view: &SimulationView, amount: f64, label: &str) -> WithdrawalPlan {
        self.build(
            view,
            &FxHashMap::default(),
            amount.max(0.0),
            label,
            PlanMetadata::default(),
        )
    }

    /// Take every minimum owed this month, then cover `amount` from the rest.
    ///
    /// There is no strategy target here, so any minimum beyond `amount` is
    /// reported as excess for the caller to dispose of.
    pub fn cover_with_minimums(
        &self,
        view: &SimulationView,
        owners: &[OwnerInfo],
        year: i16,
        amount: f64,
        label: &str,
    ) -> CalcResult<WithdrawalPlan> {
        let amount = amount.max(0.0);
        let minimums = self.minimums(view, owners, year)?;
        let rmd_required: f64 = minimums.values().sum();
        let metadata = PlanMetadata {
            rmd_required,
            rmd_forced: rmd_required > amount + SHORTFALL_TOLERANCE,
            rmd_excess: (rmd_required - amount).max(0.0),
            ..PlanMetadata::default()
        };
        Ok(self.build(view, &minimums, amount, label, metadata))
    }

    /// Allocate `max(target, Σ minimums)` and record any shortfall
    fn build(
        &self,
        view: &SimulationView,
        minimums: &FxHashMap<AccountId, f64>,
        target: f64,
        label: &str,
        metadata: PlanMetadata,
    ) -> WithdrawalPlan {
        let effective = target.max(metadata.rmd_required);
        let account_withdrawals = self.allocate(view, minimums, effective);
        let planned: f64 = account_withdrawals.iter().map(|w| w.amount).sum();
        let shortfall = (effective - planned).max(0.0);
        WithdrawalPlan {
            target_withdrawal: target,
            adjusted_withdrawal: planned,
            account_withdrawals,
            meets_target: shortfall <= SHORTFALL_TOLERANCE,
            shortfall,
            strategy_used: label.to_string(),
            metadata,
        }
    }

    fn allocate(
        &self,
        view: &SimulationView,
        minimums: &FxHashMap<AccountId, f64>,
        effective: f64,
    ) -> Vec<AccountWithdrawal> {
        let mut out: Vec<AccountWithdrawal> = Vec::new();

        // Every minimum comes out of its own account first
        let mut required: Vec<(AccountId, f64)> = minimums.iter().map(|(k, v)| (*k, *v)).collect();
        required.sort_by_key(|(id, _)| *id);
        for (account_id, amount) in required {
            add_withdrawal(&mut out, account_id, amount, amount);
        }

        let mut remaining = effective - out.iter().map(|w| w.amount).sum::<f64>();
        if remaining <= 0.0 {
            return out;
        }

        let room = |out: &[AccountWithdrawal], account_id: AccountId| {
            let taken = out
                .iter()
                .find(|w| w.account_id == account_id)
                .map_or(0.0, |w| w.amount);
            (view.balance_of(account_id) - taken).max(0.0)
        };

        if self.sequencer.is_pro_rata() {
            let available: Vec<(AccountId, f64)> = view
                .accounts
                .iter()
                .map(|a| (a.account_id, room(&out, a.account_id)))
                .filter(|(_, r)| *r > 0.0)
                .collect();
            for (account_id, amount) in pro_rata_split(&available, remaining) {
                add_withdrawal(&mut out, account_id, amount, 0.0);
            }
            return out;
        }

        for account_id in self.sequencer.order(&view.accounts, minimums) {
            if remaining <= 0.0 {
                break;
            }
            let take = room(&out, account_id).min(remaining);
            add_withdrawal(&mut out, account_id, take, 0.0);
            remaining -= take;
        }
        out
    }
}
