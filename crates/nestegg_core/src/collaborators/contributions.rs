use serde::{Deserialize, Serialize};

use crate::error::{CalcResult, CalculationError};
use crate::model::{AccountKind, AccountSnapshot, PersonId, PersonStatus, TaxStatus};

use super::{ContributionAllocation, ContributionRequest, ContributionRouter};

/// IRS annual contribution limits (2025 figures)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AnnualLimits {
    pub employer_plan: f64,
    pub employer_plan_catch_up: f64,
    pub ira: f64,
    pub ira_catch_up: f64,
    pub hsa: f64,
    pub hsa_catch_up: f64,
    /// Roth IRA eligibility phases out linearly across this prior-year income range
    pub roth_phase_out: (f64, f64),
}

impl Default for AnnualLimits {
    fn default() -> Self {
        Self {
            employer_plan: 23_500.0,
            employer_plan_catch_up: 7_500.0,
            ira: 7_000.0,
            ira_catch_up: 1_000.0,
            hsa: 4_300.0,
            hsa_catch_up: 1_000.0,
            roth_phase_out: (150_000.0, 165_000.0),
        }
    }
}

impl AnnualLimits {
    /// Annual limit for `kind`, or `None` when contributions are unlimited
    #[must_use]
    pub fn limit_for(&self, kind: AccountKind, age: u8, prior_income: f64) -> Option<f64> {
        match kind {
            AccountKind::Brokerage | AccountKind::Savings => None,
            AccountKind::Traditional401k | AccountKind::Roth401k => Some(
                self.employer_plan + if age >= 50 { self.employer_plan_catch_up } else { 0.0 },
            ),
            AccountKind::TraditionalIra => {
                Some(self.ira + if age >= 50 { self.ira_catch_up } else { 0.0 })
            }
            AccountKind::RothIra => {
                let base = self.ira + if age >= 50 { self.ira_catch_up } else { 0.0 };
                let (lo, hi) = self.roth_phase_out;
                let eligible = if prior_income <= lo {
                    1.0
                } else if prior_income >= hi || hi <= lo {
                    0.0
                } else {
                    (hi - prior_income) / (hi - lo)
                };
                Some(base * eligible)
            }
            AccountKind::Hsa => Some(self.hsa + if age >= 55 { self.hsa_catch_up } else { 0.0 }),
        }
    }
}

/// Fills the plan's targets in order, capping each at its remaining annual
/// room, and routes everything else to the overflow account.
#[derive(Debug, Clone, Default)]
pub struct LimitAwareRouter {
    pub limits: AnnualLimits,
}

fn owner_age(statuses: &[PersonStatus], owner: PersonId) -> u8 {
    statuses
        .iter()
        .find(|s| s.person_id == owner)
        .map_or(0, |s| s.age)
}

impl LimitAwareRouter {
    fn overflow_account<'a>(
        request: &'a ContributionRequest<'_>,
    ) -> Option<&'a AccountSnapshot> {
        let accounts = &request.view.accounts;
        match request.plan.overflow {
            Some(id) => accounts.iter().find(|a| a.account_id == id),
            None => accounts
                .iter()
                .filter(|a| a.tax_status == TaxStatus::Taxable)
                .min_by_key(|a| a.account_id),
        }
    }
}

impl ContributionRouter for LimitAwareRouter {
    fn route(&self, request: &ContributionRequest<'_>) -> CalcResult<Vec<ContributionAllocation>> {
        if !request.amount.is_finite() {
            return Err(CalculationError::NonFinite {
                what: "contribution",
            });
        }
        if request.amount <= 0.0 {
            return Ok(Vec::new());
        }

        let mut allocations: Vec<ContributionAllocation> = Vec::new();
        let mut remaining = request.amount;

        for target in &request.plan.targets {
            let Some(account) = request.view.account(target.account_id) else {
                return Err(CalculationError::Other(format!(
                    "contribution target {:?} is not in the portfolio",
                    target.account_id
                )));
            };
            let desired = (request.amount * target.share.clamp(0.0, 1.0)).min(remaining);
            let room = match self.limits.limit_for(
                account.kind,
                owner_age(request.statuses, account.owner),
                request.prior_income,
            ) {
                Some(limit) => (limit - request.view.contributed_ytd(account.account_id)).max(0.0),
                None => f64::INFINITY,
            };
            let amount = desired.min(room);
            if amount > 0.0 {
                allocations.push(ContributionAllocation {
                    account_id: account.account_id,
                    amount,
                });
                remaining -= amount;
            }
        }

        let overflow = Self::overflow_account(request).filter(|_| remaining > 0.0);
        if let Some(overflow) = overflow {
            match allocations
                .iter_mut()
                .find(|a| a.account_id == overflow.account_id)
            {
                Some(existing) => existing.amount += remaining,
                None => allocations.push(ContributionAllocation {
                    account_id: overflow.account_id,
                    amount: remaining,
                }),
            }
        }

        Ok(allocations)
    }
}
