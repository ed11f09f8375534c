//! Account definitions and the per-step account snapshot
//!
//! `Account` is the mutable record owned by the engine. `AccountSnapshot` is
//! the immutable copy handed to strategies; a fresh one is produced for every
//! step and never observes later mutation.

use serde::{Deserialize, Serialize};

use super::ids::{AccountId, PersonId};

/// Tax treatment for an account
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaxStatus {
    /// Regular brokerage - capital gains taxed
    Taxable,
    /// 401k, Traditional IRA - contributions tax-deferred, withdrawals taxed as income
    TaxDeferred,
    /// Roth IRA, Roth 401k - contributions post-tax, withdrawals tax-free
    TaxFree,
}

impl TaxStatus {
    /// Rank used by the tax-efficient withdrawal order (lower drawn first)
    #[must_use]
    pub fn tax_efficient_rank(self) -> u8 {
        match self {
            TaxStatus::Taxable => 0,
            TaxStatus::TaxDeferred => 1,
            TaxStatus::TaxFree => 2,
        }
    }
}

/// Concrete account type. Determines tax treatment, contribution limits and
/// whether minimum distributions apply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AccountKind {
    Brokerage,
    Savings,
    Traditional401k,
    TraditionalIra,
    Roth401k,
    RothIra,
    Hsa,
}

impl AccountKind {
    #[must_use]
    pub fn tax_status(self) -> TaxStatus {
        match self {
            AccountKind::Brokerage | AccountKind::Savings => TaxStatus::Taxable,
            AccountKind::Traditional401k | AccountKind::TraditionalIra => TaxStatus::TaxDeferred,
            AccountKind::Roth401k | AccountKind::RothIra | AccountKind::Hsa => TaxStatus::TaxFree,
        }
    }

    /// Whether the owner must take minimum distributions once RMDs start.
    /// Roth 401(k)s are exempt since 2024.
    #[must_use]
    pub fn rmd_eligible(self) -> bool {
        matches!(
            self,
            AccountKind::Traditional401k | AccountKind::TraditionalIra
        )
    }
}

/// Fractions of the balance held in each asset class. Sums to 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Allocation {
    pub stocks: f64,
    pub bonds: f64,
    pub cash: f64,
}

impl Allocation {
    #[must_use]
    pub fn new(stocks: f64, bonds: f64, cash: f64) -> Self {
        Self {
            stocks,
            bonds,
            cash,
        }
    }

    #[must_use]
    pub fn all_stocks() -> Self {
        Self::new(1.0, 0.0, 0.0)
    }

    #[must_use]
    pub fn all_cash() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }

    #[must_use]
    pub fn sum(&self) -> f64 {
        self.stocks + self.bonds + self.cash
    }

    /// Allocation-weighted annual return for one market year
    #[must_use]
    pub fn blended_rate(&self, stocks: f64, bonds: f64, cash: f64) -> f64 {
        self.stocks * stocks + self.bonds * bonds + self.cash * cash
    }
}

impl Default for Allocation {
    /// Classic 60/40
    fn default() -> Self {
        Self::new(0.6, 0.4, 0.0)
    }
}

/// A portfolio account as configured and as mutated by the engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub account_id: AccountId,
    pub name: String,
    pub kind: AccountKind,
    pub owner: PersonId,
    pub balance: f64,
    #[serde(default)]
    pub allocation: Allocation,
}

impl Account {
    #[must_use]
    pub fn tax_status(&self) -> TaxStatus {
        self.kind.tax_status()
    }

    /// Produce the immutable per-step view of this account.
    ///
    /// `rmd_active` is whether the owner has reached the minimum-distribution
    /// start, which the engine tracks as a per-person flag.
    #[must_use]
    pub fn snapshot(&self, rmd_active: bool) -> AccountSnapshot {
        AccountSnapshot {
            account_id: self.account_id,
            name: self.name.clone(),
            kind: self.kind,
            owner: self.owner,
            balance: self.balance,
            tax_status: self.kind.tax_status(),
            subject_to_rmd: rmd_active && self.kind.rmd_eligible(),
            allocation: self.allocation,
        }
    }
}

/// Point-in-time, read-only copy of an account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountSnapshot {
    pub account_id: AccountId,
    pub name: String,
    pub kind: AccountKind,
    pub owner: PersonId,
    pub balance: f64,
    pub tax_status: TaxStatus,
    pub subject_to_rmd: bool,
    pub allocation: Allocation,
}

/// Share of monthly surplus directed to one account while accumulating
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ContributionTarget {
    pub account_id: AccountId,
    /// Fraction of the surplus (0.0 - 1.0)
    pub share: f64,
}

/// Where surplus cash goes during accumulation.
///
/// Targets are filled in order up to their annual limits. Whatever is left
/// (unassigned shares or amounts over a limit) lands in `overflow`, or in the
/// first taxable account when no overflow account is named.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContributionPlan {
    pub targets: Vec<ContributionTarget>,
    #[serde(default)]
    pub overflow: Option<AccountId>,
}
