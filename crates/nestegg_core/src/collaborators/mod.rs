//! Narrow interfaces to the rules the engine does not own
//!
//! Income formulas, expense rules, contribution limits, minimum-distribution
//! tables, tax brackets and return compounding are all consumed through the
//! traits below. Each has a stateless default so an engine can be built with
//! `Collaborators::default()`; callers swap in their own by replacing a field.

mod contributions;
mod distributions;
mod expenses;
mod income;
mod returns;
mod taxes;

use std::fmt::Debug;
use std::sync::Arc;

use crate::date_math::YearMonth;
use crate::error::CalcResult;
use crate::model::{
    AccountId, ContributionPlan, ExpenseBudget, ExpenseFlags, FilingStatus, Household,
    IncomeSource, MonthlyExpenses, MonthlyIncome, PersonStatus, TaxSummary, TaxableIncome,
};
use crate::simulation_state::SimulationView;

pub use contributions::{AnnualLimits, LimitAwareRouter};
pub use distributions::UniformLifetimeRmd;
pub use expenses::BudgetExpenses;
pub use income::StandardIncome;
pub use returns::CompoundReturns;
pub use taxes::{ProgressiveTax, calculate_federal_tax};

/// Produces the household's income for one month
pub trait IncomeProcessor: Debug + Send + Sync {
    /// `elapsed_months` counts from the simulation start and drives COLA growth.
    fn monthly_income(
        &self,
        household: &Household,
        sources: &[IncomeSource],
        month: YearMonth,
        statuses: &[PersonStatus],
        elapsed_months: u32,
    ) -> CalcResult<MonthlyIncome>;
}

/// Turns the budget into one month of spending
pub trait ExpenseCalculator: Debug + Send + Sync {
    fn monthly_expenses(
        &self,
        budget: &ExpenseBudget,
        month: YearMonth,
        flags: &ExpenseFlags,
    ) -> CalcResult<MonthlyExpenses>;
}

/// Surplus cash to be placed into accounts
#[derive(Debug, Clone, Copy)]
pub struct ContributionRequest<'a> {
    pub amount: f64,
    pub view: &'a SimulationView,
    pub plan: &'a ContributionPlan,
    pub year: i16,
    /// Living household members; account owners' ages decide catch-up eligibility
    pub statuses: &'a [PersonStatus],
    /// Household ordinary income for the previous calendar year
    pub prior_income: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContributionAllocation {
    pub account_id: AccountId,
    pub amount: f64,
}

/// Splits surplus cash across accounts
pub trait ContributionRouter: Debug + Send + Sync {
    fn route(&self, request: &ContributionRequest<'_>) -> CalcResult<Vec<ContributionAllocation>>;
}

/// Mandatory minimum distribution for one account, per month
pub trait MinimumDistributionCalculator: Debug + Send + Sync {
    fn required_distribution(
        &self,
        balance: f64,
        age: u8,
        birth_year: i16,
        year: i16,
    ) -> CalcResult<f64>;
}

/// Computes the tax owed for a closed calendar year
pub trait TaxCalculator: Debug + Send + Sync {
    fn summarize(
        &self,
        year: i16,
        income: &TaxableIncome,
        filing_status: FilingStatus,
    ) -> CalcResult<TaxSummary>;
}

/// Converts annual rates into monthly growth
pub trait ReturnCalculator: Debug + Send + Sync {
    fn monthly_factor(&self, annual_rate: f64) -> f64;

    fn grow(&self, balance: f64, annual_rate: f64) -> CalcResult<f64>;
}

/// The collaborator set handed to an engine. Shared read-only by every run.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub income: Arc<dyn IncomeProcessor>,
    pub expenses: Arc<dyn ExpenseCalculator>,
    pub contributions: Arc<dyn ContributionRouter>,
    pub distributions: Arc<dyn MinimumDistributionCalculator>,
    pub taxes: Arc<dyn TaxCalculator>,
    pub returns: Arc<dyn ReturnCalculator>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            income: Arc::new(StandardIncome),
            expenses: Arc::new(BudgetExpenses),
            contributions: Arc::new(LimitAwareRouter::default()),
            distributions: Arc::new(UniformLifetimeRmd::default()),
            taxes: Arc::new(ProgressiveTax::default()),
            returns: Arc::new(CompoundReturns),
        }
    }
}
