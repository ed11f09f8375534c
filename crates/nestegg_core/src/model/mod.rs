mod accounts;
mod events;
mod expenses;
mod ids;
mod income;
mod market;
mod people;
mod plan;
mod results;
mod rmd;
mod tax;

pub use accounts::{
    Account, AccountKind, AccountSnapshot, Allocation, ContributionPlan, ContributionTarget,
    TaxStatus,
};
pub use events::{EventKind, EventTrigger, FiredEvent, LifeEvent, ProbabilityModel};
pub use expenses::{
    ContingencyReserve, ExpenseBudget, ExpenseCategory, ExpenseFlags, ExpenseKind,
    MonthlyExpenses, SpendingCurve, SpendingPhase,
};
pub use ids::{AccountId, CategoryId, EventId, PersonId};
pub use income::{IncomeKind, IncomeSource, MonthlyIncome, PensionForm};
pub use market::{InflationProfile, MarketAssumptions, MarketPath, MarketYear, ReturnProfile};
pub use people::{FilingStatus, Household, LifePhase, Person, PersonStatus};
pub use plan::{
    AccountWithdrawal, GuardrailAction, PlanMetadata, PlanSummary, RmdExcessDisposition,
    SpendingDecision, WithdrawalPlan,
};
pub use results::{
    AccountFlow, FailurePolicy, MonteCarloConfig, MonteCarloStats, MonteCarloSummary,
    MonthlySnapshot, PensionRewrite, PercentileBand, RunFailure, SeedPolicy, SurvivorTransition,
    TerminationReason, TimeSeries,
};
pub use rmd::{RmdTable, RmdTableEntry, rmd_start_age};
pub use tax::{TaxBracket, TaxSummary, TaxableIncome};
