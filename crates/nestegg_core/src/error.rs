use thiserror::Error;

use crate::date_math::YearMonth;
use crate::model::{AccountId, PersonId};

/// Problems found while validating a [`crate::config::SimulationConfig`].
///
/// These are raised at engine construction, before any month is simulated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("household must contain one or two persons, found {0}")]
    HouseholdSize(usize),
    #[error("simulation must end after it starts ({start} >= {end})")]
    InvalidDateRange { start: YearMonth, end: YearMonth },
    #[error("max_years must be positive")]
    InvalidMaxYears,
    #[error("duplicate account id {0:?}")]
    DuplicateAccount(AccountId),
    #[error("duplicate person id {0:?}")]
    DuplicatePerson(PersonId),
    #[error("unknown account {0:?}")]
    UnknownAccount(AccountId),
    #[error("unknown person {0:?}")]
    UnknownPerson(PersonId),
    #[error("account {account:?} has negative balance {balance}")]
    NegativeBalance { account: AccountId, balance: f64 },
    #[error("allocation for account {account:?} sums to {sum}, expected 1.0")]
    InvalidAllocation { account: AccountId, sum: f64 },
    #[error("withdrawal start for {person:?} precedes retirement")]
    WithdrawalBeforeRetirement { person: PersonId },
    #[error("invalid {profile_type} parameters (mean={mean}, std_dev={std_dev}): {reason}")]
    InvalidDistributionParameters {
        profile_type: &'static str,
        mean: f64,
        std_dev: f64,
        reason: &'static str,
    },
    #[error("invalid spending strategy: {0}")]
    InvalidStrategy(String),
    #[error("invalid probability model: {0}")]
    InvalidProbability(String),
    #[error("monte carlo batch needs at least one run")]
    NoRuns,
    #[error("nothing named {0:?} was defined")]
    UnknownName(String),
    #[error("a minimum-distribution excess disposition must be chosen")]
    MissingRmdExcessDisposition,
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// A collaborator (income, expense, tax, RMD, contribution, return) could not
/// produce a result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalculationError {
    #[error("no {table} entry for age {age}")]
    MissingTableEntry { table: &'static str, age: u8 },
    #[error("{what} produced a non-finite amount")]
    NonFinite { what: &'static str },
    #[error("market data has no rates for year index {0}")]
    InsufficientRateData(usize),
    #[error("{0}")]
    Other(String),
}

/// A mutation that would break a state invariant.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("account {0:?} not found")]
    AccountNotFound(AccountId),
    #[error("negative amount {amount} for account {account:?}")]
    NegativeAmount { account: AccountId, amount: f64 },
    #[error("plan requested {requested} from account {account:?} holding only {available}")]
    Overdraw {
        account: AccountId,
        requested: f64,
        available: f64,
    },
}

/// Why a single run stopped with an error. Other Monte Carlo runs are unaffected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("calculation failed in {month}: {source}")]
    Calculation {
        month: YearMonth,
        #[source]
        source: CalculationError,
    },
    #[error("state update failed in {month}: {source}")]
    State {
        month: YearMonth,
        #[source]
        source: StateError,
    },
    /// The caller asked the run to stop
    #[error("run interrupted in {month}")]
    Interrupted { month: YearMonth },
}

impl SimulationError {
    pub(crate) fn calculation(month: YearMonth) -> impl FnOnce(CalculationError) -> Self {
        move |source| SimulationError::Calculation { month, source }
    }

    pub(crate) fn state(month: YearMonth) -> impl FnOnce(StateError) -> Self {
        move |source| SimulationError::State { month, source }
    }
}

/// Batch-level Monte Carlo failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MonteCarloError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The batch was cancelled before any run completed
    #[error("monte carlo batch cancelled")]
    Cancelled,
    #[error("all {0} runs failed")]
    AllRunsFailed(usize),
}

pub type CalcResult<T> = std::result::Result<T, CalculationError>;
