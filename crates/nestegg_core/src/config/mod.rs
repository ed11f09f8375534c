//! Simulation configuration
//!
//! `SimulationConfig` holds everything one projection needs: the household,
//! its accounts and income, the expense budget, life events, market
//! assumptions and the spending rules. It is validated once when an engine is
//! built and then shared read-only by every run.
//!
//! # Builder DSL
//!
//! ```ignore
//! use nestegg_core::config::{AccountBuilder, SimulationBuilder};
//! use nestegg_core::model::RmdExcessDisposition;
//! use nestegg_core::strategy::SpendingStrategy;
//!
//! let config = SimulationBuilder::new()
//!     .start(2025, 1)
//!     .years(30)
//!     .person("Alex", 1962, 4, 10)
//!     .retire_at(2027, 1)
//!     .account(AccountBuilder::traditional_401k("Work 401k").balance(600_000.0))
//!     .account(AccountBuilder::taxable_brokerage("Brokerage").balance(150_000.0))
//!     .strategy(SpendingStrategy::Static { rate: 0.04 })
//!     .rmd_excess(RmdExcessDisposition::Distribute)
//!     .build()?;
//! ```

mod builder;

use jiff::civil::date;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::date_math::YearMonth;
use crate::error::ConfigError;
use crate::model::{
    Account, ContingencyReserve, ContributionPlan, EventTrigger, ExpenseBudget, Household,
    IncomeSource, LifeEvent, MarketAssumptions, Person, PersonId, RmdExcessDisposition,
};
use crate::sequencer::AccountSequencer;
use crate::strategy::{SpendingStrategy, StrategyParams};

pub use builder::{AccountBuilder, SimulationBuilder};

const ALLOCATION_TOLERANCE: f64 = 1e-6;

fn default_duration_years() -> u16 {
    30
}

fn default_max_years() -> u16 {
    100
}

/// Complete simulation configuration
///
/// **Your situation**: `household`, `accounts`, `income`, `reserves`.
///
/// **Your plan**: `budget`, `events`, `strategy`, `sequencer`,
/// `contributions`, `rmd_excess`.
///
/// **World assumptions**: `market`, `strategy_params`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationConfig {
    /// First simulated month
    pub start: YearMonth,
    /// First month *not* simulated. Defaults to `start + duration_years`.
    #[serde(default)]
    pub end: Option<YearMonth>,
    #[serde(default = "default_duration_years")]
    pub duration_years: u16,
    /// Safety cap on simulated years, whatever the end month
    #[serde(default = "default_max_years")]
    pub max_years: u16,

    pub household: Household,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub income: Vec<IncomeSource>,
    #[serde(default)]
    pub budget: ExpenseBudget,
    #[serde(default)]
    pub reserves: Vec<ContingencyReserve>,
    /// Configured life events; milestones implied by the household are added automatically
    #[serde(default)]
    pub events: Vec<LifeEvent>,

    #[serde(default)]
    pub market: MarketAssumptions,
    #[serde(default)]
    pub strategy: SpendingStrategy,
    #[serde(default)]
    pub strategy_params: StrategyParams,
    #[serde(default)]
    pub sequencer: AccountSequencer,
    #[serde(default)]
    pub contributions: ContributionPlan,
    /// Required: what happens to minimum distributions beyond the spending need
    pub rmd_excess: RmdExcessDisposition,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let start = YearMonth::new(2025, 1);
        Self {
            start,
            end: None,
            duration_years: default_duration_years(),
            max_years: default_max_years(),
            household: Household::single(Person {
                person_id: PersonId(0),
                name: "Primary".into(),
                birth_date: date(1960, 1, 1),
                retirement: start,
                withdrawal_start: None,
                mortality: None,
            }),
            accounts: Vec::new(),
            income: Vec::new(),
            budget: ExpenseBudget::default(),
            reserves: Vec::new(),
            events: Vec::new(),
            market: MarketAssumptions::default(),
            strategy: SpendingStrategy::default(),
            strategy_params: StrategyParams::default(),
            sequencer: AccountSequencer::default(),
            contributions: ContributionPlan::default(),
            rmd_excess: RmdExcessDisposition::Distribute,
        }
    }
}

impl SimulationConfig {
    /// Parse a JSON configuration and validate it
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// First month not simulated
    #[must_use]
    pub fn end_month(&self) -> YearMonth {
        self.end
            .unwrap_or_else(|| self.start.add_months(i32::from(self.duration_years) * 12))
    }

    /// Number of months between start and end
    #[must_use]
    pub fn total_months(&self) -> u32 {
        u32::try_from(self.start.months_until(self.end_month())).unwrap_or(0)
    }

    /// Market years a run may touch
    #[must_use]
    pub fn market_years(&self) -> usize {
        let months = self.total_months().min(u32::from(self.max_years) * 12);
        months.div_ceil(12) as usize + 1
    }

    /// Create a variant with a different duration
    #[must_use]
    pub fn with_duration_years(&self, years: u16) -> Self {
        let mut config = self.clone();
        config.duration_years = years;
        config.end = None;
        config
    }

    /// Create a variant with a different spending strategy
    #[must_use]
    pub fn with_strategy(&self, strategy: SpendingStrategy) -> Self {
        let mut config = self.clone();
        config.strategy = strategy;
        config
    }

    /// Check every cross-reference and parameter. Runs at engine construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let members = &self.household.members;
        if members.is_empty() || members.len() > 2 {
            return Err(ConfigError::HouseholdSize(members.len()));
        }

        let end = self.end_month();
        if end <= self.start {
            return Err(ConfigError::InvalidDateRange {
                start: self.start,
                end,
            });
        }
        if self.max_years == 0 {
            return Err(ConfigError::InvalidMaxYears);
        }

        let mut people = FxHashSet::default();
        for person in members {
            if !people.insert(person.person_id) {
                return Err(ConfigError::DuplicatePerson(person.person_id));
            }
            if person.withdrawal_start() < person.retirement {
                return Err(ConfigError::WithdrawalBeforeRetirement {
                    person: person.person_id,
                });
            }
            if let Some(model) = &person.mortality {
                model.validate()?;
            }
        }
        let known_person = |id: PersonId| {
            if people.contains(&id) {
                Ok(())
            } else {
                Err(ConfigError::UnknownPerson(id))
            }
        };

        let mut accounts = FxHashSet::default();
        for account in &self.accounts {
            if !accounts.insert(account.account_id) {
                return Err(ConfigError::DuplicateAccount(account.account_id));
            }
            known_person(account.owner)?;
            if !(account.balance >= 0.0 && account.balance.is_finite()) {
                return Err(ConfigError::NegativeBalance {
                    account: account.account_id,
                    balance: account.balance,
                });
            }
            let allocation = account.allocation;
            let sum = allocation.sum();
            let negative =
                allocation.stocks < 0.0 || allocation.bonds < 0.0 || allocation.cash < 0.0;
            if negative || (sum - 1.0).abs() > ALLOCATION_TOLERANCE {
                return Err(ConfigError::InvalidAllocation {
                    account: account.account_id,
                    sum,
                });
            }
        }
        let known_account = |id| {
            if accounts.contains(&id) {
                Ok(())
            } else {
                Err(ConfigError::UnknownAccount(id))
            }
        };

        for source in &self.income {
            known_person(source.owner)?;
        }
        for event in &self.events {
            if let Some(person) = event.person {
                known_person(person)?;
            }
            if let EventTrigger::Probabilistic { model, .. } = &event.trigger {
                model.validate()?;
            }
        }

        for target in &self.contributions.targets {
            known_account(target.account_id)?;
        }
        if let Some(overflow) = self.contributions.overflow {
            known_account(overflow)?;
        }
        if let RmdExcessDisposition::Reinvest { account } = self.rmd_excess {
            known_account(account)?;
        }
        if let AccountSequencer::Custom { order } = &self.sequencer {
            for id in order {
                known_account(*id)?;
            }
        }

        self.market.validate()?;
        self.strategy.validate()
    }
}
