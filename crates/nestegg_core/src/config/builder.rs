//! Simulation Builder
//!
//! Fluent construction of a [`SimulationConfig`] with automatic id
//! assignment and name-based references. Person-scoped calls (`retire_at`,
//! `salary`, `social_security`, ...) apply to the most recently added person;
//! accounts default to that person as owner.
//!
//! # Example
//!
//! ```ignore
//! use nestegg_core::config::{AccountBuilder, SimulationBuilder};
//! use nestegg_core::model::{ExpenseKind, PensionForm, RmdExcessDisposition};
//!
//! let config = SimulationBuilder::new()
//!     .start(2025, 1)
//!     .years(35)
//!     .person("Alex", 1963, 2, 14)
//!     .retire_at(2028, 1)
//!     .salary(9_000.0)
//!     .social_security(2_800.0, 2030, 3)
//!     .person("Sam", 1965, 9, 2)
//!     .retire_at(2030, 1)
//!     .pension("State pension", 1_900.0, PensionForm::JointSurvivor50)
//!     .account(AccountBuilder::traditional_401k("Alex 401k").owner("Alex").balance(700_000.0))
//!     .account(AccountBuilder::roth_ira("Sam Roth").balance(120_000.0))
//!     .account(AccountBuilder::taxable_brokerage("Joint").owner("Alex").balance(90_000.0))
//!     .expense("Living", ExpenseKind::Essential, 6_500.0)
//!     .mortgage("Mortgage", 2_100.0, 2034, 6)
//!     .contribute_to("Alex 401k", 1.0)
//!     .rmd_excess(RmdExcessDisposition::Distribute)
//!     .build()?;
//! ```

use jiff::civil::date;

use super::SimulationConfig;
use crate::date_math::YearMonth;
use crate::error::ConfigError;
use crate::model::{
    Account, AccountId, AccountKind, Allocation, CategoryId, ContingencyReserve,
    ContributionTarget, EventId, EventKind, EventTrigger, ExpenseCategory, ExpenseKind,
    FilingStatus, Household, IncomeKind, IncomeSource, InflationProfile, LifeEvent,
    MarketAssumptions, PensionForm, Person, PersonId, ProbabilityModel, RmdExcessDisposition,
};
use crate::sequencer::AccountSequencer;
use crate::strategy::SpendingStrategy;

/// Builder for creating accounts with a fluent API
#[derive(Debug, Clone)]
pub struct AccountBuilder {
    name: String,
    kind: AccountKind,
    owner: Option<String>,
    balance: f64,
    allocation: Allocation,
}

impl AccountBuilder {
    // =========================================================================
    // Preset Account Type Constructors
    // =========================================================================

    #[must_use]
    pub fn new(name: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            name: name.into(),
            kind,
            owner: None,
            balance: 0.0,
            allocation: Allocation::default(),
        }
    }

    /// Taxable brokerage account. Drawn first by the tax-efficient sequencer.
    #[must_use]
    pub fn taxable_brokerage(name: impl Into<String>) -> Self {
        Self::new(name, AccountKind::Brokerage)
    }

    /// Savings account held entirely in cash
    #[must_use]
    pub fn savings(name: impl Into<String>) -> Self {
        Self::new(name, AccountKind::Savings).allocation(Allocation::all_cash())
    }

    /// Traditional 401(k): tax-deferred, subject to minimum distributions
    #[must_use]
    pub fn traditional_401k(name: impl Into<String>) -> Self {
        Self::new(name, AccountKind::Traditional401k)
    }

    /// Traditional IRA: tax-deferred, subject to minimum distributions
    #[must_use]
    pub fn traditional_ira(name: impl Into<String>) -> Self {
        Self::new(name, AccountKind::TraditionalIra)
    }

    #[must_use]
    pub fn roth_401k(name: impl Into<String>) -> Self {
        Self::new(name, AccountKind::Roth401k)
    }

    #[must_use]
    pub fn roth_ira(name: impl Into<String>) -> Self {
        Self::new(name, AccountKind::RothIra)
    }

    #[must_use]
    pub fn hsa(name: impl Into<String>) -> Self {
        Self::new(name, AccountKind::Hsa)
    }

    // =========================================================================
    // Settings
    // =========================================================================

    #[must_use]
    pub fn balance(mut self, balance: f64) -> Self {
        self.balance = balance;
        self
    }

    /// Owner by person name. Defaults to the last person added before the account.
    #[must_use]
    pub fn owner(mut self, person: impl Into<String>) -> Self {
        self.owner = Some(person.into());
        self
    }

    #[must_use]
    pub fn allocation(mut self, allocation: Allocation) -> Self {
        self.allocation = allocation;
        self
    }

    /// Stock/bond split with no cash
    #[must_use]
    pub fn stocks_bonds(self, stocks: f64) -> Self {
        self.allocation(Allocation::new(stocks, 1.0 - stocks, 0.0))
    }

    fn build(self, account_id: AccountId, owner: PersonId) -> Account {
        Account {
            account_id,
            name: self.name,
            kind: self.kind,
            owner,
            balance: self.balance,
            allocation: self.allocation,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingAccount {
    builder: AccountBuilder,
    default_owner: Option<PersonId>,
}

/// Builder for creating simulations with automatic ID assignment
#[derive(Debug, Clone)]
pub struct SimulationBuilder {
    config: SimulationConfig,
    members: Vec<Person>,
    filing_status: Option<FilingStatus>,
    next_account_id: u16,
    next_category_id: u16,
    next_event_id: u16,

    // Resolved by name during build
    pending_accounts: Vec<PendingAccount>,
    pending_reserves: Vec<(String, f64, f64)>,
    pending_targets: Vec<(String, f64)>,
    pending_overflow: Option<String>,
    pending_reinvest: Option<String>,
    rmd_excess: Option<RmdExcessDisposition>,
}

impl Default for SimulationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationBuilder {
    #[must_use]
    pub fn new() -> Self {
        let mut config = SimulationConfig::default();
        config.household.members.clear();
        Self {
            config,
            members: Vec::new(),
            filing_status: None,
            next_account_id: 0,
            next_category_id: 0,
            next_event_id: 0,
            pending_accounts: Vec::new(),
            pending_reserves: Vec::new(),
            pending_targets: Vec::new(),
            pending_overflow: None,
            pending_reinvest: None,
            rmd_excess: None,
        }
    }

    // =========================================================================
    // Basic Configuration
    // =========================================================================

    /// Set the first simulated month
    #[must_use]
    pub fn start(mut self, year: i16, month: i8) -> Self {
        self.config.start = YearMonth::new(year, month);
        self
    }

    /// Set an explicit end month (exclusive)
    #[must_use]
    pub fn end(mut self, year: i16, month: i8) -> Self {
        self.config.end = Some(YearMonth::new(year, month));
        self
    }

    /// Simulate this many years from the start
    #[must_use]
    pub fn years(mut self, years: u16) -> Self {
        self.config.duration_years = years;
        self.config.end = None;
        self
    }

    #[must_use]
    pub fn max_years(mut self, years: u16) -> Self {
        self.config.max_years = years;
        self
    }

    #[must_use]
    pub fn market(mut self, market: MarketAssumptions) -> Self {
        self.config.market = market;
        self
    }

    /// Fixed inflation for both the market path and strategy indexing
    #[must_use]
    pub fn inflation(mut self, rate: f64) -> Self {
        self.config.market.inflation = InflationProfile::Fixed { rate };
        self.config.strategy_params.inflation_rate = rate;
        self
    }

    #[must_use]
    pub fn strategy(mut self, strategy: SpendingStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    #[must_use]
    pub fn sequencer(mut self, sequencer: AccountSequencer) -> Self {
        self.config.sequencer = sequencer;
        self
    }

    #[must_use]
    pub fn rmd_excess(mut self, disposition: RmdExcessDisposition) -> Self {
        self.rmd_excess = Some(disposition);
        self
    }

    /// Reinvest excess minimum distributions into the named account
    #[must_use]
    pub fn reinvest_excess_into(mut self, account: impl Into<String>) -> Self {
        self.pending_reinvest = Some(account.into());
        self
    }

    #[must_use]
    pub fn filing_status(mut self, status: FilingStatus) -> Self {
        self.filing_status = Some(status);
        self
    }

    // =========================================================================
    // People
    // =========================================================================

    /// Add a household member. Retirement defaults to the simulation start.
    #[must_use]
    pub fn person(mut self, name: impl Into<String>, year: i16, month: i8, day: i8) -> Self {
        let person_id = PersonId(u8::try_from(self.members.len()).unwrap_or(u8::MAX));
        self.members.push(Person {
            person_id,
            name: name.into(),
            birth_date: date(year, month, day),
            retirement: self.config.start,
            withdrawal_start: None,
            mortality: None,
        });
        self
    }

    fn with_current(mut self, f: impl FnOnce(&mut Person)) -> Self {
        if let Some(person) = self.members.last_mut() {
            f(person);
        }
        self
    }

    fn current_person(&self) -> Option<PersonId> {
        self.members.last().map(|p| p.person_id)
    }

    #[must_use]
    pub fn retire_at(self, year: i16, month: i8) -> Self {
        self.with_current(|p| p.retirement = YearMonth::new(year, month))
    }

    /// Delay portfolio withdrawals past retirement
    #[must_use]
    pub fn withdrawals_from(self, year: i16, month: i8) -> Self {
        self.with_current(|p| p.withdrawal_start = Some(YearMonth::new(year, month)))
    }

    #[must_use]
    pub fn mortality(self, model: ProbabilityModel) -> Self {
        self.with_current(|p| p.mortality = Some(model))
    }

    // =========================================================================
    // Income (owned by the current person)
    // =========================================================================

    /// Add any income source owned by the current person
    #[must_use]
    pub fn income(
        mut self,
        name: impl Into<String>,
        kind: IncomeKind,
        monthly_amount: f64,
        start: Option<YearMonth>,
    ) -> Self {
        let owner = self.current_person().unwrap_or(PersonId(0));
        let cola = match kind {
            IncomeKind::SocialSecurity => self.config.strategy_params.inflation_rate,
            _ => 0.0,
        };
        self.config.income.push(IncomeSource {
            name: name.into(),
            owner,
            kind,
            monthly_amount,
            start,
            end: None,
            cola,
        });
        self
    }

    #[must_use]
    pub fn salary(self, monthly_amount: f64) -> Self {
        let name = self
            .members
            .last()
            .map_or_else(|| "Salary".to_string(), |p| format!("{} salary", p.name));
        self.income(name, IncomeKind::Salary, monthly_amount, None)
    }

    #[must_use]
    pub fn social_security(self, monthly_amount: f64, year: i16, month: i8) -> Self {
        let name = self.members.last().map_or_else(
            || "Social Security".to_string(),
            |p| format!("{} social security", p.name),
        );
        self.income(
            name,
            IncomeKind::SocialSecurity,
            monthly_amount,
            Some(YearMonth::new(year, month)),
        )
    }

    #[must_use]
    pub fn pension(self, name: impl Into<String>, monthly_amount: f64, form: PensionForm) -> Self {
        self.income(name, IncomeKind::Pension { form }, monthly_amount, None)
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    #[must_use]
    pub fn account(mut self, builder: AccountBuilder) -> Self {
        let default_owner = self.current_person();
        self.pending_accounts.push(PendingAccount {
            builder,
            default_owner,
        });
        self
    }

    /// Route `share` of surplus contributions to the named account
    #[must_use]
    pub fn contribute_to(mut self, account: impl Into<String>, share: f64) -> Self {
        self.pending_targets.push((account.into(), share));
        self
    }

    /// Account receiving contributions beyond every target's annual limit
    #[must_use]
    pub fn overflow_to(mut self, account: impl Into<String>) -> Self {
        self.pending_overflow = Some(account.into());
        self
    }

    // =========================================================================
    // Expenses and events
    // =========================================================================

    fn next_category(&mut self) -> CategoryId {
        let id = CategoryId(self.next_category_id);
        self.next_category_id += 1;
        id
    }

    fn next_event(&mut self) -> EventId {
        let id = EventId(self.next_event_id);
        self.next_event_id += 1;
        id
    }

    /// Add an inflation-adjusted expense category
    #[must_use]
    pub fn expense(
        mut self,
        name: impl Into<String>,
        kind: ExpenseKind,
        monthly_amount: f64,
    ) -> Self {
        let category_id = self.next_category();
        self.config.budget.categories.push(ExpenseCategory {
            category_id,
            name: name.into(),
            kind,
            monthly_amount,
            start: None,
            end: None,
            inflation_adjusted: true,
        });
        self
    }

    /// Fixed nominal housing payment that stops when the mortgage is paid off
    #[must_use]
    pub fn mortgage(
        mut self,
        name: impl Into<String>,
        monthly_amount: f64,
        year: i16,
        month: i8,
    ) -> Self {
        let name = name.into();
        let category = self.next_category();
        self.config.budget.categories.push(ExpenseCategory {
            category_id: category,
            name: name.clone(),
            kind: ExpenseKind::Housing,
            monthly_amount,
            start: None,
            end: None,
            inflation_adjusted: false,
        });
        let event_id = self.next_event();
        self.config.events.push(LifeEvent {
            event_id,
            name: format!("{name} paid off"),
            person: None,
            kind: EventKind::MortgagePayoff { category },
            trigger: EventTrigger::Scheduled {
                month: YearMonth::new(year, month),
            },
        });
        self
    }

    /// Contingency reserve for the named expense category
    #[must_use]
    pub fn reserve(
        mut self,
        category: impl Into<String>,
        target: f64,
        initial_balance: f64,
    ) -> Self {
        self.pending_reserves
            .push((category.into(), target, initial_balance));
        self
    }

    /// Add a life event; its id is assigned here
    #[must_use]
    pub fn event(
        mut self,
        name: impl Into<String>,
        person: Option<PersonId>,
        kind: EventKind,
        trigger: EventTrigger,
    ) -> Self {
        let event_id = self.next_event();
        self.config.events.push(LifeEvent {
            event_id,
            name: name.into(),
            person,
            kind,
            trigger,
        });
        self
    }

    // =========================================================================
    // Build
    // =========================================================================

    fn person_named(&self, name: &str) -> Result<PersonId, ConfigError> {
        self.members
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.person_id)
            .ok_or_else(|| ConfigError::UnknownName(name.to_string()))
    }

    fn account_named(accounts: &[Account], name: &str) -> Result<AccountId, ConfigError> {
        accounts
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.account_id)
            .ok_or_else(|| ConfigError::UnknownName(name.to_string()))
    }

    /// Resolve names, assign ids and validate the result
    pub fn build(mut self) -> Result<SimulationConfig, ConfigError> {
        let mut accounts = Vec::with_capacity(self.pending_accounts.len());
        for pending in std::mem::take(&mut self.pending_accounts) {
            let owner = match &pending.builder.owner {
                Some(name) => self.person_named(name)?,
                None => pending
                    .default_owner
                    .ok_or(ConfigError::HouseholdSize(0))?,
            };
            let account_id = AccountId(self.next_account_id);
            self.next_account_id += 1;
            accounts.push(pending.builder.build(account_id, owner));
        }

        for (account, share) in &self.pending_targets {
            let account_id = Self::account_named(&accounts, account)?;
            self.config.contributions.targets.push(ContributionTarget {
                account_id,
                share: *share,
            });
        }
        if let Some(name) = &self.pending_overflow {
            self.config.contributions.overflow = Some(Self::account_named(&accounts, name)?);
        }

        for (category, target, initial_balance) in &self.pending_reserves {
            let found = self
                .config
                .budget
                .categories
                .iter()
                .find(|c| c.name == *category)
                .ok_or_else(|| ConfigError::UnknownName(category.clone()))?;
            self.config.reserves.push(ContingencyReserve {
                category_id: found.category_id,
                name: found.name.clone(),
                target: *target,
                initial_balance: *initial_balance,
            });
        }

        self.config.rmd_excess = match (&self.pending_reinvest, self.rmd_excess) {
            (Some(name), _) => RmdExcessDisposition::Reinvest {
                account: Self::account_named(&accounts, name)?,
            },
            (None, Some(disposition)) => disposition,
            (None, None) => return Err(ConfigError::MissingRmdExcessDisposition),
        };

        let filing_status = self.filing_status.unwrap_or(if self.members.len() == 2 {
            FilingStatus::MarriedFilingJointly
        } else {
            FilingStatus::Single
        });
        self.config.household = Household {
            members: self.members,
            filing_status,
        };
        self.config.accounts = accounts;
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn couple() -> SimulationBuilder {
        SimulationBuilder::new()
            .start(2025, 1)
            .years(30)
            .person("Alex", 1962, 4, 10)
            .retire_at(2027, 1)
            .salary(8_000.0)
            .social_security(2_600.0, 2029, 4)
            .person("Sam", 1964, 8, 1)
            .retire_at(2029, 1)
            .account(AccountBuilder::traditional_401k("Alex 401k").owner("Alex").balance(500_000.0))
            .account(AccountBuilder::roth_ira("Sam Roth").balance(80_000.0))
            .account(AccountBuilder::taxable_brokerage("Joint").owner("Alex").balance(60_000.0))
            .expense("Living", ExpenseKind::Essential, 5_000.0)
    }

    #[test]
    fn test_builder_assigns_ids_and_owners() {
        let config = couple()
            .contribute_to("Alex 401k", 1.0)
            .overflow_to("Joint")
            .rmd_excess(RmdExcessDisposition::Distribute)
            .build()
            .unwrap();

        assert_eq!(config.household.members.len(), 2);
        assert_eq!(
            config.household.filing_status,
            FilingStatus::MarriedFilingJointly
        );
        let ids: Vec<u16> = config.accounts.iter().map(|a| a.account_id.0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(config.accounts[0].owner, PersonId(0));
        assert_eq!(config.accounts[1].owner, PersonId(1), "defaults to last person");
        assert_eq!(config.contributions.overflow, Some(AccountId(2)));
        assert_eq!(config.income.len(), 2);
        assert!(config.income.iter().all(|i| i.owner == PersonId(0)));
    }

    #[test]
    fn test_builder_requires_disposition() {
        let err = couple().build().unwrap_err();
        assert_eq!(err, ConfigError::MissingRmdExcessDisposition);

        let config = couple().reinvest_excess_into("Joint").build().unwrap();
        assert_eq!(
            config.rmd_excess,
            RmdExcessDisposition::Reinvest {
                account: AccountId(2)
            }
        );
    }

    #[test]
    fn test_builder_rejects_unknown_names() {
        let err = couple()
            .contribute_to("Nope", 1.0)
            .rmd_excess(RmdExcessDisposition::Distribute)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::UnknownName("Nope".into()));
    }

    #[test]
    fn test_mortgage_and_reserve() {
        let config = couple()
            .mortgage("Mortgage", 2_000.0, 2032, 6)
            .expense("Car", ExpenseKind::Essential, 300.0)
            .reserve("Car", 15_000.0, 15_000.0)
            .rmd_excess(RmdExcessDisposition::Distribute)
            .build()
            .unwrap();

        let mortgage = &config.budget.categories[1];
        assert!(!mortgage.inflation_adjusted);
        assert!(matches!(
            config.events[0].kind,
            EventKind::MortgagePayoff { category } if category == mortgage.category_id
        ));
        assert_eq!(config.reserves[0].category_id, CategoryId(2));
    }
}
