//! Mutable per-run state and the read-only view handed to strategies
//!
//! `SimulationState` is owned by exactly one engine run. Strategies and the
//! orchestrator only ever see a [`SimulationView`], a value copied out of the
//! state at one instant. Withdrawals go through [`SimulationState::apply`];
//! every other mutator is crate-private and driven by the engine loop.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::collaborators::ReturnCalculator;
use crate::config::SimulationConfig;
use crate::date_math::YearMonth;
use crate::error::{CalcResult, StateError};
use crate::model::{
    Account, AccountFlow, AccountId, AccountSnapshot, CategoryId, IncomeKind, IncomeSource,
    LifePhase, MarketYear, MonthlyExpenses, MonthlyIncome, MonthlySnapshot, PersonId,
    PlanSummary, SpendingDecision, SpendingPhase, TaxStatus, TaxableIncome, TerminationReason,
    WithdrawalPlan,
};

/// Plans may overshoot a balance by floating-point noise, never by more
const OVERDRAW_TOLERANCE: f64 = 1e-6;

/// Immutable snapshot of the state at one instant.
///
/// Holding a view can never observe later mutation; it is rebuilt every step.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationView {
    pub month: YearMonth,
    pub total_balance: f64,
    /// Ordered by account id
    pub accounts: Vec<AccountSnapshot>,
    pub initial_balance: f64,
    pub year_start_balance: f64,
    pub prior_year_withdrawals: f64,
    /// Portfolio return over the previous calendar year, once one has closed
    pub prior_year_return: Option<f64>,
    pub last_ratchet_month: Option<YearMonth>,
    pub high_water_mark: f64,
    /// The strategy's monthly target from the previous decision
    pub previous_monthly_target: Option<f64>,
    pub contributions_ytd: FxHashMap<AccountId, f64>,
}

impl SimulationView {
    /// View over a plain list of accounts with no history
    #[must_use]
    pub fn from_accounts(month: YearMonth, accounts: &[Account]) -> Self {
        let mut snapshots: Vec<AccountSnapshot> =
            accounts.iter().map(|a| a.snapshot(false)).collect();
        snapshots.sort_by_key(|a| a.account_id);
        let total_balance = snapshots.iter().map(|a| a.balance).sum();
        Self {
            month,
            total_balance,
            accounts: snapshots,
            initial_balance: total_balance,
            year_start_balance: total_balance,
            prior_year_withdrawals: 0.0,
            prior_year_return: None,
            last_ratchet_month: None,
            high_water_mark: total_balance,
            previous_monthly_target: None,
            contributions_ytd: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn account(&self, account_id: AccountId) -> Option<&AccountSnapshot> {
        self.accounts.iter().find(|a| a.account_id == account_id)
    }

    #[must_use]
    pub fn balance_of(&self, account_id: AccountId) -> f64 {
        self.account(account_id).map_or(0.0, |a| a.balance)
    }

    #[must_use]
    pub fn contributed_ytd(&self, account_id: AccountId) -> f64 {
        self.contributions_ytd
            .get(&account_id)
            .copied()
            .unwrap_or(0.0)
    }
}

/// Cash set aside for one expense category's contingencies
#[derive(Debug, Clone, PartialEq)]
pub struct ReserveBalance {
    pub category_id: CategoryId,
    pub name: String,
    pub target: f64,
    pub balance: f64,
    /// Set after a draw; cleared once the target is restored
    pub refill_mode: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StateFlags {
    /// Set at the first death in a couple, never cleared
    pub survivor_mode: bool,
    pub spending_phase: SpendingPhase,
    pub paid_off: BTreeSet<CategoryId>,
    /// Monthly long-term-care cost per person receiving care
    pub long_term_care: FxHashMap<PersonId, f64>,
    pub rmd_started: FxHashSet<PersonId>,
    pub deceased: FxHashMap<PersonId, YearMonth>,
}

/// Lifetime totals for one run
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Counters {
    pub contributions: f64,
    pub withdrawals: f64,
    pub returns: f64,
    /// Minimum distributions withdrawn
    pub forced_minimums: f64,
    /// Minimums that left the portfolio rather than being reinvested
    pub distributed_excess: f64,
}

#[derive(Debug, Clone)]
struct YearTracker {
    year: i16,
    withdrawals_ytd: f64,
    prior_year_withdrawals: f64,
    year_start_balance: f64,
    /// Chained monthly portfolio growth factor for the current year
    growth_ytd: f64,
    prior_year_return: Option<f64>,
    contributions_ytd: FxHashMap<AccountId, f64>,
    taxable_income_ytd: TaxableIncome,
    prior_year_income: f64,
}

/// Everything besides account flows that goes into a monthly snapshot
#[derive(Debug, Clone)]
pub(crate) struct MonthActivity {
    pub index: u32,
    pub phases: Vec<(PersonId, Option<LifePhase>)>,
    pub income: MonthlyIncome,
    pub expenses: MonthlyExpenses,
    pub plan: Option<PlanSummary>,
    pub rmd_excess_distributed: f64,
    pub reserve_refill: f64,
}

/// Runtime state for one simulation run
#[derive(Debug, Clone)]
pub struct SimulationState {
    month: YearMonth,
    accounts: BTreeMap<AccountId, Account>,
    history: Vec<MonthlySnapshot>,
    initial_portfolio_balance: f64,
    pub(crate) income_sources: Vec<IncomeSource>,
    pub(crate) reserves: Vec<ReserveBalance>,
    pub(crate) flags: StateFlags,
    counters: Counters,
    year: YearTracker,
    last_ratchet_month: Option<YearMonth>,
    high_water_mark: f64,
    previous_monthly_target: Option<f64>,
    inflation_factor: f64,
    /// Per-account flows for the month in progress
    flows: BTreeMap<AccountId, AccountFlow>,
}

impl SimulationState {
    /// Fresh state positioned at the configured start month
    #[must_use]
    pub fn new(config: &SimulationConfig) -> Self {
        let accounts: BTreeMap<AccountId, Account> = config
            .accounts
            .iter()
            .map(|a| (a.account_id, a.clone()))
            .collect();
        let initial = accounts.values().map(|a| a.balance).sum();
        let reserves = config
            .reserves
            .iter()
            .map(|r| ReserveBalance {
                category_id: r.category_id,
                name: r.name.clone(),
                target: r.target,
                balance: r.initial_balance,
                refill_mode: r.initial_balance < r.target,
            })
            .collect();

        let mut state = Self {
            month: config.start,
            accounts,
            history: Vec::new(),
            initial_portfolio_balance: initial,
            income_sources: config.income.clone(),
            reserves,
            flags: StateFlags::default(),
            counters: Counters::default(),
            year: YearTracker {
                year: config.start.year,
                withdrawals_ytd: 0.0,
                prior_year_withdrawals: 0.0,
                year_start_balance: initial,
                growth_ytd: 1.0,
                prior_year_return: None,
                contributions_ytd: FxHashMap::default(),
                taxable_income_ytd: TaxableIncome::default(),
                prior_year_income: 0.0,
            },
            last_ratchet_month: None,
            high_water_mark: initial,
            previous_monthly_target: None,
            inflation_factor: 1.0,
            flows: BTreeMap::new(),
        };
        state.begin_month(config.start);
        state
    }

    /// Capture a view of the current instant
    #[must_use]
    pub fn snapshot(&self) -> SimulationView {
        SimulationView {
            month: self.month,
            total_balance: self.total_balance(),
            accounts: self
                .accounts
                .values()
                .map(|a| a.snapshot(self.flags.rmd_started.contains(&a.owner)))
                .collect(),
            initial_balance: self.initial_portfolio_balance,
            year_start_balance: self.year.year_start_balance,
            prior_year_withdrawals: self.year.prior_year_withdrawals,
            prior_year_return: self.year.prior_year_return,
            last_ratchet_month: self.last_ratchet_month,
            high_water_mark: self.high_water_mark,
            previous_monthly_target: self.previous_monthly_target,
            contributions_ytd: self.year.contributions_ytd.clone(),
        }
    }

    /// Execute a withdrawal plan.
    ///
    /// The whole plan is checked before any balance moves: an unknown account,
    /// a negative amount or a request above the available balance is refused
    /// and leaves the state untouched. Balances are clamped at zero.
    pub fn apply(&mut self, plan: WithdrawalPlan) -> Result<PlanSummary, StateError> {
        let mut requested: BTreeMap<AccountId, f64> = BTreeMap::new();
        for w in &plan.account_withdrawals {
            if !(w.amount >= 0.0 && w.amount.is_finite()) {
                return Err(StateError::NegativeAmount {
                    account: w.account_id,
                    amount: w.amount,
                });
            }
            *requested.entry(w.account_id).or_insert(0.0) += w.amount;
        }
        for (&account_id, &amount) in &requested {
            let account = self
                .accounts
                .get(&account_id)
                .ok_or(StateError::AccountNotFound(account_id))?;
            if amount > account.balance + OVERDRAW_TOLERANCE {
                return Err(StateError::Overdraw {
                    account: account_id,
                    requested: amount,
                    available: account.balance,
                });
            }
        }

        for (account_id, amount) in requested {
            let Some(account) = self.accounts.get_mut(&account_id) else {
                continue;
            };
            let withdrawn = amount.min(account.balance);
            account.balance = (account.balance - withdrawn).max(0.0);

            match account.kind.tax_status() {
                TaxStatus::Taxable => self.year.taxable_income_ytd.taxable_withdrawals += withdrawn,
                TaxStatus::TaxDeferred => {
                    self.year.taxable_income_ytd.tax_deferred_withdrawals += withdrawn;
                }
                TaxStatus::TaxFree => {}
            }
            self.flow_mut(account_id).withdrawals += withdrawn;
            self.counters.withdrawals += withdrawn;
            self.year.withdrawals_ytd += withdrawn;
        }

        self.counters.forced_minimums += plan
            .account_withdrawals
            .iter()
            .map(|w| w.required_minimum)
            .sum::<f64>();

        Ok(plan.summary())
    }

    #[must_use]
    pub fn month(&self) -> YearMonth {
        self.month
    }

    #[must_use]
    pub fn total_balance(&self) -> f64 {
        self.accounts.values().map(|a| a.balance).sum()
    }

    #[must_use]
    pub fn initial_balance(&self) -> f64 {
        self.initial_portfolio_balance
    }

    #[must_use]
    pub fn account(&self, account_id: AccountId) -> Option<&Account> {
        self.accounts.get(&account_id)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    #[must_use]
    pub fn history(&self) -> &[MonthlySnapshot] {
        &self.history
    }

    #[must_use]
    pub fn counters(&self) -> Counters {
        self.counters
    }

    #[must_use]
    pub fn flags(&self) -> &StateFlags {
        &self.flags
    }

    #[must_use]
    pub fn inflation_factor(&self) -> f64 {
        self.inflation_factor
    }

    #[must_use]
    pub fn reserve_balance(&self) -> f64 {
        self.reserves.iter().map(|r| r.balance).sum()
    }

    #[must_use]
    pub fn is_deceased(&self, person_id: PersonId) -> bool {
        self.flags.deceased.contains_key(&person_id)
    }

    pub(crate) fn taxable_income_ytd(&self) -> TaxableIncome {
        self.year.taxable_income_ytd
    }

    pub(crate) fn prior_year_income(&self) -> f64 {
        self.year.prior_year_income
    }

    pub(crate) fn into_history(self) -> Vec<MonthlySnapshot> {
        self.history
    }

    // ------------------------------------------------------------------
    // Engine-only mutators
    // ------------------------------------------------------------------

    /// Move to `month` and open fresh per-account flows
    pub(crate) fn begin_month(&mut self, month: YearMonth) {
        self.month = month;
        self.flows = self
            .accounts
            .values()
            .map(|a| {
                (
                    a.account_id,
                    AccountFlow {
                        account_id: a.account_id,
                        owner: a.owner,
                        starting: a.balance,
                        contributions: 0.0,
                        withdrawals: 0.0,
                        returns: 0.0,
                        ending: a.balance,
                    },
                )
            })
            .collect();
    }

    fn flow_mut(&mut self, account_id: AccountId) -> &mut AccountFlow {
        let owner = self
            .accounts
            .get(&account_id)
            .map_or(PersonId(0), |a| a.owner);
        self.flows.entry(account_id).or_insert(AccountFlow {
            account_id,
            owner,
            starting: 0.0,
            contributions: 0.0,
            withdrawals: 0.0,
            returns: 0.0,
            ending: 0.0,
        })
    }

    fn credit(&mut self, account_id: AccountId, amount: f64) -> Result<(), StateError> {
        if !(amount >= 0.0 && amount.is_finite()) {
            return Err(StateError::NegativeAmount {
                account: account_id,
                amount,
            });
        }
        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(StateError::AccountNotFound(account_id))?;
        account.balance += amount;
        self.flow_mut(account_id).contributions += amount;
        self.counters.contributions += amount;
        Ok(())
    }

    /// New money from surplus income; counts toward annual limits
    pub(crate) fn deposit(&mut self, account_id: AccountId, amount: f64) -> Result<(), StateError> {
        self.credit(account_id, amount)?;
        *self.year.contributions_ytd.entry(account_id).or_insert(0.0) += amount;
        Ok(())
    }

    /// Excess minimum distribution put back into the portfolio
    pub(crate) fn reinvest(
        &mut self,
        account_id: AccountId,
        amount: f64,
    ) -> Result<(), StateError> {
        self.credit(account_id, amount)
    }

    pub(crate) fn record_distributed_excess(&mut self, amount: f64) {
        self.counters.distributed_excess += amount;
    }

    /// Grow every account by its allocation-blended annual rate for one month.
    /// Returns the total dollar return.
    pub(crate) fn apply_returns(
        &mut self,
        market: &MarketYear,
        returns: &dyn ReturnCalculator,
    ) -> CalcResult<f64> {
        let before = self.total_balance();
        let mut total = 0.0;
        let mut gains: Vec<(AccountId, f64)> = Vec::with_capacity(self.accounts.len());
        for account in self.accounts.values_mut() {
            let annual = account
                .allocation
                .blended_rate(market.stocks, market.bonds, market.cash);
            let grown = returns.grow(account.balance, annual)?;
            gains.push((account.account_id, grown - account.balance));
            total += grown - account.balance;
            account.balance = grown;
        }
        for (account_id, gain) in gains {
            self.flow_mut(account_id).returns += gain;
        }
        self.counters.returns += total;
        if before > 0.0 {
            self.year.growth_ytd *= 1.0 + total / before;
        }
        Ok(total)
    }

    /// Compound the cumulative price level by one month of `annual` inflation
    pub(crate) fn advance_inflation(&mut self, annual: f64) {
        if annual > -1.0 {
            self.inflation_factor *= (1.0 + annual).powf(1.0 / 12.0);
        }
    }

    pub(crate) fn record_income(&mut self, income: &MonthlyIncome) {
        let ytd = &mut self.year.taxable_income_ytd;
        ytd.ordinary += income.salary + income.pension + income.annuity + income.other;
        ytd.social_security += income.social_security;
    }

    /// Remember the strategy's decision for the next view
    pub(crate) fn record_spending(&mut self, decision: &SpendingDecision) {
        self.previous_monthly_target = Some(decision.target_withdrawal);
        if decision.is_ratchet() {
            self.last_ratchet_month = Some(self.month);
        }
    }

    /// Re-own every account of `from` to `to`. Balances do not move.
    pub(crate) fn transfer_ownership(&mut self, from: PersonId, to: PersonId) -> Vec<AccountId> {
        let mut moved = Vec::new();
        for account in self.accounts.values_mut().filter(|a| a.owner == from) {
            account.owner = to;
            moved.push(account.account_id);
        }
        for flow in self.flows.values_mut().filter(|f| f.owner == from) {
            flow.owner = to;
        }
        moved
    }

    /// Take `amount` from a category reserve. Returns the part the reserve
    /// could not cover; the reserve enters refill mode either way.
    pub(crate) fn draw_reserve(&mut self, category_id: CategoryId, amount: f64) -> f64 {
        let Some(reserve) = self
            .reserves
            .iter_mut()
            .find(|r| r.category_id == category_id)
        else {
            return amount;
        };
        let drawn = amount.min(reserve.balance).max(0.0);
        reserve.balance -= drawn;
        reserve.refill_mode = reserve.balance < reserve.target;
        amount - drawn
    }

    /// Route surplus cash into reserves in refill mode. Returns the amount used.
    pub(crate) fn refill_reserves(&mut self, cash: f64) -> f64 {
        let mut remaining = cash.max(0.0);
        for reserve in self.reserves.iter_mut().filter(|r| r.refill_mode) {
            if remaining <= 0.0 {
                break;
            }
            let take = (reserve.target - reserve.balance).max(0.0).min(remaining);
            reserve.balance += take;
            remaining -= take;
            if reserve.balance >= reserve.target {
                reserve.refill_mode = false;
            }
        }
        cash.max(0.0) - remaining
    }

    /// Close the calendar year. Returns the closed year and its taxable income.
    pub(crate) fn roll_year(&mut self, new_year: i16) -> (i16, TaxableIncome) {
        let closed = self.year.year;
        let income = self.year.taxable_income_ytd;
        let total = self.total_balance();
        let y = &mut self.year;
        y.prior_year_withdrawals = y.withdrawals_ytd;
        y.prior_year_return = Some(y.growth_ytd - 1.0);
        y.prior_year_income = income.ordinary_total() + income.social_security;
        y.withdrawals_ytd = 0.0;
        y.growth_ytd = 1.0;
        y.year_start_balance = total;
        y.contributions_ytd.clear();
        y.taxable_income_ytd = TaxableIncome::default();
        y.year = new_year;
        (closed, income)
    }

    /// Append the snapshot for the month in progress
    pub(crate) fn close_month(&mut self, activity: MonthActivity) {
        let mut accounts: Vec<AccountFlow> = Vec::with_capacity(self.flows.len());
        for (account_id, flow) in &self.flows {
            let mut flow = *flow;
            flow.ending = self.accounts.get(account_id).map_or(0.0, |a| a.balance);
            accounts.push(flow);
        }

        let total_balance = self.total_balance();
        self.high_water_mark = self.high_water_mark.max(total_balance);
        let sum = |f: fn(&AccountFlow) -> f64| accounts.iter().map(f).sum::<f64>();

        let snapshot = MonthlySnapshot {
            month: self.month,
            index: activity.index,
            phases: activity.phases,
            total_balance,
            income: activity.income,
            expenses: activity.expenses,
            contributions: sum(|f| f.contributions),
            withdrawals: sum(|f| f.withdrawals),
            returns: sum(|f| f.returns),
            accounts,
            reserve_balance: self.reserve_balance(),
            reserve_refill: activity.reserve_refill,
            plan: activity.plan,
            rmd_excess_distributed: activity.rmd_excess_distributed,
            inflation_factor: self.inflation_factor,
            survivor_mode: self.flags.survivor_mode,
            termination: None,
        };
        self.history.push(snapshot);
    }

    pub(crate) fn mark_terminal(&mut self, reason: TerminationReason) {
        if let Some(last) = self.history.last_mut() {
            last.termination = Some(reason);
        }
    }

    /// Sum of income of `kind` currently owned by `owner`
    pub(crate) fn income_of(&self, owner: PersonId, kind: fn(&IncomeKind) -> bool) -> f64 {
        self.income_sources
            .iter()
            .filter(|s| s.owner == owner && kind(&s.kind))
            .map(|s| s.monthly_amount)
            .sum()
    }
}
