//! The monthly simulation loop
//!
//! A [`SimulationEngine`] holds the validated configuration, the collaborator
//! set and the spending policy, all shared read-only. Every call to
//! [`SimulationEngine::run`] builds its own [`SimulationState`], random stream,
//! market path and event registry, so runs are independent and may execute
//! concurrently against one engine.
//!
//! Each month runs the same fixed sequence:
//!
//! 1. year rollover (January): close the tax year, reset year-to-date figures
//! 2. derive each person's phase
//! 3. income
//! 4. fire due life events
//! 5. expenses
//! 6. while anyone accumulates: minimums owed, then contributions; otherwise
//!    the withdrawal plan
//! 7. monthly-compounded market returns on post-transaction balances
//! 8. append the monthly snapshot
//! 9. termination check

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::{debug, info, warn};

use crate::collaborators::{Collaborators, ContributionRequest};
use crate::config::SimulationConfig;
use crate::date_math::{YearMonth, fractional_age};
use crate::error::{ConfigError, SimulationError};
use crate::events::{EventRegistry, HouseholdMode, apply_survivor_transition};
use crate::model::{
    EventKind, ExpenseFlags, FilingStatus, FiredEvent, LifePhase, MarketPath, MonthlyExpenses,
    MonthlyIncome, Person, PersonId, PersonStatus, PlanSummary, RmdExcessDisposition,
    SurvivorTransition, TaxSummary, TerminationReason, TimeSeries,
};
use crate::orchestrator::{OwnerInfo, SpendingOrchestrator};
use crate::simulation_state::{MonthActivity, SimulationState};
use crate::strategy::{SpendingContext, SpendingPolicy};

/// A portfolio at or below this total is treated as empty
const DEPLETION_THRESHOLD: f64 = 1e-6;

/// Runs projections of one configuration
#[derive(Debug, Clone)]
pub struct SimulationEngine {
    config: Arc<SimulationConfig>,
    collaborators: Collaborators,
    policy: Arc<dyn SpendingPolicy>,
}

impl SimulationEngine {
    /// Validate `config` and bind it to a collaborator set.
    ///
    /// The spending policy is the configured [`crate::strategy::SpendingStrategy`];
    /// use [`SimulationEngine::with_policy`] to substitute another.
    pub fn new(
        config: SimulationConfig,
        collaborators: Collaborators,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy: Arc<dyn SpendingPolicy> = Arc::new(config.strategy);
        Ok(Self {
            config: Arc::new(config),
            collaborators,
            policy,
        })
    }

    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn SpendingPolicy>) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    #[must_use]
    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Simulate one path. The same seed always produces the same series.
    pub fn run(&self, seed: u64) -> Result<TimeSeries, SimulationError> {
        self.run_until(seed, &|| false)
    }

    /// Simulate one path, polling `stop` at every year boundary.
    ///
    /// Returns [`SimulationError::Interrupted`] once `stop` reports true.
    pub fn run_until(
        &self,
        seed: u64,
        stop: &dyn Fn() -> bool,
    ) -> Result<TimeSeries, SimulationError> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let market = MarketPath::sample(&mut rng, &self.config.market, self.config.market_years())
            .map_err(SimulationError::calculation(self.config.start))?;
        let registry = EventRegistry::new(
            &self.config.household,
            &self.config.income,
            &self.config.events,
        );

        let run = Run {
            engine: self,
            state: SimulationState::new(&self.config),
            rng,
            market,
            registry,
            yearly_taxes: Vec::new(),
            fired_events: Vec::new(),
            survivor_transitions: Vec::new(),
            shortfall_reported: false,
        };
        run.execute(seed, stop)
    }
}

/// Simulate `config` once with the default collaborators
pub fn run(config: SimulationConfig, seed: u64) -> Result<TimeSeries, SimulationError> {
    SimulationEngine::new(config, Collaborators::default())?.run(seed)
}

/// What the spending step did this month
#[derive(Debug, Default)]
struct Spending {
    plan: Option<PlanSummary>,
    rmd_excess_distributed: f64,
    reserve_refill: f64,
}

/// Mutable pieces of one run
struct Run<'e> {
    engine: &'e SimulationEngine,
    state: SimulationState,
    rng: SmallRng,
    market: MarketPath,
    registry: EventRegistry,
    yearly_taxes: Vec<TaxSummary>,
    fired_events: Vec<FiredEvent>,
    survivor_transitions: Vec<SurvivorTransition>,
    shortfall_reported: bool,
}

impl Run<'_> {
    fn config(&self) -> &SimulationConfig {
        &self.engine.config
    }

    fn members(&self) -> &[Person] {
        &self.engine.config.household.members
    }

    fn filing_status(&self) -> FilingStatus {
        if self.state.flags().survivor_mode {
            FilingStatus::Single
        } else {
            self.config().household.filing_status
        }
    }

    fn phases(&self, month: YearMonth) -> Vec<(PersonId, Option<LifePhase>)> {
        self.members()
            .iter()
            .map(|p| {
                let phase = LifePhase::derive(
                    month,
                    p.retirement,
                    p.withdrawal_start(),
                    self.state.is_deceased(p.person_id),
                );
                (p.person_id, phase)
            })
            .collect()
    }

    fn statuses(&self, month: YearMonth) -> Vec<PersonStatus> {
        let flags = self.state.flags();
        self.members()
            .iter()
            .map(|p| PersonStatus {
                person_id: p.person_id,
                phase: LifePhase::derive(
                    month,
                    p.retirement,
                    p.withdrawal_start(),
                    self.state.is_deceased(p.person_id),
                ),
                age: p.age_in(month),
                rmd_active: flags.rmd_started.contains(&p.person_id),
                long_term_care: flags.long_term_care.contains_key(&p.person_id),
            })
            .collect()
    }

    /// First living member; household-level decisions use this person's age
    fn primary(&self) -> Option<&Person> {
        self.members()
            .iter()
            .find(|p| !self.state.is_deceased(p.person_id))
    }

    fn execute(
        mut self,
        seed: u64,
        stop: &dyn Fn() -> bool,
    ) -> Result<TimeSeries, SimulationError> {
        let start = self.config().start;
        let end = self.config().end_month();
        let max_months = u32::from(self.config().max_years) * 12;
        let mut month = start;

        let termination = loop {
            let index = u32::try_from(start.months_until(month)).unwrap_or(0);
            if index > 0 {
                self.state.begin_month(month);
                if month.is_year_start() {
                    if stop() {
                        debug!(seed, month = %month, "run interrupted");
                        return Err(SimulationError::Interrupted { month });
                    }
                    self.close_tax_year(month)?;
                }
            }

            let statuses = self.statuses(month);
            let income = self
                .engine
                .collaborators
                .income
                .monthly_income(
                    &self.config().household,
                    &self.state.income_sources,
                    month,
                    &statuses,
                    index,
                )
                .map_err(SimulationError::calculation(month))?;
            self.state.record_income(&income);

            self.fire_events(month)?;

            // Deaths this month change phases and who owns what
            let phases = self.phases(month);
            let mode = HouseholdMode::from_phases(&phases);
            let expenses = self.expenses(month)?;

            let spending = match mode {
                HouseholdMode::Accumulating => self.accumulate(month, &income, &expenses)?,
                HouseholdMode::Drawing { withdrawals_active } => {
                    self.draw(month, &income, &expenses, withdrawals_active)?
                }
                HouseholdMode::AllDeceased => Spending::default(),
            };

            let year_index = (index / 12) as usize;
            let market_year = *self
                .market
                .year(year_index)
                .map_err(SimulationError::calculation(month))?;
            self.state
                .apply_returns(&market_year, self.engine.collaborators.returns.as_ref())
                .map_err(SimulationError::calculation(month))?;
            self.state.advance_inflation(market_year.inflation);

            self.state.close_month(MonthActivity {
                index,
                phases,
                income,
                expenses,
                plan: spending.plan,
                rmd_excess_distributed: spending.rmd_excess_distributed,
                reserve_refill: spending.reserve_refill,
            });

            if let Some(reason) = self.termination(month, index, mode, end, max_months) {
                break reason;
            }
            month = month.next();
        };

        self.state.mark_terminal(termination);
        self.close_final_tax_year()?;

        let final_balance = self.state.total_balance();
        info!(
            seed,
            ?termination,
            final_balance,
            months = self.state.history().len(),
            "simulation run finished"
        );

        Ok(TimeSeries {
            seed,
            snapshots: self.state.into_history(),
            termination,
            yearly_taxes: self.yearly_taxes,
            fired_events: self.fired_events,
            survivor_transitions: self.survivor_transitions,
        })
    }

    fn termination(
        &self,
        month: YearMonth,
        index: u32,
        mode: HouseholdMode,
        end: YearMonth,
        max_months: u32,
    ) -> Option<TerminationReason> {
        if mode == HouseholdMode::AllDeceased {
            Some(TerminationReason::AllPersonsDeceased)
        } else if !mode.is_accumulating() && self.state.total_balance() <= DEPLETION_THRESHOLD {
            Some(TerminationReason::PortfolioDepleted)
        } else if month.next() >= end {
            Some(TerminationReason::Completed)
        } else if index + 1 >= max_months {
            Some(TerminationReason::MaxYearsReached)
        } else {
            None
        }
    }

    fn close_tax_year(&mut self, month: YearMonth) -> Result<(), SimulationError> {
        let filing_status = self.filing_status();
        let (closed, income) = self.state.roll_year(month.year);
        let summary = self
            .engine
            .collaborators
            .taxes
            .summarize(closed, &income, filing_status)
            .map_err(SimulationError::calculation(month))?;
        self.yearly_taxes.push(summary);
        Ok(())
    }

    /// The year in progress at termination is summarized as a partial year
    fn close_final_tax_year(&mut self) -> Result<(), SimulationError> {
        let month = self.state.month();
        let income = self.state.taxable_income_ytd();
        let summary = self
            .engine
            .collaborators
            .taxes
            .summarize(month.year, &income, self.filing_status())
            .map_err(SimulationError::calculation(month))?;
        self.yearly_taxes.push(summary);
        Ok(())
    }

    fn fire_events(&mut self, month: YearMonth) -> Result<(), SimulationError> {
        let ages: Vec<(PersonId, Option<f64>)> = self
            .members()
            .iter()
            .map(|p| {
                let age = (!self.state.is_deceased(p.person_id))
                    .then(|| fractional_age(p.birth_date, month));
                (p.person_id, age)
            })
            .collect();
        let primary_age = ages.iter().find_map(|(_, age)| *age);
        let age_of = |person: Option<PersonId>| match person {
            Some(id) => ages.iter().find(|(p, _)| *p == id).and_then(|(_, a)| *a),
            None => primary_age,
        };

        let fired = self.registry.poll(month, &mut self.rng, &age_of);
        for event in fired {
            debug!(month = %month, event = %event.name, kind = ?event.kind, "life event fired");
            self.handle_event(month, &event)?;
            self.fired_events.push(event);
        }
        Ok(())
    }

    fn handle_event(
        &mut self,
        month: YearMonth,
        event: &FiredEvent,
    ) -> Result<(), SimulationError> {
        let person = event.person.or_else(|| self.primary().map(|p| p.person_id));
        match event.kind {
            EventKind::RetirementStart
            | EventKind::WithdrawalStart
            | EventKind::SocialSecurityStart => {}
            EventKind::RmdStart => {
                if let Some(id) = person {
                    self.state.flags.rmd_started.insert(id);
                }
            }
            EventKind::MortgagePayoff { category } => {
                self.state.flags.paid_off.insert(category);
            }
            EventKind::SpendingPhaseTransition { phase } => {
                self.state.flags.spending_phase = phase;
            }
            EventKind::LongTermCareOnset { monthly_cost } => {
                if let Some(id) = person {
                    self.state.flags.long_term_care.insert(id, monthly_cost);
                }
            }
            EventKind::Death => {
                if let Some(id) = event.person {
                    self.handle_death(month, id);
                }
            }
            EventKind::Contingency { category, amount } => {
                let cost = amount * self.state.inflation_factor();
                let uncovered = self.state.draw_reserve(category, cost);
                if uncovered > 0.0 {
                    let view = self.state.snapshot();
                    let plan = self.orchestrator().cover(&view, uncovered, "contingency");
                    self.state
                        .apply(plan)
                        .map_err(SimulationError::state(month))?;
                }
            }
        }
        Ok(())
    }

    fn handle_death(&mut self, month: YearMonth, deceased: PersonId) {
        self.state.flags.deceased.insert(deceased, month);
        self.state.flags.long_term_care.remove(&deceased);

        let survivor = self
            .config()
            .household
            .partner_of(deceased)
            .filter(|p| !self.state.is_deceased(p.person_id))
            .map(|p| (p.person_id, p.age_in(month)));
        let Some((survivor, survivor_age)) = survivor else {
            return;
        };

        let transition =
            apply_survivor_transition(&mut self.state, deceased, survivor, survivor_age, month);
        debug!(
            month = %month,
            deceased = deceased.0,
            survivor = survivor.0,
            accounts = transition.transferred_accounts.len(),
            social_security = transition.survivor_social_security_after,
            "survivor transition"
        );
        self.survivor_transitions.push(transition);
    }

    fn orchestrator(&self) -> SpendingOrchestrator<'_> {
        SpendingOrchestrator::new(
            &self.engine.config.sequencer,
            self.engine.collaborators.distributions.as_ref(),
        )
    }

    fn expenses(&self, month: YearMonth) -> Result<MonthlyExpenses, SimulationError> {
        let flags = self.state.flags();
        let oldest_age = self
            .members()
            .iter()
            .filter(|p| !self.state.is_deceased(p.person_id))
            .map(|p| p.age_in(month))
            .max()
            .unwrap_or(0);
        let expense_flags = ExpenseFlags {
            spending_phase: flags.spending_phase,
            survivor_mode: flags.survivor_mode,
            oldest_age,
            long_term_care: flags.long_term_care.values().sum(),
            paid_off: flags.paid_off.clone(),
            inflation_factor: self.state.inflation_factor(),
        };
        self.engine
            .collaborators
            .expenses
            .monthly_expenses(&self.config().budget, month, &expense_flags)
            .map_err(SimulationError::calculation(month))
    }

    /// Living members whose minimum distributions have started
    fn rmd_owners(&self, month: YearMonth) -> Vec<OwnerInfo> {
        self.members()
            .iter()
            .filter(|p| {
                !self.state.is_deceased(p.person_id)
                    && self.state.flags().rmd_started.contains(&p.person_id)
            })
            .map(|p| OwnerInfo {
                person_id: p.person_id,
                age: p.age_in(month),
                birth_year: p.birth_year(),
            })
            .collect()
    }

    /// Someone still works. Minimums owed by retired owners come out first
    /// and a deficit is drawn from the portfolio; a surplus refills reserves
    /// then goes to accounts.
    fn accumulate(
        &mut self,
        month: YearMonth,
        income: &MonthlyIncome,
        expenses: &MonthlyExpenses,
    ) -> Result<Spending, SimulationError> {
        let surplus = income.total() - expenses.total();
        let owners = self.rmd_owners(month);
        let mut spending = Spending::default();

        if surplus < 0.0 || !owners.is_empty() {
            let view = self.state.snapshot();
            let plan = self
                .orchestrator()
                .cover_with_minimums(&view, &owners, month.year, -surplus, "deficit")
                .map_err(SimulationError::calculation(month))?;
            if plan.target_withdrawal > 0.0 || plan.metadata.rmd_required > 0.0 {
                let excess = plan.metadata.rmd_excess.min(plan.adjusted_withdrawal);
                let summary = self
                    .state
                    .apply(plan)
                    .map_err(SimulationError::state(month))?;
                self.report_shortfall(month, &summary);
                spending.rmd_excess_distributed = self.dispose_excess(month, excess)?;
                spending.plan = Some(summary);
            }
        }
        if surplus <= 0.0 {
            return Ok(spending);
        }

        spending.reserve_refill = self.state.refill_reserves(surplus);
        let contributable = surplus - spending.reserve_refill;
        if contributable > 0.0 {
            let view = self.state.snapshot();
            let living: Vec<PersonStatus> = self
                .statuses(month)
                .into_iter()
                .filter(PersonStatus::is_alive)
                .collect();
            let request = ContributionRequest {
                amount: contributable,
                view: &view,
                plan: &self.engine.config.contributions,
                year: month.year,
                statuses: &living,
                prior_income: self.state.prior_year_income(),
            };
            let allocations = self
                .engine
                .collaborators
                .contributions
                .route(&request)
                .map_err(SimulationError::calculation(month))?;
            for allocation in allocations {
                self.state
                    .deposit(allocation.account_id, allocation.amount)
                    .map_err(SimulationError::state(month))?;
            }
        }

        Ok(spending)
    }

    /// Everyone living is retired: ask the strategy, execute the plan and
    /// dispose of any forced minimum beyond the target.
    fn draw(
        &mut self,
        month: YearMonth,
        income: &MonthlyIncome,
        expenses: &MonthlyExpenses,
        withdrawals_active: bool,
    ) -> Result<Spending, SimulationError> {
        let Some(primary) = self.primary() else {
            return Ok(Spending::default());
        };
        let (age, birth_year) = (primary.age_in(month), primary.birth_year());
        let retirement_start = self
            .members()
            .iter()
            .map(Person::withdrawal_start)
            .min()
            .unwrap_or(self.config().start);
        let owners = self.rmd_owners(month);

        let view = self.state.snapshot();
        let ctx = SpendingContext {
            view: &view,
            date: month,
            total_expenses: expenses.total(),
            other_income: income.total(),
            age,
            birth_year,
            retirement_start,
            filing_status: self.filing_status(),
            taxable_income: self.state.taxable_income_ytd(),
            params: &self.engine.config.strategy_params,
            withdrawals_active,
        };
        let (plan, decision) = self
            .orchestrator()
            .plan(&ctx, self.engine.policy.as_ref(), &owners)
            .map_err(SimulationError::calculation(month))?;

        let excess = plan.metadata.rmd_excess.min(plan.adjusted_withdrawal);
        let summary = self
            .state
            .apply(plan)
            .map_err(SimulationError::state(month))?;
        if withdrawals_active {
            self.state.record_spending(&decision);
        }
        self.report_shortfall(month, &summary);

        let rmd_excess_distributed = self.dispose_excess(month, excess)?;

        let surplus = income.total() - expenses.total();
        let reserve_refill = if surplus > 0.0 {
            self.state.refill_reserves(surplus)
        } else {
            0.0
        };

        Ok(Spending {
            plan: Some(summary),
            rmd_excess_distributed,
            reserve_refill,
        })
    }

    /// Reinvest or pay out a forced minimum beyond the need. Returns the
    /// amount paid out.
    fn dispose_excess(&mut self, month: YearMonth, excess: f64) -> Result<f64, SimulationError> {
        if excess <= 0.0 {
            return Ok(0.0);
        }
        match self.engine.config.rmd_excess {
            RmdExcessDisposition::Reinvest { account } => {
                self.state
                    .reinvest(account, excess)
                    .map_err(SimulationError::state(month))?;
                Ok(0.0)
            }
            RmdExcessDisposition::Distribute => {
                self.state.record_distributed_excess(excess);
                Ok(excess)
            }
        }
    }

    fn report_shortfall(&mut self, month: YearMonth, summary: &PlanSummary) {
        if !summary.meets_target && !self.shortfall_reported {
            self.shortfall_reported = true;
            warn!(
                month = %month,
                shortfall = summary.shortfall,
                target = summary.target_withdrawal,
                "withdrawal plan fell short of its target"
            );
        }
    }
}
