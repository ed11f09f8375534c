//! Spending strategies: how much to withdraw each month
//!
//! A strategy only sees a [`SpendingContext`] built fresh every month around
//! an immutable [`SimulationView`]. It holds no state of its own, so one
//! instance is shared by every Monte Carlo run. Anything a strategy needs to
//! remember between months (the previous target, the last ratchet) is read
//! back from the view.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::date_math::YearMonth;
use crate::error::ConfigError;
use crate::model::{FilingStatus, GuardrailAction, SpendingDecision, TaxableIncome};
use crate::simulation_state::SimulationView;

/// Run-wide inputs strategies may read
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StrategyParams {
    /// Expected annual inflation used to index spending
    pub inflation_rate: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            inflation_rate: 0.0,
        }
    }
}

/// Everything a strategy may look at for one month
#[derive(Debug, Clone, Copy)]
pub struct SpendingContext<'a> {
    pub view: &'a SimulationView,
    pub date: YearMonth,
    /// Household expenses this month
    pub total_expenses: f64,
    /// Income this month other than portfolio withdrawals
    pub other_income: f64,
    pub age: u8,
    pub birth_year: i16,
    /// First month of household withdrawals
    pub retirement_start: YearMonth,
    pub filing_status: FilingStatus,
    pub taxable_income: TaxableIncome,
    pub params: &'a StrategyParams,
    /// False while retired but before withdrawals start
    pub withdrawals_active: bool,
}

/// Decides this month's withdrawal target. Implement for custom or mock strategies.
pub trait SpendingPolicy: std::fmt::Debug + Send + Sync {
    fn decide(&self, ctx: &SpendingContext<'_>) -> SpendingDecision;
}

/// Parameters of a guardrail (dynamic spending) strategy. Rates are annual.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GuardrailParams {
    /// Withdrawal rate at the first decision
    pub initial_rate: f64,
    /// Cut when the current rate exceeds `initial_rate * (1 + upper_threshold)`
    pub upper_threshold: f64,
    /// Raise when the current rate falls below `initial_rate * (1 - lower_threshold)`
    pub lower_threshold: f64,
    /// Fractional size of a cut or raise
    pub adjustment: f64,
    /// Absolute annual spending floor
    #[serde(default)]
    pub floor: Option<f64>,
    /// Absolute annual spending ceiling
    #[serde(default)]
    pub ceiling: Option<f64>,
    pub allow_cuts: bool,
    pub min_years_between_increases: u32,
}

impl GuardrailParams {
    /// Guyton-Klinger decision rules: 20% bands, 10% adjustments
    #[must_use]
    pub fn guyton_klinger() -> Self {
        Self {
            initial_rate: 0.05,
            upper_threshold: 0.20,
            lower_threshold: 0.20,
            adjustment: 0.10,
            floor: None,
            ceiling: None,
            allow_cuts: true,
            min_years_between_increases: 1,
        }
    }

    /// Vanguard dynamic spending: narrow bands, small yearly moves
    #[must_use]
    pub fn vanguard() -> Self {
        Self {
            initial_rate: 0.04,
            upper_threshold: 0.05,
            lower_threshold: 0.05,
            adjustment: 0.025,
            floor: None,
            ceiling: None,
            allow_cuts: true,
            min_years_between_increases: 1,
        }
    }

    /// Kitces ratcheting: never cut, raise 10% once the portfolio has grown
    /// half again over its starting value, at most every three years
    #[must_use]
    pub fn kitces() -> Self {
        Self {
            initial_rate: 0.04,
            upper_threshold: 1.0,
            lower_threshold: 1.0 / 3.0,
            adjustment: 0.10,
            floor: None,
            ceiling: None,
            allow_cuts: false,
            min_years_between_increases: 3,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let bad = |msg: &str| Err(ConfigError::InvalidStrategy(msg.to_string()));
        if !(self.initial_rate > 0.0 && self.initial_rate <= 1.0) {
            return bad("guardrail initial_rate must be in (0, 1]");
        }
        if self.upper_threshold.is_nan() || self.upper_threshold < 0.0 {
            return bad("guardrail upper_threshold must be non-negative");
        }
        if !(0.0..=1.0).contains(&self.lower_threshold) {
            return bad("guardrail lower_threshold must be in [0, 1]");
        }
        if !(0.0..1.0).contains(&self.adjustment) {
            return bad("guardrail adjustment must be in [0, 1)");
        }
        if let (Some(floor), Some(ceiling)) = (self.floor, self.ceiling) {
            if floor > ceiling {
                return bad("guardrail floor exceeds ceiling");
            }
        }
        Ok(())
    }
}

/// The built-in spending strategies
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum SpendingStrategy {
    /// Fixed real withdrawal rate against the initial balance
    Static { rate: f64 },
    /// Withdraw exactly what income does not cover
    IncomeGap {
        #[serde(default)]
        tax_rate: Option<f64>,
    },
    Guardrails(GuardrailParams),
}

impl Default for SpendingStrategy {
    fn default() -> Self {
        SpendingStrategy::Static { rate: 0.04 }
    }
}

impl SpendingStrategy {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SpendingStrategy::Static { .. } => "static",
            SpendingStrategy::IncomeGap { .. } => "income_gap",
            SpendingStrategy::Guardrails(_) => "guardrails",
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            SpendingStrategy::Static { rate } if !(0.0..=1.0).contains(&rate) => Err(
                ConfigError::InvalidStrategy(format!("static rate {rate} outside [0, 1]")),
            ),
            SpendingStrategy::IncomeGap {
                tax_rate: Some(rate),
            } if !(0.0..1.0).contains(&rate) => Err(ConfigError::InvalidStrategy(format!(
                "income gap tax rate {rate} outside [0, 1)"
            ))),
            SpendingStrategy::Guardrails(params) => params.validate(),
            _ => Ok(()),
        }
    }

    fn static_target(rate: f64, ctx: &SpendingContext<'_>) -> f64 {
        let months = ctx.retirement_start.months_until(ctx.date).max(0);
        let years = f64::from(months) / 12.0;
        ctx.view.initial_balance * rate / 12.0 * (1.0 + ctx.params.inflation_rate).powf(years)
    }

    fn income_gap_target(tax_rate: Option<f64>, ctx: &SpendingContext<'_>) -> f64 {
        let gap = (ctx.total_expenses - ctx.other_income).max(0.0);
        match tax_rate {
            Some(t) if t < 1.0 => gap / (1.0 - t),
            _ => gap,
        }
    }

    fn guardrail_decision(p: &GuardrailParams, ctx: &SpendingContext<'_>) -> SpendingDecision {
        let view = ctx.view;
        let name = "guardrails";

        let Some(previous) = view.previous_monthly_target else {
            let target = view.total_balance * p.initial_rate / 12.0;
            return SpendingDecision::new(target, name).with_guardrail(GuardrailAction::Hold);
        };
        if !ctx.date.is_year_start() {
            return SpendingDecision::new(previous, name).with_guardrail(GuardrailAction::Hold);
        }

        // Annual review
        let mut annual = previous * 12.0;
        let mut action = GuardrailAction::Hold;
        if view.prior_year_return.is_some_and(|r| r < 0.0) {
            action = GuardrailAction::SkipInflation;
        } else {
            annual *= 1.0 + ctx.params.inflation_rate;
        }

        let rate = if view.total_balance > 0.0 {
            annual / view.total_balance
        } else {
            f64::INFINITY
        };
        let upper = p.initial_rate * (1.0 + p.upper_threshold);
        let lower = p.initial_rate * (1.0 - p.lower_threshold);
        let raise_allowed = view.last_ratchet_month.is_none_or(|last| {
            last.months_until(ctx.date) >= p.min_years_between_increases as i32 * 12
        });

        if p.allow_cuts && rate > upper {
            annual *= 1.0 - p.adjustment;
            action = GuardrailAction::Cut;
            debug!(month = %ctx.date, rate, upper, "guardrail cut");
        } else if rate < lower && raise_allowed {
            annual *= 1.0 + p.adjustment;
            action = GuardrailAction::Raise;
            debug!(month = %ctx.date, rate, lower, "guardrail ratchet");
        }

        if let Some(floor) = p.floor.filter(|f| annual < *f) {
            annual = floor;
            action = GuardrailAction::Floor;
        }
        if let Some(ceiling) = p.ceiling.filter(|c| annual > *c) {
            annual = ceiling;
            action = GuardrailAction::Ceiling;
        }

        SpendingDecision::new(annual / 12.0, name).with_guardrail(action)
    }
}

impl SpendingPolicy for SpendingStrategy {
    fn decide(&self, ctx: &SpendingContext<'_>) -> SpendingDecision {
        if !ctx.withdrawals_active {
            return SpendingDecision::new(0.0, self.name());
        }
        match *self {
            SpendingStrategy::Static { rate } => {
                SpendingDecision::new(Self::static_target(rate, ctx), self.name())
            }
            SpendingStrategy::IncomeGap { tax_rate } => {
                SpendingDecision::new(Self::income_gap_target(tax_rate, ctx), self.name())
            }
            SpendingStrategy::Guardrails(ref params) => Self::guardrail_decision(params, ctx),
        }
    }
}
