//! Life events - triggers and kinds
//!
//! An event pairs a trigger (a fixed month, or a monthly random draw against a
//! probability model) with a kind that says how it mutates simulation state.
//! Every event fires at most once per run.

use serde::{Deserialize, Serialize};

use super::expenses::SpendingPhase;
use super::ids::{CategoryId, EventId, PersonId};
use crate::date_math::YearMonth;
use crate::error::ConfigError;

/// Annual probability of an event as a function of age
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ProbabilityModel {
    /// Same probability every year
    Fixed { annual: f64 },
    /// Gompertz mortality law parameterised by modal age at death and dispersion (years)
    Gompertz { modal_age: f64, dispersion: f64 },
    /// Explicit annual rates starting at `start_age`; the last rate applies to older ages
    Table { start_age: u8, annual_rates: Vec<f64> },
}

impl ProbabilityModel {
    /// Gompertz fit to US period life tables
    #[must_use]
    pub fn us_mortality() -> Self {
        ProbabilityModel::Gompertz {
            modal_age: 88.0,
            dispersion: 10.0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_unit = |p: f64| (0.0..=1.0).contains(&p);
        match self {
            ProbabilityModel::Fixed { annual } if !in_unit(*annual) => {
                Err(ConfigError::InvalidProbability(format!(
                    "annual probability {annual} outside [0, 1]"
                )))
            }
            ProbabilityModel::Gompertz { dispersion, .. } if *dispersion <= 0.0 => Err(
                ConfigError::InvalidProbability("gompertz dispersion must be positive".into()),
            ),
            ProbabilityModel::Table { annual_rates, .. } if annual_rates.is_empty() => Err(
                ConfigError::InvalidProbability("probability table is empty".into()),
            ),
            ProbabilityModel::Table { annual_rates, .. }
                if annual_rates.iter().any(|p| !in_unit(*p)) =>
            {
                Err(ConfigError::InvalidProbability(
                    "probability table rate outside [0, 1]".into(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Probability of the event within the year starting at `age`
    #[must_use]
    pub fn annual_probability(&self, age: f64) -> f64 {
        match self {
            ProbabilityModel::Fixed { annual } => *annual,
            ProbabilityModel::Gompertz {
                modal_age,
                dispersion,
            } => {
                let survival =
                    (((age - modal_age) / dispersion).exp() * (1.0 - (1.0 / dispersion).exp()))
                        .exp();
                (1.0 - survival).clamp(0.0, 1.0)
            }
            ProbabilityModel::Table {
                start_age,
                annual_rates,
            } => {
                let offset = age.floor() - f64::from(*start_age);
                if offset < 0.0 {
                    return 0.0;
                }
                let index = (offset as usize).min(annual_rates.len().saturating_sub(1));
                annual_rates.get(index).copied().unwrap_or(0.0)
            }
        }
    }

    /// Probability within a single month, assuming a constant hazard over the year
    #[must_use]
    pub fn monthly_probability(&self, age: f64) -> f64 {
        let annual = self.annual_probability(age).clamp(0.0, 1.0);
        1.0 - (1.0 - annual).powf(1.0 / 12.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EventTrigger {
    /// Fires in exactly this month
    Scheduled { month: YearMonth },
    /// Evaluated every month with a seeded draw; `not_before` delays eligibility
    Probabilistic {
        model: ProbabilityModel,
        #[serde(default)]
        not_before: Option<YearMonth>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EventKind {
    RetirementStart,
    WithdrawalStart,
    SocialSecurityStart,
    RmdStart,
    /// Ends the housing payment of `category`
    MortgagePayoff { category: CategoryId },
    SpendingPhaseTransition { phase: SpendingPhase },
    Death,
    /// Starts a recurring monthly care cost (start-of-simulation dollars)
    LongTermCareOnset { monthly_cost: f64 },
    /// One-off expense paid from the category reserve, then from the portfolio
    Contingency { category: CategoryId, amount: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LifeEvent {
    pub event_id: EventId,
    pub name: String,
    /// The person the event concerns; its age drives probabilistic draws
    #[serde(default)]
    pub person: Option<PersonId>,
    pub kind: EventKind,
    pub trigger: EventTrigger,
}

/// Record of an event that fired during a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FiredEvent {
    pub event_id: EventId,
    pub name: String,
    pub person: Option<PersonId>,
    pub kind: EventKind,
    pub month: YearMonth,
}
