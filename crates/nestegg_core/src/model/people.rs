//! Household members and their per-month status

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use super::events::ProbabilityModel;
use super::ids::PersonId;
use crate::date_math::{YearMonth, age_in_month};

/// Tax filing status of the household
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum FilingStatus {
    #[default]
    Single,
    MarriedFilingJointly,
}

/// A household member
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Person {
    pub person_id: PersonId,
    pub name: String,
    pub birth_date: Date,
    /// First month without salary
    pub retirement: YearMonth,
    /// First month portfolio withdrawals may start. Defaults to `retirement`.
    #[serde(default)]
    pub withdrawal_start: Option<YearMonth>,
    /// Probability model for death. `None` means the person outlives the plan.
    #[serde(default)]
    pub mortality: Option<ProbabilityModel>,
}

impl Person {
    #[must_use]
    pub fn withdrawal_start(&self) -> YearMonth {
        self.withdrawal_start.unwrap_or(self.retirement)
    }

    #[must_use]
    pub fn age_in(&self, month: YearMonth) -> u8 {
        age_in_month(self.birth_date, month)
    }

    #[must_use]
    pub fn birth_year(&self) -> i16 {
        self.birth_date.year()
    }
}

/// The one or two people whose finances are simulated together
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Household {
    pub members: Vec<Person>,
    #[serde(default)]
    pub filing_status: FilingStatus,
}

impl Household {
    #[must_use]
    pub fn single(person: Person) -> Self {
        Self {
            members: vec![person],
            filing_status: FilingStatus::Single,
        }
    }

    #[must_use]
    pub fn couple(first: Person, second: Person) -> Self {
        Self {
            members: vec![first, second],
            filing_status: FilingStatus::MarriedFilingJointly,
        }
    }

    #[must_use]
    pub fn person(&self, person_id: PersonId) -> Option<&Person> {
        self.members.iter().find(|p| p.person_id == person_id)
    }

    /// The other member of a couple
    #[must_use]
    pub fn partner_of(&self, person_id: PersonId) -> Option<&Person> {
        self.members.iter().find(|p| p.person_id != person_id)
    }

    #[must_use]
    pub fn is_couple(&self) -> bool {
        self.members.len() == 2
    }
}

/// Per-person lifecycle phase. Recomputed every month, never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifePhase {
    /// Working and contributing
    Accumulation,
    /// Retired, portfolio withdrawals not yet started
    Transition,
    /// Drawing down the portfolio
    Distribution,
}

/// Everything the collaborators need to know about a person for one month
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PersonStatus {
    pub person_id: PersonId,
    /// `None` once deceased
    pub phase: Option<LifePhase>,
    pub age: u8,
    pub rmd_active: bool,
    pub long_term_care: bool,
}

impl PersonStatus {
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.phase.is_some()
    }
}
