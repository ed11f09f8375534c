//! Income sources and the monthly income breakdown

use serde::{Deserialize, Serialize};

use super::ids::PersonId;
use crate::date_math::YearMonth;

/// Payment form of a defined-benefit pension; decides what the survivor keeps
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum PensionForm {
    /// Payments stop at the owner's death
    #[default]
    SingleLife,
    JointSurvivor50,
    JointSurvivor75,
    JointSurvivor100,
}

impl PensionForm {
    /// Fraction of the benefit that continues to the survivor
    #[must_use]
    pub fn continuation(self) -> f64 {
        match self {
            PensionForm::SingleLife => 0.0,
            PensionForm::JointSurvivor50 => 0.5,
            PensionForm::JointSurvivor75 => 0.75,
            PensionForm::JointSurvivor100 => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum IncomeKind {
    /// Paid only while the owner is accumulating
    Salary,
    SocialSecurity,
    Pension { form: PensionForm },
    Annuity,
    Other,
}

impl IncomeKind {
    /// Whether the amount counts as ordinary taxable income
    #[must_use]
    pub fn is_fully_taxable(self) -> bool {
        !matches!(self, IncomeKind::SocialSecurity)
    }
}

/// A stream of monthly income owned by one person
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncomeSource {
    pub name: String,
    pub owner: PersonId,
    pub kind: IncomeKind,
    /// Monthly amount in start-of-simulation dollars
    pub monthly_amount: f64,
    /// First paying month. `None` pays from the simulation start.
    #[serde(default)]
    pub start: Option<YearMonth>,
    /// Last paying month (inclusive)
    #[serde(default)]
    pub end: Option<YearMonth>,
    /// Annual cost-of-living adjustment applied from the simulation start
    #[serde(default)]
    pub cola: f64,
}

impl IncomeSource {
    #[must_use]
    pub fn is_active(&self, month: YearMonth) -> bool {
        self.start.is_none_or(|s| month >= s) && self.end.is_none_or(|e| month <= e)
    }
}

/// One month of household income, split by kind
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct MonthlyIncome {
    pub salary: f64,
    pub social_security: f64,
    pub pension: f64,
    pub annuity: f64,
    pub other: f64,
}

impl MonthlyIncome {
    #[must_use]
    pub fn total(&self) -> f64 {
        self.salary + self.social_security + self.pension + self.annuity + self.other
    }

    /// Income outside salary, which strategies treat as offsetting expenses
    #[must_use]
    pub fn non_salary(&self) -> f64 {
        self.social_security + self.pension + self.annuity + self.other
    }

    pub fn add(&mut self, kind: IncomeKind, amount: f64) {
        match kind {
            IncomeKind::Salary => self.salary += amount,
            IncomeKind::SocialSecurity => self.social_security += amount,
            IncomeKind::Pension { .. } => self.pension += amount,
            IncomeKind::Annuity => self.annuity += amount,
            IncomeKind::Other => self.other += amount,
        }
    }
}
