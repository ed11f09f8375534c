//! Federal income tax with progressive brackets

use serde::{Deserialize, Serialize};

use crate::error::{CalcResult, CalculationError};
use crate::model::{FilingStatus, TaxBracket, TaxSummary, TaxableIncome};

use super::TaxCalculator;

/// Calculate federal income tax using progressive brackets
pub fn calculate_federal_tax(income: f64, brackets: &[TaxBracket]) -> f64 {
    if income <= 0.0 || brackets.is_empty() {
        return 0.0;
    }

    let mut tax = 0.0;
    for (i, bracket) in brackets.iter().enumerate() {
        if income <= bracket.threshold {
            break;
        }
        let next_threshold = brackets.get(i + 1).map_or(f64::INFINITY, |b| b.threshold);
        tax += (income.min(next_threshold) - bracket.threshold) * bracket.rate;
    }
    tax
}

/// Single-filer brackets and deduction; joint filers get both doubled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressiveTax {
    pub brackets: Vec<TaxBracket>,
    pub standard_deduction: f64,
    /// Share of Social Security benefits counted as ordinary income
    pub social_security_inclusion: f64,
}

impl ProgressiveTax {
    /// 2024 federal brackets for single filers
    #[must_use]
    pub fn federal_2024() -> Self {
        let brackets = [
            (0.0, 0.10),
            (11_600.0, 0.12),
            (47_150.0, 0.22),
            (100_525.0, 0.24),
            (191_950.0, 0.32),
            (243_725.0, 0.35),
            (609_350.0, 0.37),
        ]
        .into_iter()
        .map(|(threshold, rate)| TaxBracket { threshold, rate })
        .collect();
        Self {
            brackets,
            standard_deduction: 14_600.0,
            social_security_inclusion: 0.85,
        }
    }

    fn scaled_brackets(&self, factor: f64) -> Vec<TaxBracket> {
        self.brackets
            .iter()
            .map(|b| TaxBracket {
                threshold: b.threshold * factor,
                rate: b.rate,
            })
            .collect()
    }
}

impl Default for ProgressiveTax {
    fn default() -> Self {
        Self::federal_2024()
    }
}

impl TaxCalculator for ProgressiveTax {
    fn summarize(
        &self,
        year: i16,
        income: &TaxableIncome,
        filing_status: FilingStatus,
    ) -> CalcResult<TaxSummary> {
        let factor = match filing_status {
            FilingStatus::Single => 1.0,
            FilingStatus::MarriedFilingJointly => 2.0,
        };
        let taxable_social_security = income.social_security * self.social_security_inclusion;
        let gross = income.ordinary_total() + taxable_social_security;
        let taxable = (gross - self.standard_deduction * factor).max(0.0);
        let federal_tax = calculate_federal_tax(taxable, &self.scaled_brackets(factor));

        if !federal_tax.is_finite() {
            return Err(CalculationError::NonFinite { what: "federal tax" });
        }

        let total_income = income.ordinary_total() + income.social_security;
        Ok(TaxSummary {
            year,
            ordinary_income: income.ordinary_total(),
            taxable_social_security,
            federal_tax,
            effective_rate: if total_income > 0.0 {
                federal_tax / total_income
            } else {
                0.0
            },
        })
    }
}
