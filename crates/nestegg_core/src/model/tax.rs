//! Tax inputs and yearly tax summaries

use serde::{Deserialize, Serialize};

/// A progressive bracket: income above `threshold` taxed at `rate`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TaxBracket {
    pub threshold: f64,
    pub rate: f64,
}

/// Year-to-date income by tax character
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct TaxableIncome {
    /// Salary, pensions, annuities, other income
    pub ordinary: f64,
    pub social_security: f64,
    /// Withdrawals from tax-deferred accounts
    pub tax_deferred_withdrawals: f64,
    /// Withdrawals from taxable accounts (treated as return of basis)
    pub taxable_withdrawals: f64,
}

impl TaxableIncome {
    /// Income counted before the Social Security inclusion rule
    #[must_use]
    pub fn ordinary_total(&self) -> f64 {
        self.ordinary + self.tax_deferred_withdrawals
    }
}

/// Tax owed for one calendar year
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct TaxSummary {
    pub year: i16,
    pub ordinary_income: f64,
    pub taxable_social_security: f64,
    pub federal_tax: f64,
    pub effective_rate: f64,
}
