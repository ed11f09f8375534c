use crate::error::{CalcResult, CalculationError};

use super::ReturnCalculator;

/// Geometric monthly compounding: `(1 + annual)^(1/12)` per month
#[derive(Debug, Clone, Copy, Default)]
pub struct CompoundReturns;

impl ReturnCalculator for CompoundReturns {
    fn monthly_factor(&self, annual_rate: f64) -> f64 {
        // A year losing everything (or more) wipes the balance out
        if annual_rate <= -1.0 {
            return 0.0;
        }
        (1.0 + annual_rate).powf(1.0 / 12.0)
    }

    fn grow(&self, balance: f64, annual_rate: f64) -> CalcResult<f64> {
        let grown = balance * self.monthly_factor(annual_rate);
        if !grown.is_finite() {
            return Err(CalculationError::NonFinite { what: "return" });
        }
        Ok(grown.max(0.0))
    }
}
