use crate::error::{CalcResult, CalculationError};
use crate::model::{RmdTable, rmd_start_age};

use super::MinimumDistributionCalculator;

/// Monthly share of the annual required distribution from the IRS Uniform
/// Lifetime table: `balance / divisor / 12`.
#[derive(Debug, Clone, Default)]
pub struct UniformLifetimeRmd {
    pub table: RmdTable,
}

impl MinimumDistributionCalculator for UniformLifetimeRmd {
    fn required_distribution(
        &self,
        balance: f64,
        age: u8,
        birth_year: i16,
        _year: i16,
    ) -> CalcResult<f64> {
        if balance <= 0.0 || age < rmd_start_age(birth_year) {
            return Ok(0.0);
        }
        let divisor = self
            .table
            .divisor_for_age(age)
            .filter(|d| *d > 0.0)
            .ok_or(CalculationError::MissingTableEntry {
                table: "uniform lifetime",
                age,
            })?;
        Ok(balance / divisor / 12.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RmdTableEntry;

    #[test]
    fn test_monthly_rmd_amount() {
        let rmd = UniformLifetimeRmd::default();
        let monthly = rmd.required_distribution(265_000.0, 73, 1952, 2025).unwrap();
        assert!((monthly - 10_000.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_rmd_before_start_age() {
        let rmd = UniformLifetimeRmd::default();
        // Born 1960: RMDs start at 75
        assert_eq!(rmd.required_distribution(500_000.0, 73, 1960, 2033).unwrap(), 0.0);
        assert!(rmd.required_distribution(500_000.0, 75, 1960, 2035).unwrap() > 0.0);
    }

    #[test]
    fn test_malformed_table_is_an_error() {
        let rmd = UniformLifetimeRmd {
            table: RmdTable {
                entries: vec![RmdTableEntry {
                    age: 80,
                    divisor: 20.0,
                }],
            },
        };
        let err = rmd.required_distribution(100_000.0, 73, 1952, 2025);
        assert!(matches!(
            err,
            Err(CalculationError::MissingTableEntry { age: 73, .. })
        ));
    }
}
