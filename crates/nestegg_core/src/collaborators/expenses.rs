use crate::date_math::YearMonth;
use crate::error::{CalcResult, CalculationError};
use crate::model::{ExpenseBudget, ExpenseFlags, ExpenseKind, MonthlyExpenses};

use super::ExpenseCalculator;

/// Applies inflation, the spending curve, healthcare aging, the survivor
/// factor and paid-off categories to the configured budget.
#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetExpenses;

impl ExpenseCalculator for BudgetExpenses {
    fn monthly_expenses(
        &self,
        budget: &ExpenseBudget,
        month: YearMonth,
        flags: &ExpenseFlags,
    ) -> CalcResult<MonthlyExpenses> {
        let mut out = MonthlyExpenses::default();
        let survivor = if flags.survivor_mode {
            budget.survivor_factor
        } else {
            1.0
        };
        let healthcare_years =
            f64::from(flags.oldest_age.saturating_sub(budget.healthcare_start_age));
        let healthcare_growth = (1.0 + budget.healthcare_growth).powf(healthcare_years);

        for category in &budget.categories {
            if !category.is_active(month) || flags.paid_off.contains(&category.category_id) {
                continue;
            }
            let mut amount = category.monthly_amount;
            if category.inflation_adjusted {
                amount *= flags.inflation_factor;
            }

            match category.kind {
                ExpenseKind::Essential => out.essential += amount * survivor,
                ExpenseKind::Discretionary => {
                    out.discretionary +=
                        amount * survivor * budget.spending_curve.multiplier(flags.spending_phase);
                }
                ExpenseKind::Healthcare => out.healthcare += amount * survivor * healthcare_growth,
                // Housing costs do not shrink with household size
                ExpenseKind::Housing => out.housing += amount,
            }
        }

        out.long_term_care = flags.long_term_care * flags.inflation_factor;

        if !out.total().is_finite() {
            return Err(CalculationError::NonFinite { what: "expenses" });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::model::{CategoryId, ExpenseCategory, SpendingPhase};

    fn category(id: u16, kind: ExpenseKind, amount: f64) -> ExpenseCategory {
        ExpenseCategory {
            category_id: CategoryId(id),
            name: format!("cat{id}"),
            kind,
            monthly_amount: amount,
            start: None,
            end: None,
            inflation_adjusted: true,
        }
    }

    fn flags() -> ExpenseFlags {
        ExpenseFlags {
            spending_phase: SpendingPhase::GoGo,
            survivor_mode: false,
            oldest_age: 60,
            long_term_care: 0.0,
            paid_off: BTreeSet::new(),
            inflation_factor: 1.0,
        }
    }

    fn budget() -> ExpenseBudget {
        ExpenseBudget {
            categories: vec![
                category(1, ExpenseKind::Essential, 3_000.0),
                category(2, ExpenseKind::Discretionary, 1_000.0),
                category(3, ExpenseKind::Healthcare, 500.0),
                ExpenseCategory {
                    inflation_adjusted: false,
                    ..category(4, ExpenseKind::Housing, 2_000.0)
                },
            ],
            ..ExpenseBudget::default()
        }
    }

    #[test]
    fn test_base_budget() {
        let month = YearMonth::new(2030, 1);
        let e = BudgetExpenses
            .monthly_expenses(&budget(), month, &flags())
            .unwrap();
        assert_eq!(e.total(), 6_500.0);
    }

    #[test]
    fn test_modifiers() {
        let month = YearMonth::new(2030, 1);
        let mut f = flags();
        f.inflation_factor = 1.1;
        f.spending_phase = SpendingPhase::SlowGo;
        f.oldest_age = 67;
        f.paid_off.insert(CategoryId(4));
        let e = BudgetExpenses.monthly_expenses(&budget(), month, &f).unwrap();

        assert!((e.essential - 3_300.0).abs() < 1e-9);
        assert!((e.discretionary - 1_100.0 * 0.85).abs() < 1e-9);
        assert!((e.healthcare - 550.0 * 1.02_f64.powi(2)).abs() < 1e-9);
        assert_eq!(e.housing, 0.0, "paid-off housing drops out");
    }

    #[test]
    fn test_survivor_factor_spares_housing() {
        let month = YearMonth::new(2030, 1);
        let mut f = flags();
        f.survivor_mode = true;
        f.long_term_care = 4_000.0;
        let e = BudgetExpenses.monthly_expenses(&budget(), month, &f).unwrap();

        assert!((e.essential - 2_250.0).abs() < 1e-9);
        assert_eq!(e.housing, 2_000.0);
        assert_eq!(e.long_term_care, 4_000.0);
    }
}
