use crate::date_math::YearMonth;
use crate::error::{CalcResult, CalculationError};
use crate::model::{
    Household, IncomeKind, IncomeSource, LifePhase, MonthlyIncome, PersonId, PersonStatus,
};

use super::IncomeProcessor;

/// Pays every active source whose owner is alive.
///
/// Salary stops once the owner leaves accumulation. Amounts grow by the
/// source's COLA once per elapsed year.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardIncome;

fn status_of(statuses: &[PersonStatus], person_id: PersonId) -> Option<&PersonStatus> {
    statuses.iter().find(|s| s.person_id == person_id)
}

impl IncomeProcessor for StandardIncome {
    fn monthly_income(
        &self,
        _household: &Household,
        sources: &[IncomeSource],
        month: YearMonth,
        statuses: &[PersonStatus],
        elapsed_months: u32,
    ) -> CalcResult<MonthlyIncome> {
        let years = f64::from(elapsed_months / 12);
        let mut income = MonthlyIncome::default();

        for source in sources.iter().filter(|s| s.is_active(month)) {
            let Some(phase) = status_of(statuses, source.owner).and_then(|s| s.phase) else {
                continue;
            };
            if matches!(source.kind, IncomeKind::Salary) && phase != LifePhase::Accumulation {
                continue;
            }

            let amount = source.monthly_amount * (1.0 + source.cola).powf(years);
            if !amount.is_finite() {
                return Err(CalculationError::NonFinite { what: "income" });
            }
            income.add(source.kind, amount.max(0.0));
        }

        Ok(income)
    }
}
