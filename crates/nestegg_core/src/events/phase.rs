use crate::date_math::YearMonth;
use crate::model::{LifePhase, PersonId};

impl LifePhase {
    /// Phase of one person in `month`; `None` once deceased
    #[must_use]
    pub fn derive(
        month: YearMonth,
        retirement: YearMonth,
        withdrawal_start: YearMonth,
        deceased: bool,
    ) -> Option<LifePhase> {
        if deceased {
            None
        } else if month < retirement {
            Some(LifePhase::Accumulation)
        } else if month < withdrawal_start {
            Some(LifePhase::Transition)
        } else {
            Some(LifePhase::Distribution)
        }
    }
}

/// What the household as a whole does this month
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HouseholdMode {
    /// Someone is still working: surplus is contributed
    Accumulating,
    /// Everyone living is retired. Strategy withdrawals run only once someone
    /// has reached distribution; minimum distributions apply either way.
    Drawing { withdrawals_active: bool },
    AllDeceased,
}

impl HouseholdMode {
    #[must_use]
    pub fn from_phases(phases: &[(PersonId, Option<LifePhase>)]) -> Self {
        let living = || phases.iter().filter_map(|(_, p)| *p);
        if living().next().is_none() {
            HouseholdMode::AllDeceased
        } else if living().any(|p| p == LifePhase::Accumulation) {
            HouseholdMode::Accumulating
        } else {
            HouseholdMode::Drawing {
                withdrawals_active: living().any(|p| p == LifePhase::Distribution),
            }
        }
    }

    #[must_use]
    pub fn is_accumulating(self) -> bool {
        self == HouseholdMode::Accumulating
    }
}
