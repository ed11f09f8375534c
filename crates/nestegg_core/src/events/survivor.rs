//! First death in a couple: the survivor inherits accounts and income

use crate::date_math::YearMonth;
use crate::model::{IncomeKind, IncomeSource, PensionRewrite, PersonId, SurvivorTransition};
use crate::simulation_state::SimulationState;

/// Share of the deceased spouse's Social Security benefit a survivor may claim.
///
/// 71.5% at 60 rising linearly to 100% at full retirement age (67); nothing before 60.
#[must_use]
pub fn survivor_benefit_factor(age: u8) -> f64 {
    match age {
        0..=59 => 0.0,
        60..=66 => 0.715 + f64::from(age - 60) * (0.285 / 7.0),
        _ => 1.0,
    }
}

fn is_social_security(kind: &IncomeKind) -> bool {
    matches!(kind, IncomeKind::SocialSecurity)
}

/// Rewrite `state` for the survivor and return the one-time record.
///
/// Account balances never move: every account changes owner only.
pub(crate) fn apply_survivor_transition(
    state: &mut SimulationState,
    deceased: PersonId,
    survivor: PersonId,
    survivor_age: u8,
    month: YearMonth,
) -> SurvivorTransition {
    let balance_before = state.total_balance();
    let transferred_accounts = state.transfer_ownership(deceased, survivor);

    let own_benefit = state.income_of(survivor, is_social_security);
    let inherited_benefit =
        state.income_of(deceased, is_social_security) * survivor_benefit_factor(survivor_age);
    let new_benefit = own_benefit.max(inherited_benefit);

    let mut pensions = Vec::new();
    let mut deceased_ss: Option<IncomeSource> = None;
    let sources = std::mem::take(&mut state.income_sources);
    let mut rewritten: Vec<IncomeSource> = Vec::with_capacity(sources.len());

    for mut source in sources {
        if source.owner != deceased {
            rewritten.push(source);
            continue;
        }
        match source.kind {
            IncomeKind::Salary => {}
            IncomeKind::SocialSecurity => {
                deceased_ss.get_or_insert(source);
            }
            IncomeKind::Pension { form } => {
                let before = source.monthly_amount;
                source.monthly_amount = before * form.continuation();
                pensions.push(PensionRewrite {
                    name: source.name.clone(),
                    monthly_before: before,
                    monthly_after: source.monthly_amount,
                });
                if source.monthly_amount > 0.0 {
                    source.owner = survivor;
                    rewritten.push(source);
                }
            }
            IncomeKind::Annuity | IncomeKind::Other => {
                source.owner = survivor;
                rewritten.push(source);
            }
        }
    }

    if new_benefit > own_benefit {
        // Replace the survivor's own benefit with the larger survivor benefit
        let own_position = rewritten
            .iter()
            .position(|s| s.owner == survivor && is_social_security(&s.kind));
        let template = own_position.map(|i| rewritten.remove(i)).or(deceased_ss);
        rewritten.retain(|s| !(s.owner == survivor && is_social_security(&s.kind)));
        if let Some(mut benefit) = template {
            benefit.owner = survivor;
            benefit.monthly_amount = new_benefit;
            rewritten.push(benefit);
        }
    }

    state.income_sources = rewritten;
    state.flags.survivor_mode = true;

    SurvivorTransition {
        month,
        deceased,
        survivor,
        transferred_accounts,
        balance_before,
        balance_after: state.total_balance(),
        survivor_social_security_before: own_benefit,
        survivor_social_security_after: new_benefit,
        pensions,
    }
}
