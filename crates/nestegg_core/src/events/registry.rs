//! Registry of scheduled and probabilistic life events for one run

use rand::Rng;

use crate::date_math::{YearMonth, month_reaching_age};
use crate::model::{
    EventId, EventKind, EventTrigger, FiredEvent, Household, IncomeKind, IncomeSource, LifeEvent,
    PersonId, rmd_start_age,
};

#[derive(Debug, Clone)]
struct Entry {
    event: LifeEvent,
    fired: bool,
}

/// Every life event of a run, in evaluation order. Each fires at most once.
///
/// The milestones implied by the household (retirement, withdrawal start,
/// Social Security start, minimum-distribution start, death) are registered
/// first, person by person, followed by the configured events.
#[derive(Debug, Clone)]
pub struct EventRegistry {
    entries: Vec<Entry>,
}

impl EventRegistry {
    #[must_use]
    pub fn new(household: &Household, income: &[IncomeSource], configured: &[LifeEvent]) -> Self {
        let mut next_id = configured
            .iter()
            .map(|e| e.event_id.0)
            .max()
            .map_or(0, |max| max.saturating_add(1));
        let mut entries = Vec::new();
        let mut push = |name: String, person: PersonId, kind: EventKind, trigger: EventTrigger| {
            entries.push(Entry {
                event: LifeEvent {
                    event_id: EventId(next_id),
                    name,
                    person: Some(person),
                    kind,
                    trigger,
                },
                fired: false,
            });
            next_id = next_id.saturating_add(1);
        };

        for person in &household.members {
            let scheduled = |month| EventTrigger::Scheduled { month };
            push(
                format!("{} retirement", person.name),
                person.person_id,
                EventKind::RetirementStart,
                scheduled(person.retirement),
            );
            push(
                format!("{} withdrawal start", person.name),
                person.person_id,
                EventKind::WithdrawalStart,
                scheduled(person.withdrawal_start()),
            );
            let ss_start = income
                .iter()
                .filter(|s| {
                    s.owner == person.person_id && matches!(s.kind, IncomeKind::SocialSecurity)
                })
                .filter_map(|s| s.start)
                .min();
            if let Some(start) = ss_start {
                push(
                    format!("{} social security start", person.name),
                    person.person_id,
                    EventKind::SocialSecurityStart,
                    scheduled(start),
                );
            }
            let rmd_month =
                month_reaching_age(person.birth_date, rmd_start_age(person.birth_year()));
            push(
                format!("{} minimum distributions start", person.name),
                person.person_id,
                EventKind::RmdStart,
                scheduled(rmd_month),
            );
            if let Some(model) = &person.mortality {
                push(
                    format!("{} death", person.name),
                    person.person_id,
                    EventKind::Death,
                    EventTrigger::Probabilistic {
                        model: model.clone(),
                        not_before: None,
                    },
                );
            }
        }

        entries.extend(configured.iter().cloned().map(|event| Entry {
            event,
            fired: false,
        }));
        Self { entries }
    }

    pub fn events(&self) -> impl Iterator<Item = &LifeEvent> {
        self.entries.iter().map(|e| &e.event)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Events that have not fired yet
    #[must_use]
    pub fn pending(&self) -> usize {
        self.entries.iter().filter(|e| !e.fired).count()
    }

    /// Fire every event due in `month`, in registry order.
    ///
    /// `age_of` gives the fractional age of the person an event concerns (the
    /// primary living member for household events), or `None` when that person
    /// has died; such events are skipped without drawing. Each eligible
    /// probabilistic event consumes exactly one draw from `rng`.
    pub fn poll<R: Rng + ?Sized>(
        &mut self,
        month: YearMonth,
        rng: &mut R,
        age_of: &dyn Fn(Option<PersonId>) -> Option<f64>,
    ) -> Vec<FiredEvent> {
        let mut fired = Vec::new();
        for entry in self.entries.iter_mut().filter(|e| !e.fired) {
            let Some(age) = age_of(entry.event.person) else {
                continue;
            };
            let due = match &entry.event.trigger {
                EventTrigger::Scheduled { month: at } => month >= *at,
                EventTrigger::Probabilistic { model, not_before } => {
                    if not_before.is_some_and(|nb| month < nb) {
                        false
                    } else {
                        let p = model.monthly_probability(age);
                        rng.random::<f64>() < p
                    }
                }
            };
            if due {
                entry.fired = true;
                fired.push(FiredEvent {
                    event_id: entry.event.event_id,
                    name: entry.event.name.clone(),
                    person: entry.event.person,
                    kind: entry.event.kind.clone(),
                    month,
                });
            }
        }
        fired
    }
}
