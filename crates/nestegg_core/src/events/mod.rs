//! Life events: phase derivation, the per-run event registry and the
//! survivor transition applied at the first death in a couple.

mod phase;
mod registry;
mod survivor;

pub use phase::HouseholdMode;
pub use registry::EventRegistry;
pub use survivor::survivor_benefit_factor;

pub(crate) use survivor::apply_survivor_transition;
