//! Household retirement projection engine
//!
//! This crate simulates a household's finances month by month from a start
//! month until the horizon, death of every member or portfolio depletion.
//! It supports:
//! - Households of one or two people with survivor handling
//! - Pre-tax, Roth, taxable, HSA and cash accounts with stock/bond/cash allocations
//! - Salary, Social Security, pension and other income streams
//! - Categorized expenses with spending phases, mortgages and long-term care
//! - Contingency reserves that absorb one-off shocks
//! - Required minimum distributions and progressive federal brackets
//! - Static, guardrail and income-gap spending strategies
//! - Parallel Monte Carlo batches with percentile statistics
//!
//! # Builder DSL
//!
//! ```ignore
//! use nestegg_core::config::{AccountBuilder, SimulationBuilder};
//! use nestegg_core::model::{MonteCarloConfig, RmdExcessDisposition};
//! use nestegg_core::{Collaborators, SimulationEngine, run_monte_carlo};
//!
//! let config = SimulationBuilder::new()
//!     .start(2025, 1)
//!     .years(30)
//!     .person("Sam", 1961, 8, 2)
//!     .account(AccountBuilder::traditional_ira("IRA").balance(800_000.0))
//!     .social_security(2_400.0, 2028, 8)
//!     .rmd_excess(RmdExcessDisposition::Distribute)
//!     .build()?;
//!
//! let engine = SimulationEngine::new(config, Collaborators::default())?;
//! let summary = run_monte_carlo(&engine, &MonteCarloConfig::default(), None)?;
//! println!("success rate: {:.1}%", summary.stats.success_rate * 100.0);
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod date_math;
pub mod engine;
pub mod error;
pub mod monte_carlo;
pub mod simulation_state;

// ============================================================================
// Behavior modules
// ============================================================================

pub mod collaborators;
pub mod events;
pub mod orchestrator;
pub mod sequencer;
pub mod strategy;

// ============================================================================
// Type definition modules
// ============================================================================

pub mod config;
pub mod model;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use collaborators::Collaborators;
pub use config::{AccountBuilder, SimulationBuilder, SimulationConfig};
pub use engine::{SimulationEngine, run};
pub use error::{ConfigError, MonteCarloError, SimulationError};
pub use monte_carlo::{MonteCarloProgress, run_monte_carlo, run_monte_carlo_config};
pub use strategy::SpendingStrategy;
