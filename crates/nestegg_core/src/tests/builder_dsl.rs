//! Tests for the Builder DSL
//!
//! These tests demonstrate and verify the fluent builder API for creating simulations.

use crate::collaborators::Collaborators;
use crate::config::{AccountBuilder, SimulationBuilder, SimulationConfig};
use crate::date_math::YearMonth;
use crate::engine::SimulationEngine;
use crate::error::ConfigError;
use crate::model::{
    AccountKind, Allocation, ExpenseKind, FilingStatus, MonteCarloConfig, PensionForm,
    RmdExcessDisposition, SeedPolicy, TerminationReason,
};
use crate::monte_carlo::run_monte_carlo;
use crate::sequencer::AccountSequencer;
use crate::strategy::{GuardrailParams, SpendingStrategy};

/// A complete couple built in one chain
fn couple() -> SimulationBuilder {
    SimulationBuilder::new()
        .start(2025, 1)
        .years(30)
        .inflation(0.03)
        .person("Alex", 1962, 4, 10)
        .retire_at(2027, 1)
        .salary(9_000.0)
        .social_security(2_800.0, 2029, 4)
        .pension("Teachers pension", 1_200.0, PensionForm::JointSurvivor50)
        .person("Sam", 1964, 8, 1)
        .retire_at(2029, 1)
        .withdrawals_from(2030, 1)
        .social_security(1_900.0, 2031, 8)
        .account(
            AccountBuilder::traditional_401k("Alex 401k")
                .owner("Alex")
                .balance(650_000.0)
                .stocks_bonds(0.7),
        )
        .account(AccountBuilder::roth_ira("Sam Roth").balance(120_000.0))
        .account(AccountBuilder::taxable_brokerage("Joint").owner("Alex").balance(90_000.0))
        .account(AccountBuilder::savings("Emergency").owner("Alex").balance(30_000.0))
        .contribute_to("Alex 401k", 0.5)
        .overflow_to("Joint")
        .expense("Living", ExpenseKind::Essential, 5_500.0)
        .expense("Travel", ExpenseKind::Discretionary, 1_500.0)
        .expense("Medical", ExpenseKind::Healthcare, 700.0)
        .mortgage("House", 1_800.0, 2032, 6)
        .reserve("Medical", 20_000.0, 10_000.0)
        .strategy(SpendingStrategy::Guardrails(GuardrailParams::vanguard()))
        .sequencer(AccountSequencer::TaxEfficient)
}

#[test]
fn test_builder_produces_valid_config() {
    let config = couple()
        .rmd_excess(RmdExcessDisposition::Distribute)
        .build()
        .unwrap();

    assert_eq!(config.household.members.len(), 2);
    assert_eq!(
        config.household.filing_status,
        FilingStatus::MarriedFilingJointly
    );
    assert_eq!(config.end_month(), YearMonth::new(2055, 1));
    assert_eq!(config.accounts.len(), 4);
    assert_eq!(config.accounts[3].kind, AccountKind::Savings);
    assert_eq!(config.accounts[3].allocation, Allocation::all_cash());
    // Two income sources for Alex, one for Sam
    assert_eq!(config.income.len(), 4);
    // Social Security follows the inflation set before it
    assert!(config.income.iter().any(|s| s.cola == 0.03));
    assert_eq!(config.budget.categories.len(), 4);
    assert_eq!(config.reserves.len(), 1);
    assert_eq!(config.events.len(), 1);
    assert!(config.validate().is_ok());
}

#[test]
fn test_builder_config_runs_end_to_end() {
    super::init_logging();
    let config = couple()
        .reinvest_excess_into("Joint")
        .build()
        .unwrap();
    let engine = SimulationEngine::new(config, Collaborators::default()).unwrap();

    let series = engine.run(77).unwrap();
    assert!(!series.snapshots.is_empty());
    assert!(series.event_fired("House paid off"));

    let summary = run_monte_carlo(
        &engine,
        &MonteCarloConfig {
            num_runs: 20,
            seed_policy: SeedPolicy::Fixed(5),
            ..MonteCarloConfig::default()
        },
        None,
    )
    .unwrap();
    assert_eq!(summary.stats.completed_runs, 20);
    let counted: usize = summary.stats.termination_counts.values().sum();
    assert_eq!(counted, 20);
}

#[test]
fn test_builder_config_survives_json() {
    let config = couple()
        .rmd_excess(RmdExcessDisposition::Distribute)
        .build()
        .unwrap();
    let json = serde_json::to_string_pretty(&config).unwrap();
    let parsed = SimulationConfig::from_json(&json).unwrap();
    assert_eq!(parsed.household, config.household);
    assert_eq!(parsed.events, config.events);
    assert_eq!(parsed.rmd_excess, config.rmd_excess);

    let a = crate::engine::run(config, 3).unwrap();
    let b = crate::engine::run(parsed, 3).unwrap();
    assert_eq!(a.termination, b.termination);
    for (x, y) in a.balances().iter().zip(b.balances()) {
        assert!((x - y).abs() <= 1e-6 * x.abs().max(1.0));
    }
}

#[test]
fn test_builder_errors() {
    assert_eq!(
        couple().build().unwrap_err(),
        ConfigError::MissingRmdExcessDisposition
    );
    assert_eq!(
        couple()
            .rmd_excess(RmdExcessDisposition::Distribute)
            .contribute_to("Nowhere", 1.0)
            .build()
            .unwrap_err(),
        ConfigError::UnknownName("Nowhere".into())
    );
    assert!(matches!(
        SimulationBuilder::new()
            .rmd_excess(RmdExcessDisposition::Distribute)
            .build(),
        Err(ConfigError::HouseholdSize(0))
    ));
}

#[test]
fn test_short_horizon_completes() {
    let series = crate::engine::run(
        SimulationBuilder::new()
            .start(2025, 7)
            .end(2026, 1)
            .person("Pat", 1950, 1, 1)
            .account(AccountBuilder::taxable_brokerage("Brokerage").balance(50_000.0))
            .rmd_excess(RmdExcessDisposition::Distribute)
            .build()
            .unwrap(),
        0,
    )
    .unwrap();
    assert_eq!(series.termination, TerminationReason::Completed);
    assert_eq!(series.snapshots.len(), 6);
    assert_eq!(series.last_month(), Some(YearMonth::new(2025, 12)));
}
