//! Criterion benchmarks for nestegg_core simulation
//!
//! Run with: cargo bench -p nestegg_core

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use nestegg_core::collaborators::Collaborators;
use nestegg_core::config::{AccountBuilder, SimulationBuilder, SimulationConfig};
use nestegg_core::engine::{SimulationEngine, run};
use nestegg_core::model::{
    ExpenseKind, MarketAssumptions, MonteCarloConfig, ProbabilityModel, RmdExcessDisposition,
    SeedPolicy,
};
use nestegg_core::monte_carlo::run_monte_carlo;
use nestegg_core::strategy::{GuardrailParams, SpendingStrategy};

fn create_single_config(duration_years: u16) -> SimulationConfig {
    SimulationBuilder::new()
        .start(2025, 1)
        .years(duration_years)
        .person("Pat", 1960, 6, 15)
        .social_security(2_400.0, 2027, 6)
        .account(AccountBuilder::traditional_ira("IRA").balance(600_000.0))
        .account(AccountBuilder::taxable_brokerage("Brokerage").balance(200_000.0))
        .expense("Living", ExpenseKind::Essential, 4_000.0)
        .market(MarketAssumptions::us_historical())
        .strategy(SpendingStrategy::Static { rate: 0.04 })
        .rmd_excess(RmdExcessDisposition::Distribute)
        .build()
        .expect("benchmark config is valid")
}

fn create_couple_config() -> SimulationConfig {
    SimulationBuilder::new()
        .start(2025, 1)
        .years(40)
        .inflation(0.03)
        .person("Alex", 1968, 3, 1)
        .retire_at(2030, 1)
        .salary(10_000.0)
        .social_security(2_900.0, 2035, 3)
        .mortality(ProbabilityModel::us_mortality())
        .person("Sam", 1970, 9, 1)
        .retire_at(2032, 1)
        .salary(6_000.0)
        .social_security(2_000.0, 2037, 9)
        .mortality(ProbabilityModel::us_mortality())
        .account(AccountBuilder::traditional_401k("Alex 401k").owner("Alex").balance(450_000.0))
        .account(AccountBuilder::roth_ira("Sam Roth").balance(90_000.0))
        .account(AccountBuilder::taxable_brokerage("Joint").owner("Alex").balance(150_000.0))
        .contribute_to("Alex 401k", 0.6)
        .contribute_to("Sam Roth", 0.2)
        .overflow_to("Joint")
        .expense("Living", ExpenseKind::Essential, 6_500.0)
        .expense("Travel", ExpenseKind::Discretionary, 1_500.0)
        .expense("Medical", ExpenseKind::Healthcare, 900.0)
        .mortgage("House", 2_100.0, 2036, 1)
        .reserve("Medical", 25_000.0, 5_000.0)
        .market(MarketAssumptions::us_historical())
        .strategy(SpendingStrategy::Guardrails(GuardrailParams::guyton_klinger()))
        .reinvest_excess_into("Joint")
        .build()
        .expect("benchmark config is valid")
}

fn bench_single_run(c: &mut Criterion) {
    let config = create_single_config(30);

    c.bench_function("single_30yr_simulation", |b| {
        b.iter(|| run(black_box(config.clone()), black_box(42)))
    });
}

fn bench_couple_run(c: &mut Criterion) {
    let engine = SimulationEngine::new(create_couple_config(), Collaborators::default())
        .expect("benchmark config is valid");

    c.bench_function("couple_40yr_simulation", |b| {
        b.iter(|| engine.run(black_box(42)))
    });
}

fn bench_monte_carlo(c: &mut Criterion) {
    let mut group = c.benchmark_group("monte_carlo");
    let engine = SimulationEngine::new(create_couple_config(), Collaborators::default())
        .expect("benchmark config is valid");

    for runs in [100, 500, 1000].iter() {
        let mc_config = MonteCarloConfig {
            num_runs: *runs,
            seed_policy: SeedPolicy::Fixed(7),
            ..MonteCarloConfig::default()
        };

        group.bench_with_input(BenchmarkId::new("runs", runs), runs, |b, _| {
            b.iter(|| run_monte_carlo(black_box(&engine), black_box(&mc_config), None))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_run, bench_couple_run, bench_monte_carlo);
criterion_main!(benches);
