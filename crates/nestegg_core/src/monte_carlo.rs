//! Monte Carlo batches over one engine
//!
//! Seeds are derived up front from a master stream, so a run's result depends
//! only on its index and never on thread scheduling. Runs fan out over rayon
//! (sequentially without the `parallel` feature); each owns its state and
//! random stream. A failing run is recorded and, under
//! [`FailurePolicy::CancelBatch`], trips a shared flag: runs that have not
//! started yet are skipped and runs in flight stop at their next year
//! boundary. Whatever completed is aggregated.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{info, info_span, warn};

use crate::collaborators::Collaborators;
use crate::config::SimulationConfig;
use crate::date_math::YearMonth;
use crate::engine::SimulationEngine;
use crate::error::{ConfigError, MonteCarloError, SimulationError};
use crate::model::{
    FailurePolicy, MonteCarloConfig, MonteCarloStats, MonteCarloSummary, PercentileBand,
    RunFailure, SeedPolicy, TerminationReason, TimeSeries,
};

/// Progress tracking and external cancellation for a batch
#[derive(Debug, Clone)]
pub struct MonteCarloProgress {
    /// Completed runs counter
    completed: Arc<AtomicUsize>,
    /// Cancellation flag
    cancelled: Arc<AtomicBool>,
}

impl MonteCarloProgress {
    #[must_use]
    pub fn new() -> Self {
        Self {
            completed: Arc::new(AtomicUsize::new(0)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create from existing atomics (e.g. owned by a UI thread)
    pub fn from_atomics(completed: Arc<AtomicUsize>, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            completed,
            cancelled,
        }
    }

    /// Get the number of completed runs
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn increment(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.completed.store(0, Ordering::Relaxed);
        self.cancelled.store(false, Ordering::Relaxed);
    }

    /// Ask the batch to stop; runs already in flight finish
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Default for MonteCarloProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// One seed per run, in run-index order
#[must_use]
pub fn derive_seeds(policy: SeedPolicy, num_runs: usize) -> Vec<u64> {
    let mut master = match policy {
        SeedPolicy::Fixed(base) => SmallRng::seed_from_u64(base),
        SeedPolicy::Entropy => SmallRng::from_os_rng(),
    };
    (0..num_runs).map(|_| master.next_u64()).collect()
}

/// What a completed run contributes to the aggregate
#[derive(Debug, Clone)]
pub(crate) struct RunDigest {
    pub run_index: usize,
    pub seed: u64,
    pub termination: TerminationReason,
    pub final_balance: f64,
    /// Months from the start until the portfolio ran out
    pub depletion_months: Option<u32>,
    pub balances: Vec<f64>,
    pub series: Option<TimeSeries>,
}

impl RunDigest {
    fn new(run_index: usize, series: TimeSeries, keep_series: bool) -> Self {
        let depletion_months = (series.termination == TerminationReason::PortfolioDepleted)
            .then(|| series.snapshots.last().map_or(0, |s| s.index + 1));
        Self {
            run_index,
            seed: series.seed,
            termination: series.termination,
            final_balance: series.final_balance(),
            depletion_months,
            balances: series.balances(),
            series: keep_series.then_some(series),
        }
    }
}

enum Outcome {
    Done(RunDigest),
    Failed(RunFailure),
    Skipped,
}

/// Run a batch against `engine`
pub fn run_monte_carlo(
    engine: &SimulationEngine,
    config: &MonteCarloConfig,
    progress: Option<&MonteCarloProgress>,
) -> Result<MonteCarloSummary, MonteCarloError> {
    run_batch(engine, config, progress, cfg!(feature = "parallel"))
}

#[cfg(feature = "parallel")]
fn fan_out<F>(num_runs: usize, run_one: &F) -> Vec<Outcome>
where
    F: Fn(usize) -> Outcome + Sync + Send,
{
    (0..num_runs).into_par_iter().map(run_one).collect()
}

#[cfg(not(feature = "parallel"))]
fn fan_out<F>(num_runs: usize, run_one: &F) -> Vec<Outcome>
where
    F: Fn(usize) -> Outcome,
{
    (0..num_runs).map(run_one).collect()
}

/// Runs execute in index order unless `parallel` is set
fn run_batch(
    engine: &SimulationEngine,
    config: &MonteCarloConfig,
    progress: Option<&MonteCarloProgress>,
    parallel: bool,
) -> Result<MonteCarloSummary, MonteCarloError> {
    if config.num_runs == 0 {
        return Err(ConfigError::NoRuns.into());
    }
    let _span = info_span!("monte_carlo", runs = config.num_runs).entered();

    let seeds = derive_seeds(config.seed_policy, config.num_runs);
    let deadline = config
        .time_budget_ms
        .map(|ms| Instant::now() + Duration::from_millis(ms));
    let batch_cancelled = AtomicBool::new(false);
    let stop = || {
        batch_cancelled.load(Ordering::Relaxed)
            || progress.is_some_and(MonteCarloProgress::is_cancelled)
            || deadline.is_some_and(|d| Instant::now() >= d)
    };

    let run_one = |run_index: usize| -> Outcome {
        if stop() {
            return Outcome::Skipped;
        }
        let seed = seeds[run_index];
        match engine.run_until(seed, &stop) {
            Ok(series) => {
                if let Some(p) = progress {
                    p.increment();
                }
                Outcome::Done(RunDigest::new(
                    run_index,
                    series,
                    run_index < config.sample_runs,
                ))
            }
            Err(SimulationError::Interrupted { .. }) => Outcome::Skipped,
            Err(e) => {
                warn!(run_index, seed, error = %e, "monte carlo run failed");
                if config.failure_policy == FailurePolicy::CancelBatch {
                    batch_cancelled.store(true, Ordering::Relaxed);
                }
                Outcome::Failed(RunFailure {
                    run_index,
                    seed,
                    message: e.to_string(),
                })
            }
        }
    };

    let outcomes: Vec<Outcome> = if parallel {
        fan_out(config.num_runs, &run_one)
    } else {
        (0..config.num_runs).map(&run_one).collect()
    };

    let mut digests = Vec::new();
    let mut failures = Vec::new();
    let mut skipped = 0;
    for outcome in outcomes {
        match outcome {
            Outcome::Done(digest) => digests.push(digest),
            Outcome::Failed(failure) => failures.push(failure),
            Outcome::Skipped => skipped += 1,
        }
    }

    if digests.is_empty() {
        return Err(if failures.is_empty() {
            MonteCarloError::Cancelled
        } else {
            MonteCarloError::AllRunsFailed(failures.len())
        });
    }

    failures.sort_by_key(|f| f.run_index);
    let stats = aggregate(
        config.num_runs,
        &mut digests,
        failures.len(),
        skipped,
        &config.percentiles,
        engine.config().start,
    );
    info!(
        completed = stats.completed_runs,
        failed = stats.failed_runs,
        skipped = stats.skipped_runs,
        success_rate = stats.success_rate,
        "monte carlo batch finished"
    );

    let percentile_runs = if config.keep_percentile_runs {
        percentile_runs(engine, &digests, &config.percentiles)
    } else {
        Vec::new()
    };

    let seeds = digests.iter().map(|d| d.seed).collect();
    let sampled_runs = digests.iter_mut().filter_map(|d| d.series.take()).collect();

    Ok(MonteCarloSummary {
        stats,
        failures,
        sampled_runs,
        percentile_runs,
        seeds,
    })
}

/// Build an engine with default collaborators and run `num_runs` paths
pub fn run_monte_carlo_config(
    config: SimulationConfig,
    num_runs: usize,
    seed_policy: SeedPolicy,
) -> Result<MonteCarloSummary, MonteCarloError> {
    let engine = SimulationEngine::new(config, Collaborators::default())?;
    let mc = MonteCarloConfig {
        num_runs,
        seed_policy,
        ..MonteCarloConfig::default()
    };
    run_monte_carlo(&engine, &mc, None)
}

/// Linear interpolation between closest ranks of an ascending slice
fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = p.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}

/// Combine completed runs. Digests are sorted by run index first, so the
/// result does not depend on completion order.
pub(crate) fn aggregate(
    requested_runs: usize,
    digests: &mut [RunDigest],
    failed_runs: usize,
    skipped_runs: usize,
    percentiles: &[f64],
    start: YearMonth,
) -> MonteCarloStats {
    digests.sort_by_key(|d| d.run_index);
    let completed = digests.len();
    let n = completed.max(1) as f64;

    let mut termination_counts = BTreeMap::new();
    for d in digests.iter() {
        *termination_counts.entry(d.termination).or_insert(0) += 1;
    }
    let depleted = termination_counts
        .get(&TerminationReason::PortfolioDepleted)
        .copied()
        .unwrap_or(0);

    let mut finals: Vec<f64> = digests.iter().map(|d| d.final_balance).collect();
    let mean = finals.iter().sum::<f64>() / n;
    let variance = finals.iter().map(|b| (b - mean).powi(2)).sum::<f64>() / n;
    finals.sort_by(f64::total_cmp);

    let mut depletions: Vec<f64> = digests
        .iter()
        .filter_map(|d| d.depletion_months.map(f64::from))
        .collect();
    depletions.sort_by(f64::total_cmp);
    let depletion_month_percentiles = if depletions.is_empty() {
        Vec::new()
    } else {
        percentiles
            .iter()
            .map(|&p| (p, percentile(&depletions, p)))
            .collect()
    };

    // Shorter runs hold their final balance for the remaining months
    let longest = digests.iter().map(|d| d.balances.len()).max().unwrap_or(0);
    let mut balance_bands = Vec::with_capacity(longest);
    let mut column = Vec::with_capacity(completed);
    for index in 0..longest {
        column.clear();
        column.extend(
            digests
                .iter()
                .map(|d| d.balances.get(index).copied().unwrap_or(d.final_balance)),
        );
        column.sort_by(f64::total_cmp);
        let index = u32::try_from(index).unwrap_or(u32::MAX);
        balance_bands.push(PercentileBand {
            index,
            month: start.add_months(i32::try_from(index).unwrap_or(i32::MAX)),
            values: percentiles
                .iter()
                .map(|&p| (p, percentile(&column, p)))
                .collect(),
        });
    }

    MonteCarloStats {
        requested_runs,
        completed_runs: completed,
        failed_runs,
        skipped_runs,
        termination_counts,
        success_rate: (completed - depleted) as f64 / n,
        mean_final_balance: mean,
        std_dev_final_balance: variance.sqrt(),
        min_final_balance: finals.first().copied().unwrap_or(0.0),
        max_final_balance: finals.last().copied().unwrap_or(0.0),
        final_balance_percentiles: percentiles
            .iter()
            .map(|&p| (p, percentile(&finals, p)))
            .collect(),
        depletion_month_percentiles,
        balance_bands,
    }
}

/// Re-simulate the run closest to each final-balance percentile
fn percentile_runs(
    engine: &SimulationEngine,
    digests: &[RunDigest],
    percentiles: &[f64],
) -> Vec<(f64, TimeSeries)> {
    let mut ranked: Vec<&RunDigest> = digests.iter().collect();
    ranked.sort_by(|a, b| {
        a.final_balance
            .total_cmp(&b.final_balance)
            .then(a.run_index.cmp(&b.run_index))
    });
    let last = ranked.len().saturating_sub(1);

    percentiles
        .iter()
        .filter_map(|&p| {
            let position = (p.clamp(0.0, 1.0) * last as f64).round() as usize;
            let digest = ranked.get(position)?;
            engine.run(digest.seed).ok().map(|series| (p, series))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::ReturnCalculator;
    use crate::error::{CalcResult, CalculationError};
    use crate::model::{
        Account, AccountId, AccountKind, Allocation, MarketAssumptions, PersonId, ReturnProfile,
    };

    fn config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.accounts = vec![Account {
            account_id: AccountId(0),
            name: "Brokerage".into(),
            kind: AccountKind::Brokerage,
            owner: PersonId(0),
            balance: 400_000.0,
            allocation: Allocation::new(0.6, 0.4, 0.0),
        }];
        config.market = MarketAssumptions {
            stocks: ReturnProfile::SP500_NORMAL,
            bonds: ReturnProfile::US_BONDS_NORMAL,
            ..MarketAssumptions::default()
        };
        config.duration_years = 20;
        config
    }

    fn mc(num_runs: usize) -> MonteCarloConfig {
        MonteCarloConfig {
            num_runs,
            sample_runs: 2,
            ..MonteCarloConfig::default()
        }
    }

    /// Fails once the balance has grown past a threshold
    #[derive(Debug)]
    struct FailAbove(f64);

    impl ReturnCalculator for FailAbove {
        fn monthly_factor(&self, annual_rate: f64) -> f64 {
            (1.0 + annual_rate).powf(1.0 / 12.0)
        }

        fn grow(&self, balance: f64, annual_rate: f64) -> CalcResult<f64> {
            if balance > self.0 {
                return Err(CalculationError::Other("balance too large".into()));
            }
            Ok(balance * self.monthly_factor(annual_rate))
        }
    }

    /// Fails exactly one `grow` call across the whole batch
    #[derive(Debug)]
    struct FailOnCall {
        calls: AtomicUsize,
        fail_at: usize,
    }

    impl FailOnCall {
        fn new(fail_at: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_at,
            }
        }
    }

    impl ReturnCalculator for FailOnCall {
        fn monthly_factor(&self, annual_rate: f64) -> f64 {
            (1.0 + annual_rate).powf(1.0 / 12.0)
        }

        fn grow(&self, balance: f64, annual_rate: f64) -> CalcResult<f64> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_at {
                return Err(CalculationError::Other("market feed unavailable".into()));
            }
            Ok(balance * self.monthly_factor(annual_rate))
        }
    }

    /// Cancels the batch the first time returns are computed
    #[derive(Debug)]
    struct CancelOnGrow(MonteCarloProgress);

    impl ReturnCalculator for CancelOnGrow {
        fn monthly_factor(&self, annual_rate: f64) -> f64 {
            (1.0 + annual_rate).powf(1.0 / 12.0)
        }

        fn grow(&self, balance: f64, annual_rate: f64) -> CalcResult<f64> {
            self.0.cancel();
            Ok(balance * self.monthly_factor(annual_rate))
        }
    }

    /// One account over 20 years at a fixed rate: 240 `grow` calls per run
    fn steady_engine(returns: Arc<dyn ReturnCalculator>) -> SimulationEngine {
        let mut c = config();
        c.market = MarketAssumptions::fixed(0.05);
        let collaborators = Collaborators {
            returns,
            ..Collaborators::default()
        };
        SimulationEngine::new(c, collaborators).unwrap()
    }

    #[test]
    fn test_seeds_are_reproducible() {
        assert_eq!(
            derive_seeds(SeedPolicy::Fixed(7), 5),
            derive_seeds(SeedPolicy::Fixed(7), 5)
        );
        assert_ne!(
            derive_seeds(SeedPolicy::Fixed(7), 5),
            derive_seeds(SeedPolicy::Fixed(8), 5)
        );
    }

    #[test]
    fn test_batch_is_deterministic() {
        let engine = SimulationEngine::new(config(), Collaborators::default()).unwrap();
        let a = run_monte_carlo(&engine, &mc(16), None).unwrap();
        let b = run_monte_carlo(&engine, &mc(16), None).unwrap();
        assert_eq!(a.stats, b.stats);
        assert_eq!(a.seeds, b.seeds);
        assert_eq!(a.stats.completed_runs, 16);
        assert_eq!(a.sampled_runs.len(), 2);
        assert!(a.stats.success_rate >= 0.0 && a.stats.success_rate <= 1.0);
        assert!(!a.stats.balance_bands.is_empty());
        assert!(a.stats.balance_bands.len() <= 240);
    }

    #[test]
    fn test_progress_counts_runs() {
        let engine = SimulationEngine::new(config(), Collaborators::default()).unwrap();
        let progress = MonteCarloProgress::new();
        run_monte_carlo(&engine, &mc(8), Some(&progress)).unwrap();
        assert_eq!(progress.completed(), 8);
    }

    #[test]
    fn test_zero_runs_rejected() {
        let engine = SimulationEngine::new(config(), Collaborators::default()).unwrap();
        let err = run_monte_carlo(&engine, &mc(0), None).unwrap_err();
        assert_eq!(err, MonteCarloError::Config(ConfigError::NoRuns));
    }

    #[test]
    fn test_cancelled_before_start() {
        let engine = SimulationEngine::new(config(), Collaborators::default()).unwrap();
        let progress = MonteCarloProgress::new();
        progress.cancel();
        let err = run_monte_carlo(&engine, &mc(4), Some(&progress)).unwrap_err();
        assert_eq!(err, MonteCarloError::Cancelled);
    }

    #[test]
    fn test_every_run_failing() {
        let collaborators = Collaborators {
            returns: Arc::new(FailAbove(0.0)),
            ..Collaborators::default()
        };
        let engine = SimulationEngine::new(config(), collaborators).unwrap();
        let batch = MonteCarloConfig {
            failure_policy: FailurePolicy::Continue,
            ..mc(4)
        };
        let err = run_monte_carlo(&engine, &batch, None).unwrap_err();
        assert_eq!(err, MonteCarloError::AllRunsFailed(4));
    }

    #[test]
    fn test_continue_policy_keeps_completed_runs() {
        // Exactly one call fails, wherever it lands
        let engine = steady_engine(Arc::new(FailOnCall::new(300)));
        let batch = MonteCarloConfig {
            failure_policy: FailurePolicy::Continue,
            ..mc(8)
        };
        let summary = run_monte_carlo(&engine, &batch, None).unwrap();
        let stats = &summary.stats;
        assert_eq!(stats.completed_runs, 7);
        assert_eq!(stats.failed_runs, 1);
        assert_eq!(stats.skipped_runs, 0);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.seeds.len(), 7);
    }

    #[test]
    fn test_cancel_batch_keeps_runs_completed_before_failure() {
        // In index order: runs 0 and 1 finish, run 2 fails at its 121st month
        let engine = steady_engine(Arc::new(FailOnCall::new(600)));
        let batch = MonteCarloConfig {
            failure_policy: FailurePolicy::CancelBatch,
            ..mc(8)
        };
        let summary = run_batch(&engine, &batch, None, false).unwrap();
        let stats = &summary.stats;
        assert_eq!(stats.completed_runs, 2);
        assert_eq!(stats.failed_runs, 1);
        assert_eq!(stats.skipped_runs, 5);
        assert_eq!(summary.failures[0].run_index, 2);
        assert_eq!(summary.sampled_runs.len(), 2);
        assert_eq!(
            stats.termination_counts.get(&TerminationReason::Completed),
            Some(&2)
        );

        let seeds = derive_seeds(batch.seed_policy, 8);
        assert_eq!(summary.seeds, seeds[..2].to_vec());
        assert_eq!(summary.failures[0].seed, seeds[2]);
    }

    #[test]
    fn test_cancel_stops_run_in_flight() {
        let progress = MonteCarloProgress::new();
        let engine = steady_engine(Arc::new(CancelOnGrow(progress.clone())));
        // The first run is cancelled during its first year and never finishes
        let err = run_batch(&engine, &mc(3), Some(&progress), false).unwrap_err();
        assert_eq!(err, MonteCarloError::Cancelled);
        assert_eq!(progress.completed(), 0);
    }

    #[test]
    fn test_exhausted_time_budget_cancels() {
        let engine = SimulationEngine::new(config(), Collaborators::default()).unwrap();
        let batch = MonteCarloConfig {
            time_budget_ms: Some(0),
            ..mc(4)
        };
        let err = run_monte_carlo(&engine, &batch, None).unwrap_err();
        assert_eq!(err, MonteCarloError::Cancelled);
    }

    #[test]
    fn test_aggregation_ignores_completion_order() {
        let engine = SimulationEngine::new(config(), Collaborators::default()).unwrap();
        let seeds = derive_seeds(SeedPolicy::Fixed(3), 10);
        let digests: Vec<RunDigest> = seeds
            .iter()
            .enumerate()
            .map(|(i, &seed)| RunDigest::new(i, engine.run(seed).unwrap(), false))
            .collect();
        let start = engine.config().start;
        let percentiles = [0.1, 0.5, 0.9];

        let mut forward = digests.clone();
        let mut reversed: Vec<RunDigest> = digests.into_iter().rev().collect();
        let a = aggregate(10, &mut forward, 0, 0, &percentiles, start);
        let b = aggregate(10, &mut reversed, 0, 0, &percentiles, start);
        assert_eq!(a, b);
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [0.0, 10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile(&sorted, 0.5), 20.0);
        assert_eq!(percentile(&sorted, 0.0), 0.0);
        assert_eq!(percentile(&sorted, 1.0), 40.0);
        assert!((percentile(&sorted, 0.3) - 12.0).abs() < 1e-9);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn test_percentile_runs_resimulate_same_paths() {
        let engine = SimulationEngine::new(config(), Collaborators::default()).unwrap();
        let batch = MonteCarloConfig {
            keep_percentile_runs: true,
            percentiles: vec![0.0, 1.0],
            ..mc(12)
        };
        let summary = run_monte_carlo(&engine, &batch, None).unwrap();
        assert_eq!(summary.percentile_runs.len(), 2);
        let (_, worst) = &summary.percentile_runs[0];
        let (_, best) = &summary.percentile_runs[1];
        assert_eq!(worst.final_balance(), summary.stats.min_final_balance);
        assert_eq!(best.final_balance(), summary.stats.max_final_balance);
    }
}
