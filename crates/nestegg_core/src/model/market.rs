//! Market assumptions and the per-run sampled market path
//!
//! Assumptions are read-only and shared by every run. Each run samples its own
//! `MarketPath` (one annual rate per asset class and year) from its private
//! random stream before the monthly loop starts.

use rand::Rng;
use rand_distr::Distribution;
use serde::{Deserialize, Serialize};

use crate::error::{CalculationError, ConfigError};

/// Annual return model for one asset class
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ReturnProfile {
    None,
    Fixed { rate: f64 },
    /// Arithmetic annual return drawn from a normal distribution
    Normal { mean: f64, std_dev: f64 },
    /// Gross return `1 + r` drawn log-normally with the given arithmetic mean and std dev
    LogNormal { mean: f64, std_dev: f64 },
}

impl ReturnProfile {
    // S&P 500 total return 1928-2024, arithmetic mean / std dev
    pub const SP500_NORMAL: ReturnProfile = ReturnProfile::Normal {
        mean: 0.1177,
        std_dev: 0.1949,
    };
    pub const US_BONDS_NORMAL: ReturnProfile = ReturnProfile::Normal {
        mean: 0.0463,
        std_dev: 0.0768,
    };
    pub const US_TBILLS_FIXED: ReturnProfile = ReturnProfile::Fixed { rate: 0.033 };

    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            ReturnProfile::None | ReturnProfile::Fixed { .. } => Ok(()),
            ReturnProfile::Normal { mean, std_dev } => {
                rand_distr::Normal::new(mean, std_dev)
                    .map(|_| ())
                    .map_err(|_| ConfigError::InvalidDistributionParameters {
                        profile_type: "Normal return",
                        mean,
                        std_dev,
                        reason: "std_dev must be non-negative and finite",
                    })
            }
            ReturnProfile::LogNormal { mean, std_dev } => {
                if mean <= -1.0 || !(std_dev > 0.0 && std_dev.is_finite()) {
                    return Err(ConfigError::InvalidDistributionParameters {
                        profile_type: "LogNormal return",
                        mean,
                        std_dev,
                        reason: "mean must exceed -100% and std_dev must be positive and finite",
                    });
                }
                Ok(())
            }
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, CalculationError> {
        sample_rate(*self, rng, "return")
    }
}

/// Annual inflation model. Same shapes as [`ReturnProfile`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum InflationProfile {
    #[default]
    None,
    Fixed {
        rate: f64,
    },
    Normal {
        mean: f64,
        std_dev: f64,
    },
    LogNormal {
        mean: f64,
        std_dev: f64,
    },
}

impl InflationProfile {
    // US CPI-U 1948-2025, geometric mean / arithmetic mean and std dev
    pub const US_HISTORICAL_FIXED: InflationProfile = InflationProfile::Fixed { rate: 0.0343 };
    pub const US_HISTORICAL_NORMAL: InflationProfile = InflationProfile::Normal {
        mean: 0.0347,
        std_dev: 0.0279,
    };

    fn as_return_profile(self) -> ReturnProfile {
        match self {
            InflationProfile::None => ReturnProfile::None,
            InflationProfile::Fixed { rate } => ReturnProfile::Fixed { rate },
            InflationProfile::Normal { mean, std_dev } => ReturnProfile::Normal { mean, std_dev },
            InflationProfile::LogNormal { mean, std_dev } => {
                ReturnProfile::LogNormal { mean, std_dev }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.as_return_profile().validate()
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, CalculationError> {
        sample_rate(self.as_return_profile(), rng, "inflation")
    }

    /// The deterministic rate strategies use for real-dollar compounding
    #[must_use]
    pub fn expected_rate(&self) -> f64 {
        match *self {
            InflationProfile::None => 0.0,
            InflationProfile::Fixed { rate } => rate,
            InflationProfile::Normal { mean, .. } | InflationProfile::LogNormal { mean, .. } => {
                mean
            }
        }
    }
}

fn sample_rate<R: Rng + ?Sized>(
    profile: ReturnProfile,
    rng: &mut R,
    what: &'static str,
) -> Result<f64, CalculationError> {
    match profile {
        ReturnProfile::None => Ok(0.0),
        ReturnProfile::Fixed { rate } => Ok(rate),
        ReturnProfile::Normal { mean, std_dev } => rand_distr::Normal::new(mean, std_dev)
            .map(|d| d.sample(rng))
            .map_err(|e| CalculationError::Other(format!("{what} distribution: {e}"))),
        ReturnProfile::LogNormal { mean, std_dev } => {
            // Convert the arithmetic moments of the gross return into log-space parameters
            let gross = 1.0 + mean;
            let variance_ratio = 1.0 + (std_dev * std_dev) / (gross * gross);
            let sigma = variance_ratio.ln().sqrt();
            let mu = gross.ln() - 0.5 * sigma * sigma;
            rand_distr::LogNormal::new(mu, sigma)
                .map(|d| d.sample(rng) - 1.0)
                .map_err(|e| CalculationError::Other(format!("{what} distribution: {e}")))
        }
    }
}

/// Read-only market assumptions shared by every run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MarketAssumptions {
    pub stocks: ReturnProfile,
    pub bonds: ReturnProfile,
    pub cash: ReturnProfile,
    #[serde(default)]
    pub inflation: InflationProfile,
}

impl MarketAssumptions {
    /// Every asset class returns `rate` with no inflation. Handy for deterministic projections.
    #[must_use]
    pub fn fixed(rate: f64) -> Self {
        Self {
            stocks: ReturnProfile::Fixed { rate },
            bonds: ReturnProfile::Fixed { rate },
            cash: ReturnProfile::Fixed { rate },
            inflation: InflationProfile::None,
        }
    }

    #[must_use]
    pub fn us_historical() -> Self {
        Self {
            stocks: ReturnProfile::SP500_NORMAL,
            bonds: ReturnProfile::US_BONDS_NORMAL,
            cash: ReturnProfile::US_TBILLS_FIXED,
            inflation: InflationProfile::US_HISTORICAL_NORMAL,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stocks.validate()?;
        self.bonds.validate()?;
        self.cash.validate()?;
        self.inflation.validate()
    }
}

impl Default for MarketAssumptions {
    fn default() -> Self {
        Self::fixed(0.0)
    }
}

/// Sampled annual rates for one simulation year
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketYear {
    pub stocks: f64,
    pub bonds: f64,
    pub cash: f64,
    pub inflation: f64,
}

/// One run's market history, indexed by years since the simulation start
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketPath {
    years: Vec<MarketYear>,
}

impl MarketPath {
    /// Sample `num_years` of rates. Draw order is fixed (year by year, then
    /// stocks, bonds, cash, inflation) so a seed always yields the same path.
    pub fn sample<R: Rng + ?Sized>(
        rng: &mut R,
        assumptions: &MarketAssumptions,
        num_years: usize,
    ) -> Result<Self, CalculationError> {
        let mut years = Vec::with_capacity(num_years);
        for _ in 0..num_years {
            years.push(MarketYear {
                stocks: assumptions.stocks.sample(rng)?,
                bonds: assumptions.bonds.sample(rng)?,
                cash: assumptions.cash.sample(rng)?,
                inflation: assumptions.inflation.sample(rng)?,
            });
        }
        Ok(Self { years })
    }

    #[must_use]
    pub fn from_years(years: Vec<MarketYear>) -> Self {
        Self { years }
    }

    pub fn year(&self, year_index: usize) -> Result<&MarketYear, CalculationError> {
        self.years
            .get(year_index)
            .ok_or(CalculationError::InsufficientRateData(year_index))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.years.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }
}
