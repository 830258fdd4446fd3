//! Monte Carlo goal simulation
//!
//! Each trial contributes `monthly` then compounds the whole balance by a
//! freshly sampled growth factor `1 + N(return_rate / 12, σ)`, so sampling
//! noise applies to principal and contributions alike.
//!
//! Trials run in parallel. Every trial owns an RNG seeded from the base seed
//! and its index, which keeps seeded runs bit-reproducible regardless of
//! how rayon schedules them.

use crate::config::SimulationConfig;
use crate::engines::horizon_months;
use crate::error::OrchestrationError;
use crate::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const PERCENTILE_POINTS: [f64; 3] = [10.0, 50.0, 90.0];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationSummary {
    /// Fraction of trials whose final balance reached the target
    pub success_rate: f64,
    /// 10th / 50th / 90th percentile of final balances
    pub percentiles: [f64; 3],
    pub trials: usize,
}

#[derive(Debug, Clone, Default)]
pub struct GoalSimulator {
    config: SimulationConfig,
}

impl GoalSimulator {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Simulate with the configured trial count and seed
    pub fn simulate(
        &self,
        target: f64,
        monthly: f64,
        years: u32,
        return_rate: f64,
    ) -> Result<SimulationSummary> {
        self.simulate_with(
            target,
            monthly,
            years,
            return_rate,
            self.config.trials,
            self.config.seed,
        )
    }

    pub fn simulate_with(
        &self,
        target: f64,
        monthly: f64,
        years: u32,
        return_rate: f64,
        trials: usize,
        seed: Option<u64>,
    ) -> Result<SimulationSummary> {
        if trials == 0 {
            return Err(OrchestrationError::Domain(
                "simulation needs at least one trial".to_string(),
            ));
        }

        let growth = Normal::new(return_rate / 12.0, self.config.monthly_volatility)
            .map_err(|e| OrchestrationError::Domain(format!("invalid growth distribution: {}", e)))?;

        let base_seed = seed.unwrap_or_else(rand::random);
        let months = horizon_months(years)?;

        debug!(trials, months, seeded = seed.is_some(), "Running goal simulation");

        let mut finals: Vec<f64> = (0..trials)
            .into_par_iter()
            .map(|trial| {
                let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(trial as u64));
                let mut balance = 0.0;
                for _ in 0..months {
                    balance += monthly;
                    balance *= 1.0 + growth.sample(&mut rng);
                }
                balance
            })
            .collect();

        let successes = finals.iter().filter(|b| **b >= target).count();
        finals.sort_by(|a, b| a.total_cmp(b));

        Ok(SimulationSummary {
            success_rate: successes as f64 / trials as f64,
            percentiles: PERCENTILE_POINTS.map(|p| percentile(&finals, p)),
            trials,
        })
    }
}

/// Linear interpolation between closest ranks over a sorted slice
fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = p / 100.0 * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}
