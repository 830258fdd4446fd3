//! Quantitative engines
//!
//! Pure, deterministic financial calculators. No I/O, no shared state.
//! The executor reaches them through the tool registry.

pub mod budget;
pub mod goal_sim;
pub mod risk;
pub mod sip;

pub use budget::{BudgetAnalyzer, BudgetReport, CategoryDeviation};
pub use goal_sim::{GoalSimulator, SimulationSummary};
pub use risk::{ConcentrationRisk, PortfolioRisk, RiskAssessor, RiskClass, RiskProfile, RiskScore};
pub use sip::{SipCalculator, SipProjection};

use crate::error::OrchestrationError;
use crate::Result;

/// Longest horizon any engine will project
pub const MAX_HORIZON_YEARS: u32 = 100;

pub(crate) fn horizon_months(years: u32) -> Result<u32> {
    if years > MAX_HORIZON_YEARS {
        return Err(OrchestrationError::Domain(format!(
            "horizon of {} years exceeds the {} year limit",
            years, MAX_HORIZON_YEARS
        )));
    }
    Ok(years * 12)
}

/// Round half away from zero to `places` decimals
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
