//! Risk scoring and portfolio concentration analysis

use crate::engines::round_to;
use crate::error::OrchestrationError;
use crate::models::{Holding, Profile, RiskTolerance};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Factor weights: volatility, liquidity, concentration, horizon, loss capacity
const FACTOR_WEIGHTS: [f64; 5] = [0.30, 0.20, 0.15, 0.20, 0.15];

const TOP_HOLDINGS: usize = 3;

/// Five normalized risk factors, each in [0, 1]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RiskProfile {
    pub volatility: f64,
    pub liquidity_needs: f64,
    pub concentration: f64,
    pub time_horizon: f64,
    pub loss_capacity: f64,
}

impl RiskProfile {
    pub fn uniform(value: f64) -> Self {
        Self {
            volatility: value,
            liquidity_needs: value,
            concentration: value,
            time_horizon: value,
            loss_capacity: value,
        }
    }

    /// Heuristic factors for a profile without explicit ones
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            volatility: if profile.risk_tolerance == RiskTolerance::Aggressive {
                0.6
            } else {
                0.3
            },
            liquidity_needs: 0.4,
            concentration: 0.5,
            time_horizon: ((80.0 - profile.age as f64) / 60.0).clamp(0.0, 1.0),
            loss_capacity: if profile.annual_income > 100_000.0 { 0.7 } else { 0.4 },
        }
    }

    fn factors(&self) -> [f64; 5] {
        [
            self.volatility,
            self.liquidity_needs,
            self.concentration,
            self.time_horizon,
            self.loss_capacity,
        ]
    }

    pub fn validate(&self) -> Result<()> {
        const NAMES: [&str; 5] = [
            "volatility",
            "liquidity_needs",
            "concentration",
            "time_horizon",
            "loss_capacity",
        ];
        for (name, value) in NAMES.iter().zip(self.factors()) {
            if !(0.0..=1.0).contains(&value) {
                return Err(OrchestrationError::Domain(format!(
                    "risk factor {} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RiskClass {
    Conservative,
    Moderate,
    Aggressive,
}

impl RiskClass {
    pub fn from_score(score: f64) -> Self {
        if score < 30.0 {
            RiskClass::Conservative
        } else if score < 60.0 {
            RiskClass::Moderate
        } else {
            RiskClass::Aggressive
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConcentrationRisk {
    Low,
    Moderate,
    High,
}

impl ConcentrationRisk {
    pub fn from_hhi(hhi: f64) -> Self {
        if hhi < 1500.0 {
            ConcentrationRisk::Low
        } else if hhi < 2500.0 {
            ConcentrationRisk::Moderate
        } else {
            ConcentrationRisk::High
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskComponents {
    pub volatility: f64,
    pub liquidity: f64,
    pub concentration: f64,
    pub time_horizon: f64,
    pub loss_capacity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskScore {
    pub score: f64,
    pub classification: RiskClass,
    pub components: RiskComponents,
    pub benchmarks: BTreeMap<String, [f64; 5]>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioRisk {
    pub hhi_index: f64,
    pub concentration_risk: ConcentrationRisk,
    pub top_holdings: Vec<Holding>,
}

pub struct RiskAssessor {
    benchmarks: BTreeMap<String, [f64; 5]>,
}

impl RiskAssessor {
    pub fn new() -> Self {
        Self {
            benchmarks: BTreeMap::from([
                ("conservative".to_string(), [30.0, 70.0, 20.0, 40.0, 80.0]),
                ("moderate".to_string(), [50.0, 50.0, 50.0, 50.0, 50.0]),
                ("aggressive".to_string(), [80.0, 30.0, 70.0, 80.0, 30.0]),
            ]),
        }
    }

    pub fn calculate_risk_score(&self, profile: &RiskProfile) -> Result<RiskScore> {
        profile.validate()?;

        let raw: f64 = FACTOR_WEIGHTS
            .iter()
            .zip(profile.factors())
            .map(|(w, f)| w * f)
            .sum::<f64>()
            * 100.0;

        Ok(RiskScore {
            score: round_to(raw, 1),
            classification: RiskClass::from_score(raw),
            components: RiskComponents {
                volatility: profile.volatility * 100.0,
                liquidity: profile.liquidity_needs * 100.0,
                concentration: profile.concentration * 100.0,
                time_horizon: profile.time_horizon * 100.0,
                loss_capacity: profile.loss_capacity * 100.0,
            },
            benchmarks: self.benchmarks.clone(),
        })
    }

    /// Herfindahl-Hirschman concentration over holding values
    pub fn portfolio_risk_analysis(&self, holdings: &[Holding]) -> Result<PortfolioRisk> {
        if holdings.is_empty() {
            return Err(OrchestrationError::Domain(
                "portfolio has no holdings".to_string(),
            ));
        }
        if let Some(bad) = holdings.iter().find(|h| !h.value.is_finite() || h.value < 0.0) {
            return Err(OrchestrationError::Domain(format!(
                "holding '{}' has invalid value {}",
                bad.name, bad.value
            )));
        }

        let total: f64 = holdings.iter().map(|h| h.value).sum();
        if total <= 0.0 {
            return Err(OrchestrationError::Domain(
                "portfolio total value must be positive".to_string(),
            ));
        }

        let hhi = holdings
            .iter()
            .map(|h| {
                let share = h.value / total;
                share * share
            })
            .sum::<f64>()
            * 10_000.0;

        // Stable sort keeps insertion order among equal values
        let mut ranked = holdings.to_vec();
        ranked.sort_by(|a, b| b.value.total_cmp(&a.value));
        ranked.truncate(TOP_HOLDINGS);

        Ok(PortfolioRisk {
            hhi_index: round_to(hhi, 2),
            concentration_risk: ConcentrationRisk::from_hhi(hhi),
            top_holdings: ranked,
        })
    }
}

impl Default for RiskAssessor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RiskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskClass::Conservative => "Conservative",
            RiskClass::Moderate => "Moderate",
            RiskClass::Aggressive => "Aggressive",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for ConcentrationRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConcentrationRisk::Low => "Low",
            ConcentrationRisk::Moderate => "Moderate",
            ConcentrationRisk::High => "High",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_half_scores_fifty() {
        let assessor = RiskAssessor::new();
        let result = assessor
            .calculate_risk_score(&RiskProfile::uniform(0.5))
            .unwrap();

        assert_eq!(result.score, 50.0);
        assert_eq!(result.classification, RiskClass::Moderate);
        assert_eq!(result.components.volatility, 50.0);
        assert_eq!(result.benchmarks["moderate"], [50.0; 5]);
    }

    #[test]
    fn test_classification_boundaries() {
        assert_eq!(RiskClass::from_score(29.9), RiskClass::Conservative);
        assert_eq!(RiskClass::from_score(30.0), RiskClass::Moderate);
        assert_eq!(RiskClass::from_score(59.9), RiskClass::Moderate);
        assert_eq!(RiskClass::from_score(60.0), RiskClass::Aggressive);
    }

    #[test]
    fn test_classification_uses_unrounded_score() {
        let assessor = RiskAssessor::new();
        let mut profile = RiskProfile::uniform(0.0);
        profile.volatility = 0.9985;
        let result = assessor.calculate_risk_score(&profile).unwrap();

        assert_eq!(result.score, 30.0);
        assert_eq!(result.classification, RiskClass::Conservative);
    }

    #[test]
    fn test_factor_out_of_range_rejected() {
        let assessor = RiskAssessor::new();
        let mut profile = RiskProfile::uniform(0.5);
        profile.loss_capacity = 1.5;
        let err = assessor.calculate_risk_score(&profile).unwrap_err();
        assert!(err.to_string().contains("loss_capacity"));
    }

    #[test]
    fn test_two_equal_holdings_hhi() {
        let assessor = RiskAssessor::new();
        let result = assessor
            .portfolio_risk_analysis(&[Holding::new("A", 5000.0), Holding::new("B", 5000.0)])
            .unwrap();

        assert_eq!(result.hhi_index, 5000.0);
        assert_eq!(result.concentration_risk, ConcentrationRisk::High);
    }

    #[test]
    fn test_diversified_portfolio_is_low_risk() {
        let assessor = RiskAssessor::new();
        let holdings: Vec<Holding> = (0..10)
            .map(|i| Holding::new(format!("H{}", i), 1000.0))
            .collect();
        let result = assessor.portfolio_risk_analysis(&holdings).unwrap();

        assert_eq!(result.hhi_index, 1000.0);
        assert_eq!(result.concentration_risk, ConcentrationRisk::Low);
    }

    #[test]
    fn test_concentration_uses_unrounded_hhi() {
        let assessor = RiskAssessor::new();
        let mut holdings: Vec<Holding> = (0..6)
            .map(|i| Holding::new(format!("H{}", i), 1_000_000.0))
            .collect();
        holdings.push(Holding::new("Large", 1_703_176.0));
        let result = assessor.portfolio_risk_analysis(&holdings).unwrap();

        assert_eq!(result.hhi_index, 1500.0);
        assert_eq!(result.concentration_risk, ConcentrationRisk::Low);
    }

    #[test]
    fn test_top_holdings_ties_keep_insertion_order() {
        let assessor = RiskAssessor::new();
        let holdings = vec![
            Holding::new("small", 100.0),
            Holding::new("first_tie", 500.0),
            Holding::new("big", 900.0),
            Holding::new("second_tie", 500.0),
        ];
        let result = assessor.portfolio_risk_analysis(&holdings).unwrap();
        let names: Vec<&str> = result.top_holdings.iter().map(|h| h.name.as_str()).collect();

        assert_eq!(names, vec!["big", "first_tie", "second_tie"]);
    }

    #[test]
    fn test_empty_portfolio_is_domain_error() {
        let assessor = RiskAssessor::new();
        assert!(assessor.portfolio_risk_analysis(&[]).is_err());
        assert!(assessor
            .portfolio_risk_analysis(&[Holding::new("A", 0.0)])
            .is_err());
    }

    #[test]
    fn test_factors_derived_from_profile() {
        let mut profile = Profile::new(50, 150_000.0, RiskTolerance::Aggressive);
        profile.monthly_investment = Some(1000.0);
        let factors = RiskProfile::from_profile(&profile);

        assert_eq!(factors.volatility, 0.6);
        assert_eq!(factors.loss_capacity, 0.7);
        assert!((factors.time_horizon - 0.5).abs() < 1e-12);
        assert!(factors.validate().is_ok());
    }
}
