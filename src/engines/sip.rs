//! Systematic Investment Plan projection
//!
//! Ordinary-annuity compounding of a fixed monthly contribution at the
//! allocation-weighted historical return.

use crate::config::ReturnTable;
use crate::engines::horizon_months;
use crate::error::OrchestrationError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SipProjection {
    pub total_invested: f64,
    pub future_value: f64,
    /// Approximate annualized return: (FV / invested)^(1/years) - 1
    pub xirr: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SipCalculator {
    returns: ReturnTable,
}

impl SipCalculator {
    pub fn new(returns: ReturnTable) -> Self {
        Self { returns }
    }

    pub fn returns(&self) -> &ReturnTable {
        &self.returns
    }

    /// Σ weight × annual_rate over the mix
    pub fn weighted_annual_return(&self, asset_mix: &BTreeMap<String, f64>) -> Result<f64> {
        let mut weighted = 0.0;
        for (asset, weight) in asset_mix {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(OrchestrationError::Domain(format!(
                    "invalid weight {} for asset class '{}'",
                    weight, asset
                )));
            }
            let rate = self.returns.rate(asset).ok_or_else(|| {
                OrchestrationError::Domain(format!("no historical return for asset class '{}'", asset))
            })?;
            weighted += rate * weight;
        }
        Ok(weighted)
    }

    pub fn project(
        &self,
        amount: f64,
        years: u32,
        asset_mix: &BTreeMap<String, f64>,
    ) -> Result<SipProjection> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(OrchestrationError::Domain(format!(
                "monthly amount must be a non-negative number, got {}",
                amount
            )));
        }

        let monthly_rate = self.weighted_annual_return(asset_mix)? / 12.0;
        let months = horizon_months(years)?;
        let total_invested = amount * months as f64;

        if total_invested == 0.0 {
            return Err(OrchestrationError::Domain(
                "total invested is zero; annualized return is undefined".to_string(),
            ));
        }

        let future_value = if monthly_rate == 0.0 {
            amount * months as f64
        } else {
            amount * (((1.0 + monthly_rate).powi(months as i32) - 1.0) / monthly_rate)
        };

        if !future_value.is_finite() {
            return Err(OrchestrationError::Domain(format!(
                "future value overflowed for {} months at monthly rate {}",
                months, monthly_rate
            )));
        }

        let xirr = (future_value / total_invested).powf(1.0 / years as f64) - 1.0;

        Ok(SipProjection {
            total_invested,
            future_value,
            xirr,
        })
    }
}
