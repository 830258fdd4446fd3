//! Runtime configuration
//!
//! Every orchestrator instance receives its configuration explicitly.
//! `AppConfig::from_env` reads the process environment (call
//! `dotenv::dotenv()` first if a `.env` file should be honoured).

use crate::error::OrchestrationError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_GEMINI_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

/// Historical annual return per asset class
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ReturnTable {
    rates: BTreeMap<String, f64>,
}

impl ReturnTable {
    pub fn new(rates: BTreeMap<String, f64>) -> Self {
        Self { rates }
    }

    pub fn rate(&self, asset_class: &str) -> Option<f64> {
        self.rates.get(&asset_class.to_lowercase()).copied()
    }

    pub fn with_rate(mut self, asset_class: &str, rate: f64) -> Self {
        self.rates.insert(asset_class.to_lowercase(), rate);
        self
    }

    pub fn asset_classes(&self) -> impl Iterator<Item = &str> {
        self.rates.keys().map(|s| s.as_str())
    }
}

impl Default for ReturnTable {
    fn default() -> Self {
        Self::new(BTreeMap::from([
            ("equity".to_string(), 0.12),
            ("debt".to_string(), 0.07),
            ("hybrid".to_string(), 0.09),
        ]))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationConfig {
    pub trials: usize,
    /// Fixed seed for reproducible runs; fresh entropy when `None`
    pub seed: Option<u64>,
    /// Monthly standard deviation of the sampled growth factor
    pub monthly_volatility: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            trials: 1000,
            seed: None,
            monthly_volatility: 0.02,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowConfig {
    /// Plan generator attempts while it keeps returning an error plan
    pub plan_attempts: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self { plan_attempts: 1 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub gemini_api_key: Option<String>,
    pub gemini_url: String,
    pub database_url: Option<String>,
    pub api_port: u16,
    pub returns: ReturnTable,
    pub simulation: SimulationConfig,
    pub workflow: WorkflowConfig,
    pub memory_snapshot_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mut returns = ReturnTable::default();
        for (var, class) in [
            ("RETURN_EQUITY", "equity"),
            ("RETURN_DEBT", "debt"),
            ("RETURN_HYBRID", "hybrid"),
        ] {
            if let Some(rate) = parse_var::<f64>(var)? {
                returns = returns.with_rate(class, rate);
            }
        }

        let defaults = SimulationConfig::default();
        let simulation = SimulationConfig {
            trials: parse_var("SIM_TRIALS")?.unwrap_or(defaults.trials),
            seed: parse_var("SIM_SEED")?,
            monthly_volatility: parse_var("SIM_MONTHLY_VOLATILITY")?
                .unwrap_or(defaults.monthly_volatility),
        };

        let workflow = WorkflowConfig {
            plan_attempts: parse_var("PLAN_ATTEMPTS")?.unwrap_or(1).max(1),
        };

        let api_port = match parse_var::<u16>("PORT")? {
            Some(port) => port,
            None => parse_var("API_PORT")?.unwrap_or(8080),
        };

        Ok(Self {
            gemini_api_key: non_empty_var("GEMINI_API_KEY"),
            gemini_url: non_empty_var("GEMINI_MODEL_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_URL.to_string()),
            database_url: non_empty_var("DATABASE_URL"),
            api_port,
            returns,
            simulation,
            workflow,
            memory_snapshot_path: non_empty_var("MEMORY_SNAPSHOT_PATH").map(PathBuf::from),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| OrchestrationError::Config(format!("{}={:?}: {}", name, raw, e))),
        None => Ok(None),
    }
}
