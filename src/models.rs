//! Core data models for the planning pipeline

use crate::engines::risk::RiskProfile;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    #[serde(alias = "Conservative", alias = "low")]
    Conservative,
    #[default]
    #[serde(alias = "Moderate", alias = "medium")]
    Moderate,
    #[serde(alias = "Aggressive", alias = "high")]
    Aggressive,
}

//
// ================= Profile =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Holding {
    pub name: String,
    pub value: f64,
}

impl Holding {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Immutable input to a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default = "Uuid::new_v4")]
    pub profile_id: Uuid,
    pub age: u32,
    pub annual_income: f64,
    #[serde(default)]
    pub risk_tolerance: RiskTolerance,
    /// Monthly amount available for systematic investment
    #[serde(default)]
    pub monthly_investment: Option<f64>,
    #[serde(default)]
    pub investment_horizon_years: Option<u32>,
    /// Insertion order is significant (ties in top-holdings ranking)
    #[serde(default)]
    pub holdings: Vec<Holding>,
    /// Explicit risk factors; derived from the profile when absent
    #[serde(default)]
    pub risk_factors: Option<RiskProfile>,
    /// Monthly budget per spending category
    #[serde(default)]
    pub budget: BTreeMap<String, f64>,
}

impl Profile {
    pub fn new(age: u32, annual_income: f64, risk_tolerance: RiskTolerance) -> Self {
        Self {
            profile_id: Uuid::new_v4(),
            age,
            annual_income,
            risk_tolerance,
            monthly_investment: None,
            investment_horizon_years: None,
            holdings: Vec::new(),
            risk_factors: None,
            budget: BTreeMap::new(),
        }
    }
}

//
// ================= Goals =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoalTarget {
    #[serde(alias = "goal", alias = "goal_name", alias = "name")]
    pub description: String,
    #[serde(alias = "target_amount")]
    pub target: f64,
    #[serde(alias = "timeframe", alias = "time_frame")]
    pub years: u32,
    #[serde(default)]
    pub priority: Option<u8>,
}

/// A goal descriptor: free text or a target/timeframe/priority triple
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum GoalItem {
    Target(GoalTarget),
    Text(String),
}

impl GoalItem {
    pub fn description(&self) -> &str {
        match self {
            GoalItem::Target(t) => &t.description,
            GoalItem::Text(s) => s,
        }
    }

    pub fn target(&self) -> Option<&GoalTarget> {
        match self {
            GoalItem::Target(t) => Some(t),
            GoalItem::Text(_) => None,
        }
    }
}

impl fmt::Display for GoalItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalItem::Target(t) => write!(
                f,
                "{} (target {:.0} in {} years{})",
                t.description,
                t.target,
                t.years,
                t.priority
                    .map(|p| format!(", priority {}", p))
                    .unwrap_or_default()
            ),
            GoalItem::Text(s) => write!(f, "{}", s),
        }
    }
}

//
// ================= Generated Output =================
//

/// Outcome of parsing generated text: structured data or a failure message.
/// Consumers must branch on the tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", content = "data", rename_all = "lowercase")]
pub enum Parsed<T> {
    Ok(T),
    Error(String),
}

impl<T> Parsed<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Parsed::Ok(_))
    }

    pub fn as_ok(&self) -> Option<&T> {
        match self {
            Parsed::Ok(v) => Some(v),
            Parsed::Error(_) => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Parsed::Ok(_) => None,
            Parsed::Error(msg) => Some(msg),
        }
    }
}

//
// ================= Plan =================
//

pub const MAX_SHORT_TERM_GOALS: usize = 3;
pub const MAX_LONG_TERM_GOALS: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub short_term_goals: Vec<GoalItem>,
    pub long_term_goals: Vec<GoalItem>,
    /// Asset class → weight
    pub allocation: BTreeMap<String, f64>,
}

impl Plan {
    /// Longest structured goal horizon, in years
    pub fn horizon_years(&self) -> Option<u32> {
        self.short_term_goals
            .iter()
            .chain(self.long_term_goals.iter())
            .filter_map(GoalItem::target)
            .map(|t| t.years)
            .max()
    }
}

pub type PlanOutcome = Parsed<Plan>;

//
// ================= Insights =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Insights {
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub adjustments: Vec<String>,
}

pub type InsightsOutcome = Parsed<Insights>;

//
// ================= Tool I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    /// Key under which the output lands in `Results`
    pub key: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolOutput {
    pub success: bool,
    pub data: serde_json::Value,
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}

/// Tool key → tool output, mixing successes and per-key failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct Results {
    pub outputs: BTreeMap<String, ToolOutput>,
}

impl Results {
    pub fn get(&self, key: &str) -> Option<&ToolOutput> {
        self.outputs.get(key)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&String, &ToolOutput)> {
        self.outputs.iter().filter(|(_, o)| !o.success)
    }
}

//
// ================= Transactions =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub date: NaiveDate,
    pub amount: f64,
    pub category: String,
    #[serde(default)]
    pub description: String,
}

impl Transaction {
    /// Month key in `YYYY-MM` form
    pub fn month(&self) -> String {
        self.date.format("%Y-%m").to_string()
    }
}

impl fmt::Display for RiskTolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskTolerance::Conservative => "Conservative",
            RiskTolerance::Moderate => "Moderate",
            RiskTolerance::Aggressive => "Aggressive",
        };
        write!(f, "{}", s)
    }
}
