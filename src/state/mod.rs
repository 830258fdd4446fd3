//! Workflow state threaded through the pipeline
//!
//! Each stage writes exactly one field. Writes are checked against the
//! current stage so no stage can overwrite another's output.

use crate::error::OrchestrationError;
use crate::models::{GoalItem, InsightsOutcome, PlanOutcome, Profile, Results};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Init,
    Planning,
    Executing,
    Reflecting,
    Done,
}

impl Stage {
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Init => Some(Stage::Planning),
            Stage::Planning => Some(Stage::Executing),
            Stage::Executing => Some(Stage::Reflecting),
            Stage::Reflecting => Some(Stage::Done),
            Stage::Done => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Init => "INIT",
            Stage::Planning => "PLAN",
            Stage::Executing => "EXECUTE",
            Stage::Reflecting => "REFLECT",
            Stage::Done => "DONE",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub goals: Vec<GoalItem>,
    pub profile: Profile,
    plan: Option<PlanOutcome>,
    results: Option<Results>,
    insights: Option<InsightsOutcome>,
    stage: Stage,
    trace: Vec<String>,
}

impl WorkflowState {
    pub fn new(profile: Profile, goals: Vec<GoalItem>) -> Self {
        Self {
            goals,
            profile,
            plan: None,
            results: None,
            insights: None,
            stage: Stage::Init,
            trace: vec!["INIT: profile received".to_string()],
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn plan(&self) -> Option<&PlanOutcome> {
        self.plan.as_ref()
    }

    pub fn results(&self) -> Option<&Results> {
        self.results.as_ref()
    }

    pub fn insights(&self) -> Option<&InsightsOutcome> {
        self.insights.as_ref()
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    pub fn note(&mut self, entry: impl Into<String>) {
        self.trace.push(entry.into());
    }

    /// Move to the next stage; `Done` is terminal
    pub fn advance(&mut self) -> Result<Stage> {
        let next = self.stage.next().ok_or_else(|| {
            OrchestrationError::StageOrder("workflow already finished".to_string())
        })?;
        self.stage = next;
        self.trace.push(format!("{}: entered", next));
        Ok(next)
    }

    fn expect_stage(&self, expected: Stage, field: &str) -> Result<()> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(OrchestrationError::StageOrder(format!(
                "{} may only be written during {}, current stage is {}",
                field, expected, self.stage
            )))
        }
    }

    /// Planning may write the plan more than once (caller retries)
    pub fn record_plan(&mut self, plan: PlanOutcome) -> Result<()> {
        self.expect_stage(Stage::Planning, "plan")?;
        self.plan = Some(plan);
        Ok(())
    }

    pub fn record_results(&mut self, results: Results) -> Result<()> {
        self.expect_stage(Stage::Executing, "results")?;
        if self.results.is_some() {
            return Err(OrchestrationError::StageOrder(
                "results already recorded".to_string(),
            ));
        }
        self.results = Some(results);
        Ok(())
    }

    pub fn record_insights(&mut self, insights: InsightsOutcome) -> Result<()> {
        self.expect_stage(Stage::Reflecting, "insights")?;
        if self.insights.is_some() {
            return Err(OrchestrationError::StageOrder(
                "insights already recorded".to_string(),
            ));
        }
        self.insights = Some(insights);
        Ok(())
    }
}
