//! Tool trait and registry
//!
//! Tools are deterministic, side-effect-free wrappers over the quantitative
//! engines. Each tool declares its required parameters and decides which
//! invocations a given plan shape calls for.

use crate::config::{ReturnTable, SimulationConfig};
use crate::engines::{BudgetAnalyzer, GoalSimulator, RiskAssessor, RiskProfile, SipCalculator};
use crate::error::OrchestrationError;
use crate::models::{Holding, Plan, Profile, ToolInput, Transaction};
use crate::Result;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Everything a tool may read when deciding its invocations
pub struct ToolContext<'a> {
    pub plan: &'a Plan,
    pub profile: &'a Profile,
    pub transactions: &'a [Transaction],
}

/// Trait for a single tool (deterministic execution)
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Parameters that must be present in every input
    fn required_params(&self) -> &'static [&'static str];
    /// Invocations this plan shape calls for; empty when not applicable
    fn invocations(&self, ctx: &ToolContext<'_>) -> Vec<ToolInput>;
    fn execute(&self, input: &ToolInput) -> Result<Value>;
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// All invocations the registered tools derive from a plan, in name order
    pub fn applicable(&self, ctx: &ToolContext<'_>) -> Vec<ToolInput> {
        self.list()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .flat_map(|tool| tool.invocations(ctx))
            .collect()
    }

    /// Validate the input against the tool's declared parameters, then run it
    pub fn invoke(&self, input: &ToolInput) -> Result<Value> {
        let tool = self
            .get(&input.tool_name)
            .ok_or_else(|| OrchestrationError::ToolNotFound(input.tool_name.clone()))?;

        ensure_object_parameters(input)?;
        if let Some(missing) = tool
            .required_params()
            .iter()
            .find(|p| input.parameters.get(**p).map_or(true, Value::is_null))
        {
            return Err(OrchestrationError::InvalidToolInput(format!(
                "{} requires parameter '{}'",
                tool.name(),
                missing
            )));
        }

        tool.execute(input)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_object_parameters(input: &ToolInput) -> Result<()> {
    if input.parameters.is_object() {
        Ok(())
    } else {
        Err(OrchestrationError::InvalidToolInput(
            "tool parameters must be a JSON object".to_string(),
        ))
    }
}

fn param<T: DeserializeOwned>(input: &ToolInput, name: &str) -> Result<T> {
    let value = input.parameters.get(name).cloned().ok_or_else(|| {
        OrchestrationError::InvalidToolInput(format!("missing parameter '{}'", name))
    })?;
    serde_json::from_value(value).map_err(|e| {
        OrchestrationError::InvalidToolInput(format!("parameter '{}' is malformed: {}", name, e))
    })
}

fn single_input(tool: &dyn Tool, parameters: Value) -> Vec<ToolInput> {
    vec![ToolInput {
        tool_name: tool.name().to_string(),
        key: tool.name().to_string(),
        parameters,
    }]
}

//
// ================= SIP =================
//

pub struct SipCalculatorTool {
    calculator: SipCalculator,
}

impl SipCalculatorTool {
    pub fn new(calculator: SipCalculator) -> Self {
        Self { calculator }
    }
}

impl Tool for SipCalculatorTool {
    fn name(&self) -> &'static str {
        "sip_calculator"
    }

    fn description(&self) -> &'static str {
        "Project a monthly SIP at the allocation-weighted historical return"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["amount", "years", "asset_mix"]
    }

    fn invocations(&self, ctx: &ToolContext<'_>) -> Vec<ToolInput> {
        let amount = ctx.profile.monthly_investment.filter(|m| *m > 0.0);
        let years = ctx
            .plan
            .horizon_years()
            .or(ctx.profile.investment_horizon_years)
            .filter(|y| *y > 0);

        match (amount, years) {
            (Some(amount), Some(years)) => single_input(
                self,
                json!({
                    "amount": amount,
                    "years": years,
                    "asset_mix": ctx.plan.allocation,
                }),
            ),
            _ => Vec::new(),
        }
    }

    fn execute(&self, input: &ToolInput) -> Result<Value> {
        let amount: f64 = param(input, "amount")?;
        let years: u32 = param(input, "years")?;
        let asset_mix: BTreeMap<String, f64> = param(input, "asset_mix")?;

        let projection = self.calculator.project(amount, years, &asset_mix)?;
        Ok(serde_json::to_value(projection)?)
    }
}

//
// ================= Goal simulation =================
//

pub struct GoalSimulatorTool {
    simulator: GoalSimulator,
    rates: SipCalculator,
}

impl GoalSimulatorTool {
    pub fn new(simulator: GoalSimulator, returns: ReturnTable) -> Self {
        Self {
            simulator,
            rates: SipCalculator::new(returns),
        }
    }
}

impl Tool for GoalSimulatorTool {
    fn name(&self) -> &'static str {
        "goal_simulator"
    }

    fn description(&self) -> &'static str {
        "Monte Carlo probability of reaching a goal target"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["target", "monthly", "years"]
    }

    /// One invocation per long-term goal. Text goals carry no target and
    /// fail input validation under their own key.
    fn invocations(&self, ctx: &ToolContext<'_>) -> Vec<ToolInput> {
        ctx.plan
            .long_term_goals
            .iter()
            .enumerate()
            .map(|(i, goal)| {
                let mut parameters = json!({
                    "goal": goal.description(),
                    "monthly": ctx.profile.monthly_investment,
                    "asset_mix": ctx.plan.allocation,
                });
                if let Some(target) = goal.target() {
                    parameters["target"] = json!(target.target);
                    parameters["years"] = json!(target.years);
                }
                ToolInput {
                    tool_name: self.name().to_string(),
                    key: format!("{}[{}]", self.name(), i),
                    parameters,
                }
            })
            .collect()
    }

    fn execute(&self, input: &ToolInput) -> Result<Value> {
        let target: f64 = param(input, "target")?;
        let monthly: f64 = param(input, "monthly")?;
        let years: u32 = param(input, "years")?;

        let return_rate = match input.parameters.get("return_rate").and_then(Value::as_f64) {
            Some(rate) => rate,
            None => {
                let asset_mix: BTreeMap<String, f64> = param(input, "asset_mix")?;
                self.rates.weighted_annual_return(&asset_mix)?
            }
        };

        let summary = self.simulator.simulate(target, monthly, years, return_rate)?;

        Ok(json!({
            "goal": input.parameters.get("goal").cloned().unwrap_or(Value::Null),
            "target": target,
            "years": years,
            "return_rate": return_rate,
            "success_rate": summary.success_rate,
            "percentiles": summary.percentiles,
            "trials": summary.trials,
        }))
    }
}

//
// ================= Risk =================
//

pub struct RiskAssessorTool {
    assessor: RiskAssessor,
}

impl RiskAssessorTool {
    pub fn new(assessor: RiskAssessor) -> Self {
        Self { assessor }
    }
}

impl Tool for RiskAssessorTool {
    fn name(&self) -> &'static str {
        "risk_assessor"
    }

    fn description(&self) -> &'static str {
        "Weighted five-factor risk score and classification"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["risk_profile"]
    }

    fn invocations(&self, ctx: &ToolContext<'_>) -> Vec<ToolInput> {
        let factors = ctx
            .profile
            .risk_factors
            .unwrap_or_else(|| RiskProfile::from_profile(ctx.profile));
        single_input(self, json!({ "risk_profile": factors }))
    }

    fn execute(&self, input: &ToolInput) -> Result<Value> {
        let factors: RiskProfile = param(input, "risk_profile")?;
        let score = self.assessor.calculate_risk_score(&factors)?;
        Ok(serde_json::to_value(score)?)
    }
}

pub struct PortfolioRiskTool {
    assessor: RiskAssessor,
}

impl PortfolioRiskTool {
    pub fn new(assessor: RiskAssessor) -> Self {
        Self { assessor }
    }
}

impl Tool for PortfolioRiskTool {
    fn name(&self) -> &'static str {
        "portfolio_risk"
    }

    fn description(&self) -> &'static str {
        "Herfindahl-Hirschman concentration of current holdings"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["holdings"]
    }

    fn invocations(&self, ctx: &ToolContext<'_>) -> Vec<ToolInput> {
        if ctx.profile.holdings.is_empty() {
            return Vec::new();
        }
        single_input(self, json!({ "holdings": ctx.profile.holdings }))
    }

    fn execute(&self, input: &ToolInput) -> Result<Value> {
        let holdings: Vec<Holding> = param(input, "holdings")?;
        let analysis = self.assessor.portfolio_risk_analysis(&holdings)?;
        Ok(serde_json::to_value(analysis)?)
    }
}

//
// ================= Budget =================
//

pub struct BudgetAnalyzerTool;

impl Tool for BudgetAnalyzerTool {
    fn name(&self) -> &'static str {
        "budget_analyzer"
    }

    fn description(&self) -> &'static str {
        "Monthly spend vs budget deviation per category"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["transactions", "budget"]
    }

    fn invocations(&self, ctx: &ToolContext<'_>) -> Vec<ToolInput> {
        if ctx.profile.budget.is_empty() {
            return Vec::new();
        }
        single_input(
            self,
            json!({
                "transactions": ctx.transactions,
                "budget": ctx.profile.budget,
            }),
        )
    }

    fn execute(&self, input: &ToolInput) -> Result<Value> {
        let transactions: Vec<Transaction> = param(input, "transactions")?;
        let budget: BTreeMap<String, f64> = param(input, "budget")?;
        let report = BudgetAnalyzer::analyze(&transactions, &budget);
        Ok(serde_json::to_value(report)?)
    }
}

/// Create a registry with every quantitative engine
pub fn create_default_registry(returns: ReturnTable, simulation: SimulationConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(SipCalculatorTool::new(SipCalculator::new(
        returns.clone(),
    ))));
    registry.register(Arc::new(GoalSimulatorTool::new(
        GoalSimulator::new(simulation),
        returns,
    )));
    registry.register(Arc::new(RiskAssessorTool::new(RiskAssessor::new())));
    registry.register(Arc::new(PortfolioRiskTool::new(RiskAssessor::new())));
    registry.register(Arc::new(BudgetAnalyzerTool));

    registry
}
