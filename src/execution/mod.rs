//! Execution engine for deterministic plan execution
//!
//! Turns a plan into tool invocations and runs them on blocking workers.
//! LLM is NOT allowed here.

use crate::error::OrchestrationError;
use crate::models::{PlanOutcome, Profile, Results, ToolInput, ToolOutput};
use crate::store::TransactionStore;
use crate::tools::{ToolContext, ToolRegistry};
use crate::Result;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const BUDGET_TOOL: &str = "budget_analyzer";

pub struct ExecutionEngine {
    tool_registry: Arc<ToolRegistry>,
    transactions: Arc<dyn TransactionStore>,
}

impl ExecutionEngine {
    pub fn new(tool_registry: Arc<ToolRegistry>, transactions: Arc<dyn TransactionStore>) -> Self {
        Self {
            tool_registry,
            transactions,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.tool_registry
    }

    /// Run every applicable tool against the plan.
    ///
    /// Refuses an `Error` plan. Individual tool failures land in `Results`
    /// under their own key and never abort sibling invocations.
    pub async fn execute(&self, plan: &PlanOutcome, profile: &Profile) -> Result<Results> {
        let plan = match plan {
            PlanOutcome::Ok(plan) => plan,
            PlanOutcome::Error(message) => {
                warn!(error = %message, "Refusing to execute error plan");
                return Err(OrchestrationError::InvalidPlan(message.clone()));
            }
        };

        let mut store_error = None;
        let transactions = if profile.budget.is_empty() {
            Vec::new()
        } else {
            match self.transactions.transactions(None).await {
                Ok(transactions) => transactions,
                Err(e) => {
                    warn!(error = %e, "Failed to load transactions for budget analysis");
                    store_error = Some(e.to_string());
                    Vec::new()
                }
            }
        };

        let ctx = ToolContext {
            plan,
            profile,
            transactions: &transactions,
        };
        let invocations = self.tool_registry.applicable(&ctx);

        debug!(
            invocation_count = invocations.len(),
            "Starting plan execution"
        );

        let mut results = Results::default();
        for (key, output) in self.run_all(invocations, store_error).await {
            results.outputs.insert(key, output);
        }

        info!(
            tool_count = results.len(),
            failures = results.failures().count(),
            "Plan execution completed"
        );

        Ok(results)
    }

    /// Spawn every invocation, then collect in spawn order
    async fn run_all(
        &self,
        invocations: Vec<ToolInput>,
        store_error: Option<String>,
    ) -> Vec<(String, ToolOutput)> {
        let mut pending = Vec::with_capacity(invocations.len());

        for input in invocations {
            let key = input.key.clone();

            if let (BUDGET_TOOL, Some(message)) = (input.tool_name.as_str(), &store_error) {
                pending.push((key, Pending::Failed(message.clone())));
                continue;
            }

            let registry = Arc::clone(&self.tool_registry);
            let handle = tokio::task::spawn_blocking(move || {
                let start = Instant::now();
                let outcome = registry.invoke(&input);
                (outcome, start.elapsed().as_millis() as u64)
            });
            pending.push((key, Pending::Scheduled(handle)));
        }

        let mut outputs = Vec::with_capacity(pending.len());
        for (key, task) in pending {
            let output = match task {
                Pending::Failed(message) => ToolOutput::failed(message),
                Pending::Scheduled(handle) => match handle.await {
                    Ok((Ok(data), elapsed_ms)) => {
                        debug!(key = %key, elapsed_ms, "Tool completed");
                        ToolOutput::ok(data)
                    }
                    Ok((Err(e), elapsed_ms)) => {
                        warn!(key = %key, elapsed_ms, error = %e, "Tool execution failed");
                        ToolOutput::failed(e.to_string())
                    }
                    Err(join_error) => {
                        warn!(key = %key, error = %join_error, "Tool task aborted");
                        let reason = if join_error.is_panic() {
                            "tool panicked"
                        } else {
                            "tool task was cancelled"
                        };
                        ToolOutput::failed(OrchestrationError::Tool(reason.to_string()).to_string())
                    }
                },
            };
            outputs.push((key, output));
        }

        outputs
    }
}

enum Pending {
    Scheduled(JoinHandle<(Result<Value>, u64)>),
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReturnTable, SimulationConfig};
    use crate::models::{GoalItem, GoalTarget, Holding, Plan, RiskTolerance, Transaction};
    use crate::store::InMemoryTransactionStore;
    use crate::tools::{create_default_registry, Tool};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn registry() -> ToolRegistry {
        create_default_registry(
            ReturnTable::default(),
            SimulationConfig {
                trials: 100,
                seed: Some(3),
                ..SimulationConfig::default()
            },
        )
    }

    fn engine_with(registry: ToolRegistry, store: Arc<dyn TransactionStore>) -> ExecutionEngine {
        ExecutionEngine::new(Arc::new(registry), store)
    }

    fn plan() -> Plan {
        Plan {
            short_term_goals: vec![GoalItem::Text("Emergency fund".into())],
            long_term_goals: vec![GoalItem::Target(GoalTarget {
                description: "Retirement".into(),
                target: 400_000.0,
                years: 20,
                priority: Some(1),
            })],
            allocation: BTreeMap::from([
                ("equity".to_string(), 0.6),
                ("debt".to_string(), 0.3),
                ("hybrid".to_string(), 0.1),
            ]),
        }
    }

    fn profile() -> Profile {
        let mut profile = Profile::new(32, 85_000.0, RiskTolerance::Aggressive);
        profile.monthly_investment = Some(1_000.0);
        profile
    }

    #[tokio::test]
    async fn test_error_plan_is_refused() {
        let engine = engine_with(registry(), Arc::new(InMemoryTransactionStore::new()));
        let err = engine
            .execute(&PlanOutcome::Error("bad json".into()), &profile())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidPlan(_)));
    }

    #[tokio::test]
    async fn test_executes_applicable_tools() {
        let mut profile = profile();
        profile.budget = BTreeMap::from([("Dining".to_string(), 80.0)]);
        let store = InMemoryTransactionStore::with_transactions(vec![Transaction {
            date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            amount: 100.0,
            category: "Dining".into(),
            description: String::new(),
        }]);
        let engine = engine_with(registry(), Arc::new(store));

        let results = engine
            .execute(&PlanOutcome::Ok(plan()), &profile)
            .await
            .unwrap();

        let keys: Vec<&str> = results.outputs.keys().map(|k| k.as_str()).collect();
        assert_eq!(
            keys,
            vec!["budget_analyzer", "goal_simulator[0]", "risk_assessor", "sip_calculator"]
        );
        assert_eq!(results.failures().count(), 0);
        assert_eq!(
            results.get("budget_analyzer").unwrap().data["2024-03"]["Dining"]["deviation"],
            20.0
        );
    }

    #[tokio::test]
    async fn test_full_profile_runs_one_invocation_per_key() {
        let mut plan = plan();
        plan.long_term_goals.push(GoalItem::Target(GoalTarget {
            description: "House".into(),
            target: 90_000.0,
            years: 8,
            priority: Some(2),
        }));
        let mut profile = profile();
        profile.holdings = vec![Holding::new("Index", 7_000.0), Holding::new("Bonds", 3_000.0)];
        profile.budget = BTreeMap::from([("Dining".to_string(), 80.0)]);
        let engine = engine_with(registry(), Arc::new(InMemoryTransactionStore::new()));

        let results = engine
            .execute(&PlanOutcome::Ok(plan), &profile)
            .await
            .unwrap();

        let keys: Vec<&str> = results.outputs.keys().map(|k| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "budget_analyzer",
                "goal_simulator[0]",
                "goal_simulator[1]",
                "portfolio_risk",
                "risk_assessor",
                "sip_calculator"
            ]
        );
    }

    struct PanickingTool;

    impl Tool for PanickingTool {
        fn name(&self) -> &'static str {
            "risk_assessor"
        }
        fn description(&self) -> &'static str {
            "always panics"
        }
        fn required_params(&self) -> &'static [&'static str] {
            &[]
        }
        fn invocations(&self, _ctx: &ToolContext<'_>) -> Vec<ToolInput> {
            vec![ToolInput {
                tool_name: self.name().to_string(),
                key: self.name().to_string(),
                parameters: json!({}),
            }]
        }
        fn execute(&self, _input: &ToolInput) -> Result<Value> {
            panic!("engine bug")
        }
    }

    #[tokio::test]
    async fn test_panicking_tool_does_not_abort_siblings() {
        let mut registry = registry();
        registry.register(Arc::new(PanickingTool));
        let engine = engine_with(registry, Arc::new(InMemoryTransactionStore::new()));

        let results = engine
            .execute(&PlanOutcome::Ok(plan()), &profile())
            .await
            .unwrap();

        let failed = results.get("risk_assessor").unwrap();
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("Tool error: tool panicked"));
        assert!(results.get("sip_calculator").unwrap().success);
        assert!(results.get("goal_simulator[0]").unwrap().success);
    }

    #[tokio::test]
    async fn test_text_goal_fails_under_its_own_key() {
        let mut plan = plan();
        plan.long_term_goals.push(GoalItem::Text("Be comfortable".into()));
        let engine = engine_with(registry(), Arc::new(InMemoryTransactionStore::new()));

        let results = engine
            .execute(&PlanOutcome::Ok(plan), &profile())
            .await
            .unwrap();

        assert!(results.get("goal_simulator[0]").unwrap().success);
        let text_goal = results.get("goal_simulator[1]").unwrap();
        assert!(!text_goal.success);
        assert!(text_goal.error.as_ref().unwrap().contains("target"));
    }

    struct FailingStore;

    #[async_trait]
    impl TransactionStore for FailingStore {
        async fn add_transaction(&self, _transaction: Transaction) -> Result<()> {
            Err(OrchestrationError::Database("offline".into()))
        }
        async fn transactions(&self, _month: Option<&str>) -> Result<Vec<Transaction>> {
            Err(OrchestrationError::Database("offline".into()))
        }
        async fn add_goal(&self, _goal: GoalTarget) -> Result<()> {
            Err(OrchestrationError::Database("offline".into()))
        }
        async fn goals(&self) -> Result<Vec<GoalTarget>> {
            Err(OrchestrationError::Database("offline".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_only_affects_budget_key() {
        let mut profile = profile();
        profile.budget = BTreeMap::from([("Rent".to_string(), 1_200.0)]);
        let engine = engine_with(registry(), Arc::new(FailingStore));

        let results = engine
            .execute(&PlanOutcome::Ok(plan()), &profile)
            .await
            .unwrap();

        let budget = results.get("budget_analyzer").unwrap();
        assert!(!budget.success);
        assert!(budget.error.as_ref().unwrap().contains("offline"));
        assert!(results.get("risk_assessor").unwrap().success);
    }
}
