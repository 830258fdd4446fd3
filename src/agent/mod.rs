//! Main orchestrator - implements the planning pipeline
//!
//! INIT → PLAN → EXECUTE → REFLECT → DONE

use crate::config::WorkflowConfig;
use crate::execution::ExecutionEngine;
use crate::models::{GoalItem, PlanOutcome, Profile};
use crate::planner::PlanGenerator;
use crate::reflector::Reflector;
use crate::state::WorkflowState;
use crate::Result;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Coordinates plan generation, execution and reflection for one profile
pub struct Orchestrator {
    planner: PlanGenerator,
    execution_engine: ExecutionEngine,
    reflector: Reflector,
    config: WorkflowConfig,
}

impl Orchestrator {
    pub fn new(
        planner: PlanGenerator,
        execution_engine: ExecutionEngine,
        reflector: Reflector,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            planner,
            execution_engine,
            reflector,
            config,
        }
    }

    pub fn execution_engine(&self) -> &ExecutionEngine {
        &self.execution_engine
    }

    pub fn reflector(&self) -> &Reflector {
        &self.reflector
    }

    /// Run the pipeline to completion.
    ///
    /// An error plan is not short-circuited: it flows into execution, which
    /// refuses it, and that `InvalidPlan` error is returned.
    pub async fn run(&self, profile: Profile, goals: Vec<GoalItem>) -> Result<WorkflowState> {
        let start_time = Instant::now();
        let mut state = WorkflowState::new(profile, goals);

        info!(
            profile_id = %state.profile.profile_id,
            goal_count = state.goals.len(),
            "Orchestrator: starting pipeline"
        );

        // === PLAN ===
        state.advance()?;
        let attempts = self.config.plan_attempts.max(1);
        for attempt in 1..=attempts {
            let outcome = self.planner.generate_plan(&state.profile, &state.goals).await;

            match outcome.error_message() {
                None => state.note(format!("PLAN: plan generated on attempt {}", attempt)),
                Some(message) => {
                    warn!(attempt, error = %message, "Plan generation returned error plan");
                    state.note(format!("PLAN: attempt {} failed: {}", attempt, message));
                }
            }

            let done = outcome.is_ok();
            state.record_plan(outcome)?;
            if done {
                break;
            }
        }

        // === EXECUTE ===
        state.advance()?;
        debug!("Executing plan");
        let plan = state
            .plan()
            .cloned()
            .unwrap_or_else(|| PlanOutcome::Error("no plan was generated".to_string()));
        let results = self.execution_engine.execute(&plan, &state.profile).await?;

        state.note(format!(
            "EXECUTE: {} tool output(s), {} failed",
            results.len(),
            results.failures().count()
        ));
        for (key, output) in results.failures() {
            state.note(format!(
                "EXECUTE: {} failed: {}",
                key,
                output.error.as_deref().unwrap_or("unknown error")
            ));
        }
        state.record_results(results.clone())?;

        // === REFLECT ===
        state.advance()?;
        let insights = self.reflector.reflect(&results, &state.profile).await;
        match insights.error_message() {
            None => state.note("REFLECT: insights generated"),
            Some(message) => state.note(format!("REFLECT: insights unavailable: {}", message)),
        }
        state.record_insights(insights)?;

        state.advance()?;

        info!(
            profile_id = %state.profile.profile_id,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Orchestrator: pipeline complete"
        );

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReturnTable, SimulationConfig};
    use crate::error::OrchestrationError;
    use crate::generator::MockTextGenerator;
    use crate::memory::InMemorySemanticStore;
    use crate::models::{Holding, RiskTolerance};
    use crate::state::Stage;
    use crate::store::InMemoryTransactionStore;
    use crate::tools::create_default_registry;
    use std::sync::Arc;

    fn orchestrator(generator: Arc<MockTextGenerator>, config: WorkflowConfig) -> Orchestrator {
        let registry = create_default_registry(
            ReturnTable::default(),
            SimulationConfig {
                trials: 200,
                seed: Some(42),
                ..SimulationConfig::default()
            },
        );
        Orchestrator::new(
            PlanGenerator::new(generator.clone()),
            ExecutionEngine::new(
                Arc::new(registry),
                Arc::new(InMemoryTransactionStore::new()),
            ),
            Reflector::new(generator, Arc::new(InMemorySemanticStore::default())),
            config,
        )
    }

    fn profile() -> Profile {
        let mut profile = Profile::new(35, 75_000.0, RiskTolerance::Moderate);
        profile.monthly_investment = Some(1_500.0);
        profile.holdings = vec![Holding::new("A", 100.0), Holding::new("B", 100.0)];
        profile
    }

    #[tokio::test]
    async fn test_happy_path_reaches_done() {
        let orchestrator = orchestrator(Arc::new(MockTextGenerator::new()), WorkflowConfig::default());

        let state = orchestrator.run(profile(), vec![]).await.unwrap();

        assert_eq!(state.stage(), Stage::Done);
        assert!(state.plan().unwrap().is_ok());
        let results = state.results().unwrap();
        assert!(results.get("goal_simulator[0]").unwrap().success);
        assert!(results.get("goal_simulator[1]").unwrap().success);
        assert_eq!(
            results.get("portfolio_risk").unwrap().data["hhi_index"],
            5000.0
        );
        assert!(state.insights().unwrap().is_ok());
        assert!(!state.trace().is_empty());
    }

    #[tokio::test]
    async fn test_error_plan_fails_with_invalid_plan() {
        let generator = Arc::new(MockTextGenerator::with_responses(["not a plan"]));
        let orchestrator = orchestrator(generator, WorkflowConfig::default());

        let err = orchestrator.run(profile(), vec![]).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidPlan(_)));
    }

    #[tokio::test]
    async fn test_plan_attempts_retry_error_plans() {
        let generator = Arc::new(MockTextGenerator::with_responses(["not a plan"]));
        let orchestrator = orchestrator(generator.clone(), WorkflowConfig { plan_attempts: 2 });

        let state = tokio_test::assert_ok!(orchestrator.run(profile(), vec![]).await);
        assert_eq!(state.stage(), Stage::Done);
        assert!(state.trace().iter().any(|t| t.contains("attempt 1 failed")));
        // two plan prompts, one reflection prompt
        assert_eq!(generator.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_reflection_failure_still_completes() {
        let generator = Arc::new(MockTextGenerator::new());
        generator.push_response(
            r#"{"short_term_goals": ["Save"], "long_term_goals": ["Travel"], "allocation": {"equity": 1.0}}"#,
        );
        generator.push_failure("model offline");
        let orchestrator = orchestrator(generator, WorkflowConfig::default());

        let state = orchestrator.run(profile(), vec![]).await.unwrap();

        assert_eq!(state.stage(), Stage::Done);
        let results = state.results().unwrap();
        assert!(!results.get("goal_simulator[0]").unwrap().success);
        assert!(!state.insights().unwrap().is_ok());
    }
}
