//! Plan generation
//!
//! Builds a profile-conditioned prompt, calls the text generator once and
//! parses the answer into a `Plan`. Failure is returned as
//! `Parsed::Error`, never raised. Retrying is the caller's policy.

use crate::generator::TextGenerator;
use crate::models::{GoalItem, PlanOutcome, Profile, MAX_LONG_TERM_GOALS, MAX_SHORT_TERM_GOALS};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod parser;
pub use parser::{parse_plan_response, validate_allocation, ALLOCATION_TOLERANCE};

pub struct PlanGenerator {
    generator: Arc<dyn TextGenerator>,
}

impl PlanGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Build structured planning prompt
    pub fn build_prompt(profile: &Profile, goals: &[GoalItem]) -> String {
        let holdings = if profile.holdings.is_empty() {
            "none".to_string()
        } else {
            profile
                .holdings
                .iter()
                .map(|h| format!("{}: {:.2}", h.name, h.value))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let stated_goals = if goals.is_empty() {
            "none stated; derive suitable goals from the profile".to_string()
        } else {
            goals
                .iter()
                .map(|g| format!("- {}", g))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            r#"You are a personal-finance planning engine.

Analyze this financial profile:
AGE: {}
ANNUAL INCOME: {:.2}
RISK TOLERANCE: {}
MONTHLY INVESTMENT: {}
HOLDINGS: {}

STATED GOALS:
{}

Generate a plan with:
1. {} short-term (1 year) goals
2. {} long-term (5+ years) goals
3. One recommended asset allocation across equity, debt and hybrid

Rules:
- Return ONLY valid JSON
- No explanation text
- Goals may be strings or objects {{"description": "...", "target": <amount>, "years": <int>, "priority": <int>}}
- Prefer objects for long-term goals so they can be simulated
- Allocation weights are fractions in [0, 1] that sum to 1.0
- JSON format:

{{
  "short_term_goals": ["..."],
  "long_term_goals": [{{"description": "...", "target": 0, "years": 0, "priority": 1}}],
  "allocation": {{"equity": 0.0, "debt": 0.0, "hybrid": 0.0}}
}}
"#,
            profile.age,
            profile.annual_income,
            profile.risk_tolerance,
            profile
                .monthly_investment
                .map(|m| format!("{:.2}", m))
                .unwrap_or_else(|| "unknown".to_string()),
            holdings,
            stated_goals,
            MAX_SHORT_TERM_GOALS,
            MAX_LONG_TERM_GOALS,
        )
    }

    pub async fn generate_plan(&self, profile: &Profile, goals: &[GoalItem]) -> PlanOutcome {
        let prompt = Self::build_prompt(profile, goals);

        debug!(profile_id = %profile.profile_id, goal_count = goals.len(), "Requesting plan");

        let response = match self.generator.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Plan generation call failed");
                return PlanOutcome::Error(format!("plan generation failed: {}", e));
            }
        };

        match parse_plan_response(&response) {
            Ok(plan) => {
                info!(
                    short_term = plan.short_term_goals.len(),
                    long_term = plan.long_term_goals.len(),
                    asset_classes = plan.allocation.len(),
                    "Plan parsed"
                );
                PlanOutcome::Ok(plan)
            }
            Err(e) => {
                warn!(error = %e, "Failed to parse plan response");
                PlanOutcome::Error(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::MockTextGenerator;
    use crate::models::{GoalTarget, Holding, RiskTolerance};

    fn profile() -> Profile {
        let mut profile = Profile::new(35, 75_000.0, RiskTolerance::Moderate);
        profile.monthly_investment = Some(1500.0);
        profile.holdings = vec![Holding::new("INDEX_FUND", 20_000.0)];
        profile
    }

    #[test]
    fn test_prompt_is_deterministic_and_embeds_profile() {
        let goals = vec![GoalItem::Target(GoalTarget {
            description: "College fund".into(),
            target: 80_000.0,
            years: 12,
            priority: Some(2),
        })];
        let p = profile();
        let a = PlanGenerator::build_prompt(&p, &goals);
        let b = PlanGenerator::build_prompt(&p, &goals);

        assert_eq!(a, b);
        assert!(a.contains("AGE: 35"));
        assert!(a.contains("INDEX_FUND: 20000.00"));
        assert!(a.contains("College fund (target 80000 in 12 years, priority 2)"));
        assert!(a.contains("3 short-term"));
        assert!(a.contains("2 long-term"));
    }

    #[tokio::test]
    async fn test_generate_plan_from_canned_response() {
        let mock = Arc::new(MockTextGenerator::new());
        let planner = PlanGenerator::new(mock.clone());

        let outcome = planner.generate_plan(&profile(), &[]).await;
        let plan = outcome.as_ok().unwrap();

        assert_eq!(plan.short_term_goals.len(), 3);
        assert_eq!(plan.long_term_goals.len(), 2);
        assert_eq!(mock.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_response_becomes_error_variant() {
        let mock = Arc::new(MockTextGenerator::with_responses(["Invest wisely!"]));
        let planner = PlanGenerator::new(mock);

        let outcome = planner.generate_plan(&profile(), &[]).await;
        assert!(!outcome.is_ok());
        assert!(outcome.error_message().unwrap().contains("not valid JSON"));
    }

    #[tokio::test]
    async fn test_out_of_tolerance_allocation_rejected() {
        let mock = Arc::new(MockTextGenerator::with_responses([
            r#"{"short_term_goals": [], "long_term_goals": [], "allocation": {"equity": 0.8, "debt": 0.3}}"#,
        ]));
        let planner = PlanGenerator::new(mock);

        let outcome = planner.generate_plan(&profile(), &[]).await;
        assert!(outcome.error_message().unwrap().contains("sum to"));
    }

    #[tokio::test]
    async fn test_generator_failure_becomes_error_variant() {
        let mock = MockTextGenerator::new();
        mock.push_failure("model offline");
        let planner = PlanGenerator::new(Arc::new(mock));

        let outcome = planner.generate_plan(&profile(), &[]).await;
        assert!(outcome.error_message().unwrap().contains("model offline"));
    }
}
