use financial_planner::{
    agent::Orchestrator,
    config::{ReturnTable, SimulationConfig, WorkflowConfig},
    execution::ExecutionEngine,
    generator::MockTextGenerator,
    memory::InMemorySemanticStore,
    models::{GoalItem, GoalTarget, Holding, Profile, RiskTolerance, Transaction},
    planner::PlanGenerator,
    reflector::Reflector,
    store::{InMemoryTransactionStore, TransactionStore},
    tools::create_default_registry,
};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Financial planner demo starting");

    // Create components
    let generator = Arc::new(MockTextGenerator::new());
    let registry = create_default_registry(
        ReturnTable::default(),
        SimulationConfig {
            seed: Some(7),
            ..SimulationConfig::default()
        },
    );

    let transactions = Arc::new(InMemoryTransactionStore::new());
    for (day, amount, category) in [
        (3, 1_200.0, "Rent"),
        (9, 140.0, "Dining"),
        (17, 95.0, "Dining"),
        (21, 60.0, "Transport"),
    ] {
        let date = NaiveDate::from_ymd_opt(2024, 5, day).ok_or("invalid sample date")?;
        transactions
            .add_transaction(Transaction {
                date,
                amount,
                category: category.to_string(),
                description: String::new(),
            })
            .await?;
    }

    let orchestrator = Orchestrator::new(
        PlanGenerator::new(generator.clone()),
        ExecutionEngine::new(Arc::new(registry), transactions),
        Reflector::new(generator, Arc::new(InMemorySemanticStore::default())),
        WorkflowConfig::default(),
    );

    // Create a sample profile
    let mut profile = Profile::new(34, 82_000.0, RiskTolerance::Moderate);
    profile.monthly_investment = Some(1_500.0);
    profile.investment_horizon_years = Some(20);
    profile.holdings = vec![
        Holding::new("Index Fund", 40_000.0),
        Holding::new("Bond Fund", 15_000.0),
        Holding::new("Tech Stock", 10_000.0),
    ];
    profile.budget = BTreeMap::from([
        ("Rent".to_string(), 1_200.0),
        ("Dining".to_string(), 200.0),
        ("Transport".to_string(), 100.0),
    ]);

    let goals = vec![
        GoalItem::Text("Build an emergency fund".to_string()),
        GoalItem::Target(GoalTarget {
            description: "Retirement corpus".to_string(),
            target: 1_000_000.0,
            years: 25,
            priority: Some(1),
        }),
    ];

    info!(profile_id = %profile.profile_id, "Running pipeline");

    // Run pipeline
    match orchestrator.run(profile, goals).await {
        Ok(state) => {
            info!("Pipeline successful");
            println!("\n=== PLANNING RESULT ===");
            println!("Stage: {:?}", state.stage());
            if let Some(plan) = state.plan() {
                println!("\nPlan:\n{}", serde_json::to_string_pretty(plan)?);
            }
            if let Some(results) = state.results() {
                println!("\nResults:\n{}", serde_json::to_string_pretty(results)?);
            }
            if let Some(insights) = state.insights() {
                println!("\nInsights:\n{}", serde_json::to_string_pretty(insights)?);
            }
            println!("\nTrace:");
            for (i, entry) in state.trace().iter().enumerate() {
                println!("  {}: {}", i + 1, entry);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Pipeline failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
