use financial_planner::{
    agent::Orchestrator,
    api::{start_server, ApiState, MemorySnapshot},
    config::AppConfig,
    execution::ExecutionEngine,
    gemini::GeminiClient,
    generator::{MockTextGenerator, TextGenerator},
    memory::{HashingEmbedder, InMemorySemanticStore},
    planner::PlanGenerator,
    reflector::Reflector,
    store::{InMemoryTransactionStore, PgTransactionStore, TransactionStore},
    tools::create_default_registry,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;

    info!("Financial Planner - API Server");
    info!("Port: {}", config.api_port);

    // Create components
    let generator: Arc<dyn TextGenerator> = match &config.gemini_api_key {
        Some(key) => Arc::new(GeminiClient::new(key.clone(), config.gemini_url.clone())?),
        None => {
            warn!("GEMINI_API_KEY not set; using mock text generator");
            Arc::new(MockTextGenerator::new())
        }
    };

    let transactions: Arc<dyn TransactionStore> = match &config.database_url {
        Some(url) => Arc::new(PgTransactionStore::connect_lazy(url)?),
        None => {
            info!("Transaction store backend: in-memory");
            Arc::new(InMemoryTransactionStore::new())
        }
    };

    let embedder = Arc::new(HashingEmbedder::default());
    let memory = match &config.memory_snapshot_path {
        Some(path) => Arc::new(InMemorySemanticStore::load(path, embedder).await?),
        None => Arc::new(InMemorySemanticStore::new(embedder)),
    };
    let snapshot = config
        .memory_snapshot_path
        .clone()
        .map(|path| MemorySnapshot {
            store: Arc::clone(&memory),
            path,
        });

    let registry = create_default_registry(config.returns.clone(), config.simulation.clone());

    let orchestrator = Arc::new(Orchestrator::new(
        PlanGenerator::new(Arc::clone(&generator)),
        ExecutionEngine::new(Arc::new(registry), transactions),
        Reflector::new(generator, memory),
        config.workflow.clone(),
    ));

    info!("Orchestrator initialized");

    // Start API server
    start_server(
        ApiState {
            orchestrator,
            snapshot,
        },
        config.api_port,
    )
    .await?;

    Ok(())
}
