use ethers::types::{Address, U256};
use std::sync::Arc;
use storefront::{
    config::Config,
    content::MemoryContentStore,
    ledger::{MemoryLedger, MemoryLedgerConfig},
    workflow::{CreateStore, PolicySpec, Storefront, WorkflowContext, WorkflowOrchestrator},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Demo actor funded on the in-memory ledger
const DEMO_ACTOR: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";

/// Runs a create-store workflow against the in-memory ledger.
///
/// The configuration path is taken from the first argument and defaults to
/// `config/default.toml`. Set `RUST_LOG=storefront=debug` to see every call
/// of the composed batch.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "config/default.toml".to_string());
    let config = Config::load(&path)?;
    info!("Loaded {} with {} artifacts", path, config.artifacts.len());

    let actor: Address = DEMO_ACTOR.parse()?;
    let ledger = Arc::new(MemoryLedger::new(MemoryLedgerConfig::from_network(&config.network)));
    ledger.fund(actor, U256::exp10(18)).await;
    let content = Arc::new(MemoryContentStore::new());

    let context = WorkflowContext::from_config(&config, actor, ledger.clone(), content)?;
    let executor = context.executor(config.executor.clone());
    let mut orchestrator = WorkflowOrchestrator::new(context, executor);

    // Log every transition the way a UI would observe it
    let mut updates = orchestrator.subscribe();
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            info!("[{}] {}", snapshot.status, snapshot.step);
        }
    });

    let workflow = CreateStore {
        name: "Corner Shop".to_string(),
        description: "Hand-made goods".to_string(),
        image: b"corner-shop.png".to_vec(),
        policies: vec![PolicySpec::new("paymentPolicy", "payment"), PolicySpec::new("refundPolicy", "refund")],
    };
    let confirmation = orchestrator.run(&workflow).await?;

    let store = Storefront::from_predictions(orchestrator.predictions())?;
    info!("Store confirmed in block {} ({})", confirmation.block_number, confirmation.handle);
    info!("  order contract:    {:?}", store.order_contract);
    info!("  store policy:      {:?}", store.store_policy);
    info!("  store attestation: {:?}", store.store_attestation);
    info!("  product schema:    {:?}", store.product_schema);
    info!("Registered policies: {:?}", ledger.policies_of(store.order_contract).await);

    Ok(())
}
