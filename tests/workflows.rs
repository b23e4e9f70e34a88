//! End-to-end storefront flows against the in-memory ledger

use ethers::abi::Token;
use ethers::types::{Address, H256, U256};
use std::sync::Arc;
use storefront::{
    Reference,
    batch::CallBatchBuilder,
    config::{Config, ExecutorConfig},
    content::MemoryContentStore,
    encode::{Operation, encode},
    ledger::{
        MemoryLedger, MemoryLedgerConfig,
        events::{self, RegistryEvent},
    },
    predict::{self, PredictionStatus, Predictions},
    workflow::{
        CreateProduct, CreateStore, DelistProduct, LIST_PRODUCT, ORDER_ATTESTATION, PolicySpec, Purchase, Storefront,
        WorkflowContext, WorkflowOrchestrator, WorkflowStatus, listed_product,
    },
};

fn config() -> Config {
    Config::parse(include_str!("../config/default.toml")).unwrap()
}

fn merchant() -> Address {
    "0x70997970c51812dc3a010c7d01b50e0d17dc79c8".parse().unwrap()
}

fn buyer() -> Address {
    "0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc".parse().unwrap()
}

fn orchestrator_for(actor: Address, ledger: &Arc<MemoryLedger>, content: &Arc<MemoryContentStore>) -> WorkflowOrchestrator {
    let config = config();
    let context = WorkflowContext::from_config(&config, actor, ledger.clone(), content.clone()).unwrap();
    let executor = context.executor(ExecutorConfig {
        receipt_timeout_ms: 200,
        poll_interval_ms: 5,
    });
    WorkflowOrchestrator::new(context, executor)
}

fn ledger() -> Arc<MemoryLedger> {
    Arc::new(MemoryLedger::new(MemoryLedgerConfig::from_network(&config().network)))
}

async fn open_store(orchestrator: &mut WorkflowOrchestrator) -> Storefront {
    let workflow = CreateStore {
        name: "Corner Shop".to_string(),
        description: "Hand-made goods".to_string(),
        image: b"shop front".to_vec(),
        policies: vec![
            PolicySpec::new("paymentPolicy", "payment"),
            PolicySpec::new("refundPolicy", "refund"),
        ],
    };
    orchestrator.run(&workflow).await.unwrap();
    Storefront::from_predictions(orchestrator.predictions()).unwrap()
}

#[tokio::test]
async fn store_product_purchase_and_delist() {
    let ledger = ledger();
    let content = Arc::new(MemoryContentStore::new());
    ledger.fund(buyer(), U256::from(1_000_000u64)).await;

    let mut merchant_flow = orchestrator_for(merchant(), &ledger, &content);
    let store = open_store(&mut merchant_flow).await;
    assert_eq!(ledger.policies_of(store.order_contract).await.len(), 3);

    merchant_flow.reset().unwrap();
    let listing = CreateProduct {
        store,
        sku: "MUG-01".to_string(),
        name: "Stoneware mug".to_string(),
        price: U256::from(2_500u64),
        images: vec![b"front".to_vec(), b"side".to_vec(), b"front".to_vec()],
    };
    merchant_flow.run(&listing).await.unwrap();
    let product = listed_product(merchant_flow.predictions()).unwrap();

    let record = ledger.attestation(product).await.unwrap();
    assert_eq!(record.ref_uid, store.store_attestation);
    assert_eq!(record.schema, store.product_schema);
    // Identical images share one blob: two images, the store image and two metadata documents
    assert_eq!(content.len().await, 5);

    let mut buyer_flow = orchestrator_for(buyer(), &ledger, &content);
    let purchase = Purchase {
        store,
        product,
        price: U256::from(2_500u64),
        quantity: 3,
    };
    buyer_flow.run(&purchase).await.unwrap();

    let order = buyer_flow.predictions().identifier(ORDER_ATTESTATION).unwrap();
    let order = ledger.attestation(order).await.unwrap();
    assert_eq!(order.ref_uid, product);
    assert_eq!(order.attester, buyer());
    assert_eq!(ledger.balance_of(store.order_contract).await, U256::from(7_500u64));
    assert_eq!(ledger.balance_of(buyer()).await, U256::from(992_500u64));

    merchant_flow.reset().unwrap();
    merchant_flow.run(&DelistProduct { store, product }).await.unwrap();
    assert_ne!(ledger.attestation(product).await.unwrap().revocation_time, 0);
}

#[tokio::test]
async fn purchase_without_funds_reverts_without_effect() {
    let ledger = ledger();
    let content = Arc::new(MemoryContentStore::new());

    let mut merchant_flow = orchestrator_for(merchant(), &ledger, &content);
    let store = open_store(&mut merchant_flow).await;
    merchant_flow.reset().unwrap();
    merchant_flow
        .run(&CreateProduct {
            store,
            sku: "MUG-01".to_string(),
            name: "Stoneware mug".to_string(),
            price: U256::from(2_500u64),
            images: vec![],
        })
        .await
        .unwrap();
    let product = listed_product(merchant_flow.predictions()).unwrap();
    let before = ledger.snapshot().await;

    let mut buyer_flow = orchestrator_for(buyer(), &ledger, &content);
    let err = buyer_flow
        .run(&Purchase {
            store,
            product,
            price: U256::from(2_500u64),
            quantity: 1,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, storefront::OrchestrationError::ExecutionReverted { .. }));
    assert_eq!(buyer_flow.state().status, WorkflowStatus::Failed);
    assert_eq!(ledger.snapshot().await, before);
}

#[tokio::test]
async fn failing_listing_call_undoes_the_product_attestation() {
    let ledger = ledger();
    let content = Arc::new(MemoryContentStore::new());
    let mut flow = orchestrator_for(merchant(), &ledger, &content);
    let store = open_store(&mut flow).await;
    flow.reset().unwrap();

    let listing = CreateProduct {
        store,
        sku: "BOWL-03".to_string(),
        name: "Serving bowl".to_string(),
        price: U256::from(4_000u64),
        images: vec![b"bowl".to_vec()],
    };
    ledger.revert_selector(LIST_PRODUCT).await;
    let before = ledger.snapshot().await;

    let err = flow.run(&listing).await.unwrap_err();
    assert!(matches!(err, storefront::OrchestrationError::ExecutionReverted { .. }));
    let product = listed_product(flow.predictions()).unwrap();
    // The attestation precedes the failing call in the batch but is rolled back with it
    assert!(ledger.attestation(product).await.is_none());
    assert_eq!(ledger.snapshot().await, before);

    ledger.clear_faults().await;
    flow.retry(&listing).await.unwrap();
    assert_eq!(flow.state().status, WorkflowStatus::Completed);
    assert_eq!(listed_product(flow.predictions()).unwrap(), product);
    assert_eq!(ledger.attestation(product).await.unwrap().ref_uid, store.store_attestation);
}

#[tokio::test]
async fn delisting_twice_reverts() {
    let ledger = ledger();
    let content = Arc::new(MemoryContentStore::new());
    let mut flow = orchestrator_for(merchant(), &ledger, &content);
    let store = open_store(&mut flow).await;

    flow.reset().unwrap();
    flow.run(&CreateProduct {
        store,
        sku: "CUP-02".to_string(),
        name: "Tea cup".to_string(),
        price: U256::from(900u64),
        images: vec![b"cup".to_vec()],
    })
    .await
    .unwrap();
    let product = listed_product(flow.predictions()).unwrap();

    flow.reset().unwrap();
    flow.run(&DelistProduct { store, product }).await.unwrap();
    flow.reset().unwrap();
    let err = flow.run(&DelistProduct { store, product }).await.unwrap_err();
    assert!(matches!(err, storefront::OrchestrationError::ExecutionReverted { .. }));
}

/// Deploy a policy and a core contract whose constructor embeds the policy's
/// predicted address, then register the policy on the core contract, all in
/// one batch
#[tokio::test]
async fn core_contract_registers_policy_deployed_in_same_batch() {
    let config = config();
    let network = config.network.clone();
    let artifacts = config.artifacts().unwrap();
    let ledger = ledger();
    let content = Arc::new(MemoryContentStore::new());
    let context = WorkflowContext::from_config(&config, merchant(), ledger.clone(), content).unwrap();
    let executor = context.executor(ExecutorConfig::default());

    let policy_salt = predict::derive_salt(merchant(), "policy");
    let policy_args = vec![Token::Address(merchant()), Token::Address(network.eas)];
    let policy_artifact = artifacts.get("storePolicy").unwrap();
    let (policy, _) = predict::predict_deployment(network.factory, &policy_salt, &policy_artifact, &policy_args).unwrap();

    let core_salt = predict::derive_salt(merchant(), "core");
    let core_args = vec![
        Token::Address(merchant()),
        Token::Address(policy),
        Token::FixedBytes(H256::zero().as_bytes().to_vec()),
    ];
    let core_artifact = artifacts.get("orderContract").unwrap();
    let (core, _) = predict::predict_deployment(network.factory, &core_salt, &core_artifact, &core_args).unwrap();

    let mut predictions = Predictions::new();
    predictions.deployment("policy", policy, PredictionStatus::Pending);
    predictions.deployment("core", core, PredictionStatus::Pending);
    predictions.policy_registration("registration", core, policy);

    let mut builder = CallBatchBuilder::new();
    builder
        .append(
            encode(&Operation::Deploy {
                factory: network.factory,
                salt: policy_salt,
                artifact: policy_artifact,
                args: policy_args,
            })
            .unwrap(),
        )
        .append(
            encode(&Operation::Deploy {
                factory: network.factory,
                salt: core_salt,
                artifact: core_artifact,
                args: core_args,
            })
            .unwrap(),
        )
        .append(encode(&Operation::RegisterPolicy { core, policy }).unwrap());
    let batch = builder.build();
    batch.verify_ordering().unwrap();

    let handle = executor.submit(&batch).await.unwrap();
    let receipt = executor.await_receipt(&handle).await.unwrap();
    let confirmation = executor.confirm(&receipt, &predictions).await.unwrap();

    assert_eq!(confirmation.get("registration"), Some(Reference::Address(core)));
    let emitted: Vec<RegistryEvent> = receipt.logs.iter().filter_map(events::decode).collect();
    assert_eq!(emitted, vec![RegistryEvent::PolicyRegistered { core, policy }]);
    assert_eq!(emitted[0].emitter(), core);
    assert_eq!(ledger.policies_of(core).await, vec![policy]);
}

#[tokio::test]
async fn observers_follow_a_workflow() {
    let ledger = ledger();
    let content = Arc::new(MemoryContentStore::new());
    let mut flow = orchestrator_for(merchant(), &ledger, &content);
    let mut updates = flow.subscribe();

    let observer = tokio::spawn(async move {
        let mut seen = Vec::new();
        while updates.changed().await.is_ok() {
            let status = updates.borrow_and_update().status;
            if seen.last() != Some(&status) {
                seen.push(status);
            }
            if status.is_terminal() {
                break;
            }
        }
        seen
    });

    open_store(&mut flow).await;
    let seen = observer.await.unwrap();

    // The watch channel keeps only the latest value, so intermediate states
    // may be skipped; the terminal one is always seen
    assert_eq!(seen.last(), Some(&WorkflowStatus::Completed));
    assert!(!seen.contains(&WorkflowStatus::Failed));
}
