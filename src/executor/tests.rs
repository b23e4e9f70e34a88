//! Tests for the transaction executor
//!
//! Runs batches against the in-memory ledger, with and without injected faults

#[cfg(test)]
mod tests {
    use crate::{
        Reference,
        artifact::Artifact,
        batch::{CallBatch, CallBatchBuilder},
        config::{ExecutorConfig, NetworkConfig},
        encode::{AttestationRequest, Operation, encode},
        error::{OrchestrationError, Recovery},
        executor::TransactionExecutor,
        ledger::{Ledger, MemoryLedger, MemoryLedgerConfig, WorldState},
        predict::{self, PredictionStatus, Predictions},
    };
    use ethers::types::{Address, Bytes, H256, U256};
    use std::sync::Arc;
    use std::time::Duration;

    fn network() -> NetworkConfig {
        NetworkConfig {
            chain_id: 31337,
            factory: Address::repeat_byte(0xfa),
            schema_registry: Address::repeat_byte(0x20),
            eas: Address::repeat_byte(0x21),
            block_time_secs: 2,
        }
    }

    fn actor() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn setup() -> (Arc<MemoryLedger>, TransactionExecutor) {
        let ledger = Arc::new(MemoryLedger::new(MemoryLedgerConfig::from_network(&network())));
        let config = ExecutorConfig {
            receipt_timeout_ms: 50,
            poll_interval_ms: 5,
        };
        let executor = TransactionExecutor::new(ledger.clone(), actor(), network(), config);
        (ledger, executor)
    }

    /// Deploy a resolver, register a schema resolved by it and attest under that schema
    async fn resolver_batch(ledger: &MemoryLedger) -> (CallBatch, Predictions) {
        let net = network();
        let artifact = Arc::new(Artifact::new("resolver", vec![0x60, 0x80, 0x60, 0x40], vec![]));
        let mut predictions = Predictions::new();
        let mut builder = CallBatchBuilder::new();

        let deploy = encode(&Operation::Deploy {
            factory: net.factory,
            salt: predict::derive_salt(actor(), "resolver"),
            artifact,
            args: vec![],
        })
        .unwrap();
        let Reference::Address(resolver) = deploy.provides[0] else {
            panic!("deploy must provide an address");
        };
        predictions.deployment("resolver", resolver, PredictionStatus::Pending);
        builder.append(deploy);

        let schema = predict::schema_uid("string name", resolver, true);
        predictions.schema("schema", schema, PredictionStatus::Pending);
        builder.append(
            encode(&Operation::RegisterSchema {
                registry: net.schema_registry,
                schema: "string name".to_string(),
                resolver,
                revocable: true,
            })
            .unwrap(),
        );

        let time = ledger.next_timestamp().await.unwrap();
        let attest = encode(&Operation::Attest {
            service: net.eas,
            attester: actor(),
            time,
            request: AttestationRequest {
                schema,
                recipient: actor(),
                expiration_time: 0,
                revocable: true,
                ref_uid: H256::zero(),
                data: Bytes::from(vec![1, 2, 3]),
                value: U256::zero(),
            },
        })
        .unwrap();
        let Reference::Identifier(uid) = attest.provides[0] else {
            panic!("attest must provide an identifier");
        };
        predictions.attestation("attestation", uid, schema);
        builder.append(attest);

        (builder.build(), predictions)
    }

    #[tokio::test]
    async fn test_execute_confirms_every_prediction() {
        let (ledger, executor) = setup();
        let (batch, predictions) = resolver_batch(&ledger).await;

        let confirmation = executor.execute(&batch, &predictions).await.unwrap();

        assert_eq!(confirmation.block_number, 1);
        assert_eq!(confirmation.confirmed.len(), 3);
        let resolver = predictions.address("resolver").unwrap();
        assert_eq!(confirmation.get("resolver"), Some(Reference::Address(resolver)));

        let uid = predictions.identifier("attestation").unwrap();
        let record = ledger.attestation(uid).await.unwrap();
        assert_eq!(record.attester, actor());
        assert_eq!(record.data.to_vec(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_wrong_identifier_is_a_mismatch() {
        let (ledger, executor) = setup();
        let (batch, mut predictions) = resolver_batch(&ledger).await;
        let actual = predictions.identifier("schema").unwrap();
        predictions.schema("schema", H256::repeat_byte(9), PredictionStatus::Pending);

        let err = executor.execute(&batch, &predictions).await.unwrap_err();
        assert_eq!(
            err,
            OrchestrationError::PredictionMismatch {
                label: "schema".to_string(),
                predicted: Reference::Identifier(H256::repeat_byte(9)),
                observed: Some(Reference::Identifier(actual)),
            }
        );
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_missing_deployment_is_a_mismatch() {
        let (ledger, executor) = setup();
        let (batch, mut predictions) = resolver_batch(&ledger).await;
        predictions.deployment("ghost", Address::repeat_byte(0x77), PredictionStatus::Pending);

        let err = executor.execute(&batch, &predictions).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::PredictionMismatch { ref label, observed: None, .. } if label == "ghost"
        ));
    }

    #[tokio::test]
    async fn test_existing_predictions_are_not_checked() {
        let (ledger, executor) = setup();
        let (batch, mut predictions) = resolver_batch(&ledger).await;
        predictions.deployment("ghost", Address::repeat_byte(0x77), PredictionStatus::Existing);

        let confirmation = executor.execute(&batch, &predictions).await.unwrap();
        assert!(confirmation.get("ghost").is_none());
    }

    #[tokio::test]
    async fn test_reverted_batch() {
        let (ledger, executor) = setup();
        let (batch, predictions) = resolver_batch(&ledger).await;
        ledger.revert_next_batch().await;

        let err = executor.execute(&batch, &predictions).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ExecutionReverted { .. }));
        assert_eq!(err.recovery(), Recovery::Rebuild);
        assert_eq!(ledger.snapshot().await, WorldState::default());
    }

    #[tokio::test]
    async fn test_user_rejection() {
        let (ledger, executor) = setup();
        let (batch, predictions) = resolver_batch(&ledger).await;
        ledger.reject_next_submission().await;

        let err = executor.execute(&batch, &predictions).await.unwrap_err();
        assert_eq!(err, OrchestrationError::UserRejected);
        assert_eq!(ledger.submissions().await, 0);

        // The unchanged batch goes through on the second attempt
        assert!(executor.execute(&batch, &predictions).await.is_ok());
    }

    #[tokio::test]
    async fn test_receipt_timeout_keeps_handle() {
        let (ledger, executor) = setup();
        let (batch, predictions) = resolver_batch(&ledger).await;
        ledger.withhold_receipts(true).await;

        let handle = executor.submit(&batch).await.unwrap();
        let err = executor.await_receipt(&handle).await.unwrap_err();
        match &err {
            OrchestrationError::ReceiptTimeout { handle: timed_out, waited_ms } => {
                assert_eq!(timed_out, &handle);
                assert!(*waited_ms >= 50);
            }
            other => panic!("expected a timeout, got {:?}", other),
        }
        assert_eq!(err.recovery(), Recovery::Requery);

        ledger.withhold_receipts(false).await;
        let receipt = executor.await_receipt(&handle).await.unwrap();
        assert!(executor.confirm(&receipt, &predictions).await.is_ok());
    }

    #[tokio::test]
    async fn test_delayed_receipt_is_polled() {
        let (ledger, executor) = setup();
        let (batch, predictions) = resolver_batch(&ledger).await;
        ledger.delay_receipts(3).await;

        assert!(executor.execute(&batch, &predictions).await.is_ok());
    }

    #[tokio::test]
    async fn test_forward_reference_is_never_submitted() {
        let (ledger, executor) = setup();
        let (batch, _) = resolver_batch(&ledger).await;
        let mut calls = batch.calls().to_vec();
        calls.swap(0, 1);

        let err = executor.submit(&CallBatch::from(calls)).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::MissingDependency(_)));
        assert_eq!(ledger.submissions().await, 0);
    }

    #[tokio::test]
    async fn test_shared_session_serializes_submissions() {
        let (ledger, executor) = setup();
        let other = TransactionExecutor::new(ledger.clone(), actor(), network(), ExecutorConfig::default())
            .with_session(executor.session());
        assert!(Arc::ptr_eq(&executor.session(), &other.session()));
        let (batch, _) = resolver_batch(&ledger).await;

        let session = executor.session();
        let guard = session.lock().await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), other.submit(&batch)).await;
        assert!(blocked.is_err(), "submission must wait for the session");
        assert_eq!(ledger.submissions().await, 0);

        drop(guard);
        let handle = tokio::time::timeout(Duration::from_millis(500), other.submit(&batch))
            .await
            .expect("submission proceeds once the session is free")
            .unwrap();
        assert!(executor.await_receipt(&handle).await.is_ok());
        assert_eq!(ledger.submissions().await, 1);
    }

    #[tokio::test]
    async fn test_separate_sessions_do_not_block() {
        let (ledger, executor) = setup();
        let independent = TransactionExecutor::new(ledger.clone(), actor(), network(), ExecutorConfig::default());
        let (batch, _) = resolver_batch(&ledger).await;

        let session = executor.session();
        let _guard = session.lock().await;
        let submitted = tokio::time::timeout(Duration::from_millis(500), independent.submit(&batch)).await;
        assert!(matches!(submitted, Ok(Ok(_))));
    }
}
