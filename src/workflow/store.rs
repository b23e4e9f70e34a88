//! Create Store Workflow
//!
//! Stands up a complete storefront in one atomic batch:
//!
//! 1. deploy the store policy, which resolves every store schema
//! 2. register the store, policy, product and order schemas
//! 3. deploy the extra policies
//! 4. deploy the order contract, whose constructor embeds the store schema UID
//! 5. register every policy on the order contract
//! 6. attest the store, then bind each extra policy to the store attestation
//!
//! Units and schemas that already exist on the ledger are recorded as
//! `Existing` and their calls are left out, so a second run after a partial
//! success does not collide with what is already there.

use super::{Workflow, WorkflowContext, WorkflowKind};
use crate::{
    Reference,
    batch::{CallBatch, CallBatchBuilder},
    encode::{AttestationRequest, Operation},
    error::{EncodingError, OrchestrationError},
    predict::{self, PredictionStatus, Predictions},
};
use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, Bytes, H256, U256};
use std::collections::HashSet;
use tracing::{debug, info};

pub const STORE_POLICY: &str = "storePolicy";
pub const ORDER_CONTRACT: &str = "orderContract";

pub const STORE_SCHEMA: &str = "schema:store";
pub const POLICY_SCHEMA: &str = "schema:policy";
pub const PRODUCT_SCHEMA: &str = "schema:product";
pub const ORDER_SCHEMA: &str = "schema:order";

pub const STORE_ATTESTATION: &str = "attestation:store";

/// An extra policy contract to deploy with the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySpec {
    /// Artifact name, also used as the deployment label
    pub artifact: String,
    /// Free-form policy kind recorded in the binding attestation
    pub kind: String,
}

impl PolicySpec {
    pub fn new(artifact: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            kind: kind.into(),
        }
    }

    fn binding_label(&self) -> String {
        format!("attestation:binding:{}", self.artifact)
    }
}

#[derive(Debug, Clone)]
pub struct CreateStore {
    pub name: String,
    pub description: String,
    pub image: Vec<u8>,
    pub policies: Vec<PolicySpec>,
}

impl CreateStore {
    /// Reject policy lists that would deploy one unit twice
    ///
    /// Each unit has one salt per actor, so a repeated artifact, or one named
    /// like a core unit, predicts an address that is already taken in the batch.
    fn check_policies(&self) -> Result<(), EncodingError> {
        let mut seen = HashSet::new();
        for spec in &self.policies {
            let reserved = spec.artifact == STORE_POLICY || spec.artifact == ORDER_CONTRACT;
            if reserved || !seen.insert(spec.artifact.as_str()) {
                return Err(EncodingError::DuplicateUnit(spec.artifact.clone()));
            }
        }
        Ok(())
    }
}

/// Addresses and identifiers of a storefront, as predicted by `CreateStore`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Storefront {
    pub store_policy: Address,
    pub order_contract: Address,
    pub store_schema: H256,
    pub policy_schema: H256,
    pub product_schema: H256,
    pub order_schema: H256,
    pub store_attestation: H256,
}

impl Storefront {
    /// Read the storefront out of a `CreateStore` run
    ///
    /// # Errors
    /// `MissingDependency` if any storefront value was not predicted
    pub fn from_predictions(predictions: &Predictions) -> Result<Self, OrchestrationError> {
        Ok(Self {
            store_policy: predictions.address(STORE_POLICY)?,
            order_contract: predictions.address(ORDER_CONTRACT)?,
            store_schema: predictions.identifier(STORE_SCHEMA)?,
            policy_schema: predictions.identifier(POLICY_SCHEMA)?,
            product_schema: predictions.identifier(PRODUCT_SCHEMA)?,
            order_schema: predictions.identifier(ORDER_SCHEMA)?,
            store_attestation: predictions.identifier(STORE_ATTESTATION)?,
        })
    }
}

/// Purpose tag mixed into the salt of a unit deployed by `actor`
fn purpose(unit: &str) -> String {
    format!("storefront:{}", unit)
}

/// Predicted deployment of one unit
struct Unit {
    label: String,
    address: Address,
    operation: Operation,
}

impl Unit {
    fn predict(ctx: &WorkflowContext, name: &str, args: Vec<Token>) -> Result<Self, OrchestrationError> {
        let artifact = ctx.artifacts.get(name)?;
        let salt = predict::derive_salt(ctx.actor, &purpose(name));
        let (address, _) = predict::predict_deployment(ctx.network.factory, &salt, &artifact, &args)?;
        Ok(Self {
            label: name.to_string(),
            address,
            operation: Operation::Deploy {
                factory: ctx.network.factory,
                salt,
                artifact,
                args,
            },
        })
    }

    /// Record the prediction and append the deployment unless the unit exists
    fn append(
        &self,
        ctx: &WorkflowContext,
        builder: &mut CallBatchBuilder,
        predictions: &mut Predictions,
        status: PredictionStatus,
    ) -> Result<(), OrchestrationError> {
        predictions.deployment(self.label.clone(), self.address, status);
        if status == PredictionStatus::Existing {
            info!("{} already deployed at {:?}, skipping", self.label, self.address);
            return Ok(());
        }
        builder.append(ctx.encoder.encode(&self.operation)?);
        Ok(())
    }
}

#[async_trait]
impl Workflow for CreateStore {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::CreateStore
    }

    async fn build(&self, ctx: &WorkflowContext, predictions: &mut Predictions) -> Result<CallBatch, OrchestrationError> {
        self.check_policies()?;
        let network = &ctx.network;

        // Everything that needs no ledger state is predicted up front
        let store_policy = Unit::predict(
            ctx,
            STORE_POLICY,
            vec![Token::Address(ctx.actor), Token::Address(network.eas)],
        )?;
        let schemas = [
            (STORE_SCHEMA, ctx.schemas.store.as_str()),
            (POLICY_SCHEMA, ctx.schemas.policy.as_str()),
            (PRODUCT_SCHEMA, ctx.schemas.product.as_str()),
            (ORDER_SCHEMA, ctx.schemas.order.as_str()),
        ];
        let schema_uids: Vec<H256> = schemas
            .iter()
            .map(|(_, text)| predict::schema_uid(text, store_policy.address, true))
            .collect();
        let store_schema = schema_uids[0];

        let policies = self
            .policies
            .iter()
            .map(|spec| {
                Unit::predict(
                    ctx,
                    &spec.artifact,
                    vec![Token::Address(ctx.actor), Token::Address(store_policy.address)],
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let order_contract = Unit::predict(
            ctx,
            ORDER_CONTRACT,
            vec![
                Token::Address(ctx.actor),
                Token::Address(network.eas),
                Token::FixedBytes(store_schema.as_bytes().to_vec()),
            ],
        )?;

        let mut units = vec![store_policy.address];
        units.extend(policies.iter().map(|unit| unit.address));
        units.push(order_contract.address);

        // Uploads run alongside the ledger reads; nothing is appended before both finish
        let uploads = async {
            let image = ctx.content.put_bytes(self.image.clone()).await?;
            let metadata = serde_json::json!({
                "name": self.name,
                "description": self.description,
                "image": image.cid,
            });
            Ok::<_, OrchestrationError>(ctx.content.put_json(&metadata).await?)
        };
        let (metadata, deployed, registered, time) = tokio::try_join!(
            uploads,
            ctx.deployed(&units),
            ctx.registered(&schema_uids),
            ctx.timestamp()
        )?;
        debug!("Store metadata stored as {}", metadata.cid);

        let mut builder = CallBatchBuilder::new();
        let mut deployed = deployed.into_iter();

        let store_policy_status = deployed.next().unwrap_or(PredictionStatus::Pending);
        store_policy.append(ctx, &mut builder, predictions, store_policy_status)?;

        for (((label, text), uid), status) in schemas.iter().zip(&schema_uids).zip(registered) {
            predictions.schema(*label, *uid, status);
            if status == PredictionStatus::Existing {
                info!("Schema {} already registered, skipping", label);
                continue;
            }
            builder.append(ctx.encoder.encode(&Operation::RegisterSchema {
                registry: network.schema_registry,
                schema: text.to_string(),
                resolver: store_policy.address,
                revocable: true,
            })?);
        }

        let mut policy_statuses = Vec::with_capacity(policies.len());
        for unit in &policies {
            let status = deployed.next().unwrap_or(PredictionStatus::Pending);
            unit.append(ctx, &mut builder, predictions, status)?;
            policy_statuses.push(status);
        }

        let order_status = deployed.next().unwrap_or(PredictionStatus::Pending);
        order_contract.append(ctx, &mut builder, predictions, order_status)?;

        // An existing order contract registered its policies in the batch that deployed it
        let registrations = std::iter::once((&store_policy, store_policy_status))
            .chain(policies.iter().zip(policy_statuses));
        for (unit, status) in registrations {
            if order_status == PredictionStatus::Existing && status == PredictionStatus::Existing {
                continue;
            }
            predictions.policy_registration(
                format!("registration:{}", unit.label),
                order_contract.address,
                unit.address,
            );
            builder.append(ctx.encoder.encode(&Operation::RegisterPolicy {
                core: order_contract.address,
                policy: unit.address,
            })?);
        }

        let store_data = ethers::abi::encode(&[
            Token::String(self.name.clone()),
            Token::FixedBytes(metadata.digest.as_bytes().to_vec()),
            Token::Address(order_contract.address),
        ]);
        let store_attestation = attest(
            &mut builder,
            ctx,
            time,
            AttestationRequest {
                schema: store_schema,
                recipient: order_contract.address,
                expiration_time: 0,
                revocable: true,
                ref_uid: H256::zero(),
                data: Bytes::from(store_data),
                value: U256::zero(),
            },
        )?;
        predictions.attestation(STORE_ATTESTATION, store_attestation, store_schema);

        let policy_schema = schema_uids[1];
        for (spec, unit) in self.policies.iter().zip(&policies) {
            let binding_data = ethers::abi::encode(&[Token::Address(unit.address), Token::String(spec.kind.clone())]);
            let binding = attest(
                &mut builder,
                ctx,
                time,
                AttestationRequest {
                    schema: policy_schema,
                    recipient: unit.address,
                    expiration_time: 0,
                    revocable: true,
                    ref_uid: store_attestation,
                    data: Bytes::from(binding_data),
                    value: U256::zero(),
                },
            )?;
            predictions.attestation(spec.binding_label(), binding, policy_schema);
        }

        info!(
            "Store {:?} composed: {} calls, order contract at {:?}",
            self.name,
            builder.len(),
            order_contract.address
        );
        Ok(builder.build())
    }
}

/// Append an attestation by the context's actor and return its predicted UID
pub(crate) fn attest(
    builder: &mut CallBatchBuilder,
    ctx: &WorkflowContext,
    time: u64,
    request: AttestationRequest,
) -> Result<H256, OrchestrationError> {
    let call = ctx.encoder.encode(&Operation::Attest {
        service: ctx.network.eas,
        attester: ctx.actor,
        time,
        request,
    })?;
    let uid = match call.provides.first() {
        Some(Reference::Identifier(uid)) => *uid,
        _ => return Err(OrchestrationError::MissingDependency(call.label)),
    };
    builder.append(call);
    Ok(uid)
}
