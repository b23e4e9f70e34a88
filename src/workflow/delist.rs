//! Delist Product Workflow

use super::{Storefront, Workflow, WorkflowContext, WorkflowKind};
use crate::{
    batch::{CallBatch, CallBatchBuilder},
    encode::Operation,
    error::OrchestrationError,
    predict::Predictions,
};
use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{H256, U256};
use tracing::info;

pub const DELIST_PRODUCT: &str = "delistProduct(bytes32)";

/// Withdraw a product: revoke its attestation and remove it from the order contract
#[derive(Debug, Clone)]
pub struct DelistProduct {
    pub store: Storefront,
    pub product: H256,
}

#[async_trait]
impl Workflow for DelistProduct {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::DelistProduct
    }

    async fn build(&self, ctx: &WorkflowContext, predictions: &mut Predictions) -> Result<CallBatch, OrchestrationError> {
        let mut builder = CallBatchBuilder::new();

        builder.append(ctx.encoder.encode(&Operation::Revoke {
            service: ctx.network.eas,
            schema: self.store.product_schema,
            uid: self.product,
        })?);
        predictions.revocation("revocation:product", self.product, self.store.product_schema);

        builder.append(ctx.encoder.encode(&Operation::Invoke {
            target: self.store.order_contract,
            signature: DELIST_PRODUCT.to_string(),
            args: vec![Token::FixedBytes(self.product.as_bytes().to_vec())],
            value: U256::zero(),
        })?);

        info!("Delisting {:?}", self.product);
        Ok(builder.build())
    }
}
