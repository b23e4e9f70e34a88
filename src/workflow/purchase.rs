//! Purchase Workflow
//!
//! Pays the order contract for a listed product and attests the order in the
//! same batch.

use super::{Storefront, Workflow, WorkflowContext, WorkflowKind, store::attest};
use crate::{
    batch::{CallBatch, CallBatchBuilder},
    encode::{AttestationRequest, Operation},
    error::{EncodingError, OrchestrationError},
    predict::Predictions,
};
use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Bytes, H256, U256};
use tracing::info;

pub const PLACE_ORDER: &str = "placeOrder(bytes32,uint256)";

pub const ORDER_ATTESTATION: &str = "attestation:order";

/// Buy `quantity` units of a listed product
///
/// The order call carries `price × quantity` of native value to the order
/// contract; the order attestation refers to the product attestation.
#[derive(Debug, Clone)]
pub struct Purchase {
    pub store: Storefront,
    pub product: H256,
    pub price: U256,
    pub quantity: u64,
}

impl Purchase {
    /// Native value paid for the order, `price × quantity`
    ///
    /// # Errors
    /// `EncodingError::TypeMismatch` if the quantity is zero or the amount
    /// overflows a uint256
    pub fn amount(&self) -> Result<U256, EncodingError> {
        if self.quantity == 0 {
            return Err(EncodingError::TypeMismatch {
                context: PLACE_ORDER.to_string(),
                index: 1,
                expected: "positive quantity".to_string(),
            });
        }
        self.price
            .checked_mul(U256::from(self.quantity))
            .ok_or_else(|| EncodingError::TypeMismatch {
                context: PLACE_ORDER.to_string(),
                index: 1,
                expected: "amount within uint256".to_string(),
            })
    }
}

#[async_trait]
impl Workflow for Purchase {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::Purchase
    }

    async fn build(&self, ctx: &WorkflowContext, predictions: &mut Predictions) -> Result<CallBatch, OrchestrationError> {
        let amount = self.amount()?;
        let time = ctx.timestamp().await?;
        let quantity = U256::from(self.quantity);

        let mut builder = CallBatchBuilder::new();
        builder.append(ctx.encoder.encode(&Operation::Invoke {
            target: self.store.order_contract,
            signature: PLACE_ORDER.to_string(),
            args: vec![Token::FixedBytes(self.product.as_bytes().to_vec()), Token::Uint(quantity)],
            value: amount,
        })?);

        let data = ethers::abi::encode(&[
            Token::FixedBytes(self.product.as_bytes().to_vec()),
            Token::Uint(quantity),
            Token::Uint(amount),
        ]);
        let order = attest(
            &mut builder,
            ctx,
            time,
            AttestationRequest {
                schema: self.store.order_schema,
                recipient: self.store.order_contract,
                expiration_time: 0,
                revocable: true,
                ref_uid: self.product,
                data: Bytes::from(data),
                value: U256::zero(),
            },
        )?;
        predictions.attestation(ORDER_ATTESTATION, order, self.store.order_schema);

        info!("Order of {} x {:?} composed, paying {}", self.quantity, self.product, amount);
        Ok(builder.build())
    }
}
