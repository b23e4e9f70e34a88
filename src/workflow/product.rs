//! Create Product Workflow
//!
//! Uploads the product images concurrently, then the metadata document, and
//! composes a batch that attests the product under the store attestation and
//! lists it on the order contract by its predicted UID.

use super::{Storefront, Workflow, WorkflowContext, WorkflowKind, store::attest};
use crate::{
    batch::{CallBatch, CallBatchBuilder},
    encode::{AttestationRequest, Operation},
    error::OrchestrationError,
    predict::Predictions,
};
use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Bytes, H256, U256};
use futures::future::try_join_all;
use tracing::{debug, info};

pub const LIST_PRODUCT: &str = "listProduct(bytes32,uint256)";

pub const PRODUCT_ATTESTATION: &str = "attestation:product";

/// List a new product on an existing storefront
///
/// The product attestation refers to the store attestation, and the order
/// contract is told about the product by its predicted UID in the same batch.
#[derive(Debug, Clone)]
pub struct CreateProduct {
    pub store: Storefront,
    pub sku: String,
    pub name: String,
    pub price: U256,
    pub images: Vec<Vec<u8>>,
}

#[async_trait]
impl Workflow for CreateProduct {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::CreateProduct
    }

    async fn build(&self, ctx: &WorkflowContext, predictions: &mut Predictions) -> Result<CallBatch, OrchestrationError> {
        let uploads = async {
            let images = try_join_all(self.images.iter().map(|image| ctx.content.put_bytes(image.clone()))).await?;
            let metadata = serde_json::json!({
                "sku": self.sku,
                "name": self.name,
                "price": self.price.to_string(),
                "images": images.iter().map(|image| image.cid.as_str()).collect::<Vec<_>>(),
            });
            Ok::<_, OrchestrationError>(ctx.content.put_json(&metadata).await?)
        };
        let (metadata, time) = tokio::try_join!(uploads, ctx.timestamp())?;
        debug!("Product {} metadata stored as {}", self.sku, metadata.cid);

        let mut builder = CallBatchBuilder::new();
        let data = ethers::abi::encode(&[
            Token::String(self.sku.clone()),
            Token::Uint(self.price),
            Token::FixedBytes(metadata.digest.as_bytes().to_vec()),
        ]);
        let product = attest(
            &mut builder,
            ctx,
            time,
            AttestationRequest {
                schema: self.store.product_schema,
                recipient: self.store.order_contract,
                expiration_time: 0,
                revocable: true,
                ref_uid: self.store.store_attestation,
                data: Bytes::from(data),
                value: U256::zero(),
            },
        )?;
        predictions.attestation(PRODUCT_ATTESTATION, product, self.store.product_schema);

        builder.append(ctx.encoder.encode(&Operation::Invoke {
            target: self.store.order_contract,
            signature: LIST_PRODUCT.to_string(),
            args: vec![Token::FixedBytes(product.as_bytes().to_vec()), Token::Uint(self.price)],
            value: U256::zero(),
        })?);

        info!("Product {} composed with predicted UID {:?}", self.sku, product);
        Ok(builder.build())
    }
}

/// Predicted UID of the product listed by a `CreateProduct` run
pub fn listed_product(predictions: &Predictions) -> Result<H256, OrchestrationError> {
    predictions.identifier(PRODUCT_ATTESTATION)
}
