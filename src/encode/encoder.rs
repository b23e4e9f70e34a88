//! Call Encoder
//!
//! Turns an `Operation` into the `Call` the ledger executes. Besides the
//! payload, every call records which values it creates (`provides`) and which
//! it targets or embeds (`references`); the batch uses both to check ordering.

use super::abi::{self, push_unique};
use super::operation::Operation;
use crate::{
    Call, Reference,
    error::EncodingError,
    predict::{self, AttestationFields},
};
use ethers::abi::Token;
use ethers::types::U256;

/// Encodes operations into calls
///
/// Implementations must be deterministic: the same operation always encodes
/// to the same call.
pub trait CallEncoder: Send + Sync {
    fn encode(&self, operation: &Operation) -> Result<Call, EncodingError>;
}

/// Standard ABI encoding backed by `ethers::abi`
#[derive(Debug, Clone, Copy, Default)]
pub struct AbiEncoder;

impl CallEncoder for AbiEncoder {
    fn encode(&self, operation: &Operation) -> Result<Call, EncodingError> {
        encode(operation)
    }
}

/// Encode `operation` with the standard ABI rules
pub fn encode(operation: &Operation) -> Result<Call, EncodingError> {
    let label = operation.kind().to_string();

    match operation {
        Operation::Deploy {
            factory,
            salt,
            artifact,
            args,
        } => {
            let (address, code) = predict::predict_deployment(*factory, salt, artifact, args)?;

            // The factory expects the salt followed by the raw init code
            let mut payload = salt.as_bytes().to_vec();
            payload.extend_from_slice(&code);

            let mut references = vec![Reference::Address(*factory)];
            for reference in abi::token_references(args) {
                push_unique(&mut references, reference);
            }

            Ok(Call {
                label: format!("{} {}", label, artifact.name),
                target: *factory,
                payload: payload.into(),
                value: U256::zero(),
                provides: vec![Reference::Address(address)],
                references,
            })
        }

        Operation::RegisterSchema {
            registry,
            schema,
            resolver,
            revocable,
        } => {
            let tokens = [
                Token::String(schema.clone()),
                Token::Address(*resolver),
                Token::Bool(*revocable),
            ];
            let mut references = vec![Reference::Address(*registry)];
            if !resolver.is_zero() {
                references.push(Reference::Address(*resolver));
            }

            Ok(Call {
                label,
                target: *registry,
                payload: abi::encode_call(abi::REGISTER_SCHEMA, &tokens),
                value: U256::zero(),
                provides: vec![Reference::Identifier(predict::schema_uid(schema, *resolver, *revocable))],
                references,
            })
        }

        Operation::RegisterPolicy { core, policy } => {
            if policy.is_zero() {
                return Err(EncodingError::TypeMismatch {
                    context: abi::REGISTER_POLICY.to_string(),
                    index: 0,
                    expected: "non-zero address".to_string(),
                });
            }
            Ok(Call {
                label,
                target: *core,
                payload: abi::encode_call(abi::REGISTER_POLICY, &[Token::Address(*policy)]),
                value: U256::zero(),
                provides: Vec::new(),
                references: vec![Reference::Address(*core), Reference::Address(*policy)],
            })
        }

        Operation::Attest {
            service,
            attester,
            time,
            request,
        } => {
            let tokens = [Token::Tuple(vec![
                Token::FixedBytes(request.schema.as_bytes().to_vec()),
                Token::Tuple(vec![
                    Token::Address(request.recipient),
                    Token::Uint(U256::from(request.expiration_time)),
                    Token::Bool(request.revocable),
                    Token::FixedBytes(request.ref_uid.as_bytes().to_vec()),
                    Token::Bytes(request.data.to_vec()),
                    Token::Uint(request.value),
                ]),
            ])];

            let uid = predict::attestation_uid(
                &AttestationFields {
                    schema: request.schema,
                    recipient: request.recipient,
                    attester: *attester,
                    time: *time,
                    expiration_time: request.expiration_time,
                    revocable: request.revocable,
                    ref_uid: request.ref_uid,
                    data: &request.data,
                },
                0,
            );

            let mut references = vec![Reference::Address(*service), Reference::Identifier(request.schema)];
            if !request.recipient.is_zero() {
                references.push(Reference::Address(request.recipient));
            }
            if !request.ref_uid.is_zero() {
                references.push(Reference::Identifier(request.ref_uid));
            }

            Ok(Call {
                label,
                target: *service,
                payload: abi::encode_call(abi::ATTEST, &tokens),
                value: request.value,
                provides: vec![Reference::Identifier(uid)],
                references,
            })
        }

        Operation::Revoke { service, schema, uid } => {
            let tokens = [Token::Tuple(vec![
                Token::FixedBytes(schema.as_bytes().to_vec()),
                Token::Tuple(vec![Token::FixedBytes(uid.as_bytes().to_vec()), Token::Uint(U256::zero())]),
            ])];

            Ok(Call {
                label,
                target: *service,
                payload: abi::encode_call(abi::REVOKE, &tokens),
                value: U256::zero(),
                provides: Vec::new(),
                references: vec![
                    Reference::Address(*service),
                    Reference::Identifier(*schema),
                    Reference::Identifier(*uid),
                ],
            })
        }

        Operation::Invoke {
            target,
            signature,
            args,
            value,
        } => {
            let params = abi::parse_signature(signature)?;
            abi::check_tokens(signature, &params, args)?;

            let mut references = vec![Reference::Address(*target)];
            for reference in abi::token_references(args) {
                push_unique(&mut references, reference);
            }

            Ok(Call {
                label: format!("{} {}", label, signature),
                target: *target,
                payload: abi::encode_call(signature, args),
                value: *value,
                provides: Vec::new(),
                references,
            })
        }
    }
}
