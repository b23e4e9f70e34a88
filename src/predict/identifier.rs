//! Identifier Prediction
//!
//! Replicates the attestation registry's UID rules. Both use packed encoding:
//! no length prefixes, each field at its natural width, concatenated and then
//! hashed with keccak256.

use ethers::types::{Address, H256};
use ethers::utils::keccak256;

/// UID of a schema record: `keccak256(schema ‖ resolver ‖ revocable)`
pub fn schema_uid(schema: &str, resolver: Address, revocable: bool) -> H256 {
    let mut data = Vec::with_capacity(schema.len() + 21);
    data.extend_from_slice(schema.as_bytes());
    data.extend_from_slice(resolver.as_bytes());
    data.push(revocable as u8);
    H256::from(keccak256(data))
}

/// Fields of an attestation that feed into its UID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationFields<'a> {
    pub schema: H256,
    pub recipient: Address,
    pub attester: Address,
    /// Timestamp of the block that records the attestation
    pub time: u64,
    pub expiration_time: u64,
    pub revocable: bool,
    pub ref_uid: H256,
    pub data: &'a [u8],
}

/// UID of an attestation
///
/// `bump` is zero unless the registry had to resolve a collision with an
/// existing record, in which case it is incremented until the UID is free.
pub fn attestation_uid(fields: &AttestationFields<'_>, bump: u32) -> H256 {
    let mut data = Vec::with_capacity(32 + 20 + 20 + 8 + 8 + 1 + 32 + fields.data.len() + 4);
    data.extend_from_slice(fields.schema.as_bytes());
    data.extend_from_slice(fields.recipient.as_bytes());
    data.extend_from_slice(fields.attester.as_bytes());
    data.extend_from_slice(&fields.time.to_be_bytes());
    data.extend_from_slice(&fields.expiration_time.to_be_bytes());
    data.push(fields.revocable as u8);
    data.extend_from_slice(fields.ref_uid.as_bytes());
    data.extend_from_slice(fields.data);
    data.extend_from_slice(&bump.to_be_bytes());
    H256::from(keccak256(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{Token, encode_packed};

    const STORE_SCHEMA: &str = "string name,bytes32 metadataHash,address store";

    #[test]
    fn test_schema_uid_matches_packed_encoding() {
        let resolver = Address::repeat_byte(0x42);
        let packed = encode_packed(&[
            Token::String(STORE_SCHEMA.to_string()),
            Token::Address(resolver),
            Token::Bool(true),
        ])
        .unwrap();

        assert_eq!(schema_uid(STORE_SCHEMA, resolver, true), H256::from(keccak256(packed)));
    }

    #[test]
    fn test_schema_uid_depends_on_every_field() {
        let resolver = Address::repeat_byte(0x42);
        let base = schema_uid(STORE_SCHEMA, resolver, true);

        assert_eq!(base, schema_uid(STORE_SCHEMA, resolver, true));
        assert_ne!(base, schema_uid(STORE_SCHEMA, resolver, false));
        assert_ne!(base, schema_uid(STORE_SCHEMA, Address::zero(), true));
        assert_ne!(base, schema_uid("string name", resolver, true));
    }

    #[test]
    fn test_attestation_uid_layout() {
        let payload = [1u8, 2, 3];
        let fields = AttestationFields {
            schema: H256::repeat_byte(0x01),
            recipient: Address::repeat_byte(0x02),
            attester: Address::repeat_byte(0x03),
            time: 1_700_000_000,
            expiration_time: 0,
            revocable: true,
            ref_uid: H256::zero(),
            data: &payload,
        };

        let mut expected = Vec::new();
        expected.extend_from_slice(&[0x01; 32]);
        expected.extend_from_slice(&[0x02; 20]);
        expected.extend_from_slice(&[0x03; 20]);
        expected.extend_from_slice(&1_700_000_000u64.to_be_bytes());
        expected.extend_from_slice(&0u64.to_be_bytes());
        expected.push(1);
        expected.extend_from_slice(&[0u8; 32]);
        expected.extend_from_slice(&payload);
        expected.extend_from_slice(&0u32.to_be_bytes());

        assert_eq!(attestation_uid(&fields, 0), H256::from(keccak256(expected)));
    }

    #[test]
    fn test_bump_and_ref_uid_change_identifier() {
        let fields = AttestationFields {
            schema: H256::repeat_byte(0x01),
            recipient: Address::zero(),
            attester: Address::repeat_byte(0x03),
            time: 10,
            expiration_time: 0,
            revocable: false,
            ref_uid: H256::zero(),
            data: &[],
        };
        let first = attestation_uid(&fields, 0);
        assert_ne!(first, attestation_uid(&fields, 1));

        let chained = AttestationFields { ref_uid: first, ..fields.clone() };
        assert_ne!(first, attestation_uid(&chained, 0));
    }
}
