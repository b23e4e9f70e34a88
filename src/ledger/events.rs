//! Registry Events
//!
//! Event shapes emitted by the schema registry, the attestation service and
//! core contracts, with helpers to build and decode them.

use crate::LogEntry;
use ethers::abi::{ParamType, Token};
use ethers::types::{Address, Bytes, H256};
use ethers::utils::keccak256;

pub const REGISTERED: &str = "Registered(bytes32,address,(bytes32,address,bool,string))";
pub const ATTESTED: &str = "Attested(address,address,bytes32,bytes32)";
pub const REVOKED: &str = "Revoked(address,address,bytes32,bytes32)";
pub const POLICY_REGISTERED: &str = "PolicyRegistered(address)";

/// Topic 0 of an event signature
pub fn topic(signature: &str) -> H256 {
    H256::from(keccak256(signature.as_bytes()))
}

/// An indexed address, left-padded to a full word
pub fn address_topic(address: Address) -> H256 {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    H256::from(word)
}

fn topic_address(word: &H256) -> Address {
    Address::from_slice(&word.as_bytes()[12..])
}

/// A decoded registry or core contract event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    SchemaRegistered {
        registry: Address,
        uid: H256,
        registerer: Address,
    },
    Attested {
        service: Address,
        recipient: Address,
        attester: Address,
        uid: H256,
        schema: H256,
    },
    Revoked {
        service: Address,
        recipient: Address,
        attester: Address,
        uid: H256,
        schema: H256,
    },
    PolicyRegistered {
        core: Address,
        policy: Address,
    },
}

impl RegistryEvent {
    /// Contract that emitted the event
    pub fn emitter(&self) -> Address {
        match self {
            RegistryEvent::SchemaRegistered { registry, .. } => *registry,
            RegistryEvent::Attested { service, .. } | RegistryEvent::Revoked { service, .. } => *service,
            RegistryEvent::PolicyRegistered { core, .. } => *core,
        }
    }
}

/// Decode a log into a known event, or `None` if it is not one
pub fn decode(log: &LogEntry) -> Option<RegistryEvent> {
    let signature = log.topics.first()?;

    if *signature == topic(REGISTERED) && log.topics.len() == 3 {
        return Some(RegistryEvent::SchemaRegistered {
            registry: log.emitter,
            uid: log.topics[1],
            registerer: topic_address(&log.topics[2]),
        });
    }

    let attested = *signature == topic(ATTESTED);
    if (attested || *signature == topic(REVOKED)) && log.topics.len() == 4 {
        let uid = decode_uid(&log.data)?;
        let (recipient, attester, schema) = (
            topic_address(&log.topics[1]),
            topic_address(&log.topics[2]),
            log.topics[3],
        );
        return Some(if attested {
            RegistryEvent::Attested {
                service: log.emitter,
                recipient,
                attester,
                uid,
                schema,
            }
        } else {
            RegistryEvent::Revoked {
                service: log.emitter,
                recipient,
                attester,
                uid,
                schema,
            }
        });
    }

    if *signature == topic(POLICY_REGISTERED) && log.topics.len() == 2 {
        return Some(RegistryEvent::PolicyRegistered {
            core: log.emitter,
            policy: topic_address(&log.topics[1]),
        });
    }

    None
}

fn decode_uid(data: &[u8]) -> Option<H256> {
    match ethers::abi::decode(&[ParamType::FixedBytes(32)], data).ok()?.as_slice() {
        [Token::FixedBytes(bytes)] => Some(H256::from_slice(bytes)),
        _ => None,
    }
}

/// Build the `Registered` log the schema registry emits
///
/// # Arguments
/// * `registry` - Schema registry address
/// * `uid` - Schema UID
/// * `registerer` - Account that registered the schema
/// * `resolver` - Resolver contract of the schema
/// * `revocable` - Whether attestations under the schema may be revoked
/// * `schema` - Schema text
pub fn schema_registered(
    registry: Address,
    uid: H256,
    registerer: Address,
    resolver: Address,
    revocable: bool,
    schema: &str,
) -> LogEntry {
    let record = Token::Tuple(vec![
        Token::FixedBytes(uid.as_bytes().to_vec()),
        Token::Address(resolver),
        Token::Bool(revocable),
        Token::String(schema.to_string()),
    ]);
    LogEntry {
        emitter: registry,
        topics: vec![topic(REGISTERED), uid, address_topic(registerer)],
        data: Bytes::from(ethers::abi::encode(&[record])),
    }
}

fn attestation_log(signature: &str, service: Address, recipient: Address, attester: Address, uid: H256, schema: H256) -> LogEntry {
    LogEntry {
        emitter: service,
        topics: vec![topic(signature), address_topic(recipient), address_topic(attester), schema],
        data: Bytes::from(ethers::abi::encode(&[Token::FixedBytes(uid.as_bytes().to_vec())])),
    }
}

/// Build the `Attested` log the attestation service emits
pub fn attested(service: Address, recipient: Address, attester: Address, uid: H256, schema: H256) -> LogEntry {
    attestation_log(ATTESTED, service, recipient, attester, uid, schema)
}

/// Build the `Revoked` log the attestation service emits
pub fn revoked(service: Address, recipient: Address, attester: Address, uid: H256, schema: H256) -> LogEntry {
    attestation_log(REVOKED, service, recipient, attester, uid, schema)
}

/// Build the `PolicyRegistered` log a core contract emits
pub fn policy_registered(core: Address, policy: Address) -> LogEntry {
    LogEntry {
        emitter: core,
        topics: vec![topic(POLICY_REGISTERED), address_topic(policy)],
        data: Bytes::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_attested() {
        let log = attested(
            Address::repeat_byte(0x21),
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02),
            H256::repeat_byte(0x03),
            H256::repeat_byte(0x04),
        );
        assert_eq!(
            decode(&log),
            Some(RegistryEvent::Attested {
                service: Address::repeat_byte(0x21),
                recipient: Address::repeat_byte(0x01),
                attester: Address::repeat_byte(0x02),
                uid: H256::repeat_byte(0x03),
                schema: H256::repeat_byte(0x04),
            })
        );
    }

    #[test]
    fn test_decode_schema_registered() {
        let log = schema_registered(
            Address::repeat_byte(0x20),
            H256::repeat_byte(0x09),
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02),
            true,
            "uint256 price",
        );
        let event = decode(&log).unwrap();
        assert_eq!(event.emitter(), Address::repeat_byte(0x20));
        assert!(matches!(event, RegistryEvent::SchemaRegistered { uid, .. } if uid == H256::repeat_byte(0x09)));
    }

    #[test]
    fn test_unknown_log_is_ignored() {
        let log = LogEntry {
            emitter: Address::repeat_byte(1),
            topics: vec![topic("Transfer(address,address,uint256)")],
            data: Bytes::default(),
        };
        assert_eq!(decode(&log), None);

        let empty = LogEntry {
            emitter: Address::repeat_byte(1),
            topics: vec![],
            data: Bytes::default(),
        };
        assert_eq!(decode(&empty), None);
    }

    #[test]
    fn test_address_topic_is_left_padded() {
        let word = address_topic(Address::repeat_byte(0xab));
        assert_eq!(&word.as_bytes()[..12], &[0u8; 12]);
        assert_eq!(topic_address(&word), Address::repeat_byte(0xab));
    }
}
