//! Address Prediction
//!
//! Replicates the CREATE2 rule used by the deterministic deployment factory:
//!
//! ```text
//! address = keccak256(0xff ‖ deployer ‖ salt ‖ keccak256(init_code))[12..]
//! ```
//!
//! `init_code` is the unit's creation bytecode followed by its ABI-encoded
//! constructor arguments, exactly as the deployment transaction carries them.

use crate::{Salt, artifact::Artifact, encode::abi, error::EncodingError};
use ethers::abi::Token;
use ethers::types::{Address, Bytes, H256};
use ethers::utils::keccak256;

/// Derive the salt for a unit deployed on behalf of `actor`
///
/// The salt is a pure function of its inputs. Retrying a reverted batch
/// therefore targets the same addresses as the first attempt.
pub fn derive_salt(actor: Address, purpose: &str) -> Salt {
    let mut data = Vec::with_capacity(20 + purpose.len());
    data.extend_from_slice(actor.as_bytes());
    data.extend_from_slice(purpose.as_bytes());
    Salt(keccak256(data))
}

/// Build the creation payload of `artifact` with `args` as constructor arguments
///
/// # Errors
/// `EncodingError` if `args` does not match the declared constructor schema
/// in arity or type.
pub fn init_code(artifact: &Artifact, args: &[Token]) -> Result<Bytes, EncodingError> {
    let context = format!("constructor of {}", artifact.name);
    abi::check_tokens(&context, &artifact.constructor, args)?;

    let mut code = artifact.bytecode.to_vec();
    code.extend_from_slice(&ethers::abi::encode(args));
    Ok(code.into())
}

/// Predict the address a factory assigns when deploying a payload with `salt`
pub fn predict(deployer: Address, salt: &Salt, payload_hash: H256) -> Address {
    let mut data = Vec::with_capacity(1 + 20 + 32 + 32);
    data.push(0xff);
    data.extend_from_slice(deployer.as_bytes());
    data.extend_from_slice(salt.as_bytes());
    data.extend_from_slice(payload_hash.as_bytes());
    Address::from_slice(&keccak256(data)[12..])
}

/// Encode the init code of `artifact` and predict its deployment address
///
/// Returns the predicted address together with the init code, so the caller
/// deploys exactly the payload that was hashed.
pub fn predict_deployment(
    deployer: Address,
    salt: &Salt,
    artifact: &Artifact,
    args: &[Token],
) -> Result<(Address, Bytes), EncodingError> {
    let code = init_code(artifact, args)?;
    let address = predict(deployer, salt, H256::from(keccak256(&code)));
    Ok((address, code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::ParamType;
    use ethers::utils::get_create2_address_from_hash;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn policy_artifact() -> Artifact {
        Artifact::new(
            "storePolicy",
            vec![0x60, 0x80, 0x60, 0x40, 0x52],
            vec![ParamType::Address, ParamType::Address],
        )
    }

    #[test]
    fn test_salt_is_deterministic() {
        let actor = addr("0x1111111111111111111111111111111111111111");
        assert_eq!(derive_salt(actor, "orderContract"), derive_salt(actor, "orderContract"));
    }

    #[test]
    fn test_salt_separates_actor_and_purpose() {
        let a = addr("0x1111111111111111111111111111111111111111");
        let b = addr("0x2222222222222222222222222222222222222222");
        assert_ne!(derive_salt(a, "orderContract"), derive_salt(b, "orderContract"));
        assert_ne!(derive_salt(a, "orderContract"), derive_salt(a, "storePolicy"));
    }

    #[test]
    fn test_eip1014_vectors() {
        // Examples 0 and 1 from EIP-1014, init_code = 0x00
        let hash = H256::from(keccak256([0x00u8]));
        let zero_salt = Salt([0u8; 32]);

        assert_eq!(
            predict(Address::zero(), &zero_salt, hash),
            addr("0x4D1A2e2bB4F88F0250f26Ffff098B0b30B26BF38")
        );
        assert_eq!(
            predict(addr("0xdeadbeef00000000000000000000000000000000"), &zero_salt, hash),
            addr("0xB928f69Bb1D91Cd65274e3c79d8986362984fDA3")
        );
    }

    #[test]
    fn test_matches_reference_create2() {
        let factory = addr("0x4e59b44847b379578588920ca78fbf26c0b4956c");
        let actor = addr("0x1111111111111111111111111111111111111111");
        let salt = derive_salt(actor, "storePolicy");
        let args = [Token::Address(factory), Token::Address(actor)];

        let (predicted, code) = predict_deployment(factory, &salt, &policy_artifact(), &args).unwrap();
        let expected = get_create2_address_from_hash(factory, salt.as_bytes().to_vec(), keccak256(&code).to_vec());
        assert_eq!(predicted, expected);
    }

    #[test]
    fn test_constructor_args_change_address() {
        let factory = addr("0x4e59b44847b379578588920ca78fbf26c0b4956c");
        let salt = derive_salt(Address::zero(), "storePolicy");
        let artifact = policy_artifact();
        let a = [Token::Address(factory), Token::Address(Address::zero())];
        let b = [Token::Address(factory), Token::Address(Address::repeat_byte(1))];

        let (first, _) = predict_deployment(factory, &salt, &artifact, &a).unwrap();
        let (second, _) = predict_deployment(factory, &salt, &artifact, &b).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_init_code_appends_encoded_args() {
        let artifact = policy_artifact();
        let args = [Token::Address(Address::repeat_byte(0xaa)), Token::Address(Address::repeat_byte(0xbb))];
        let code = init_code(&artifact, &args).unwrap();

        assert_eq!(code.len(), artifact.bytecode.len() + 64);
        assert_eq!(&code[..artifact.bytecode.len()], artifact.bytecode.as_ref());
        // Addresses are left-padded to 32 bytes
        assert_eq!(&code[artifact.bytecode.len()..artifact.bytecode.len() + 12], &[0u8; 12]);
    }

    #[test]
    fn test_constructor_arity_mismatch() {
        let err = init_code(&policy_artifact(), &[Token::Address(Address::zero())]).unwrap_err();
        assert!(matches!(err, EncodingError::ArityMismatch { expected: 2, got: 1, .. }));
    }

    #[test]
    fn test_constructor_type_mismatch() {
        let args = [Token::Address(Address::zero()), Token::Bool(true)];
        let err = init_code(&policy_artifact(), &args).unwrap_err();
        assert!(matches!(err, EncodingError::TypeMismatch { index: 1, .. }));
    }

    #[test]
    fn test_constructor_values_are_not_coerced() {
        let artifact = Artifact::new("sized", vec![0x60], vec![ParamType::Uint(64), ParamType::FixedBytes(32)]);

        let oversized = [Token::Uint(ethers::types::U256::MAX), Token::FixedBytes(vec![1; 32])];
        let err = init_code(&artifact, &oversized).unwrap_err();
        assert!(matches!(err, EncodingError::TypeMismatch { index: 0, .. }));

        let short = [Token::Uint(ethers::types::U256::from(1u64)), Token::FixedBytes(vec![1; 5])];
        let err = init_code(&artifact, &short).unwrap_err();
        assert!(matches!(err, EncodingError::TypeMismatch { index: 1, .. }));
    }
}
