//! ABI Helpers
//!
//! Function signatures of the registry contracts, selector computation, and
//! the argument checks shared by the encoder and the address predictor.

use crate::{Reference, error::EncodingError};
use ethers::abi::{ParamType, Token};
use ethers::types::{Bytes, H256, U256};
use ethers::utils::keccak256;

pub const REGISTER_SCHEMA: &str = "register(string,address,bool)";
pub const GET_SCHEMA: &str = "getSchema(bytes32)";
pub const ATTEST: &str = "attest((bytes32,(address,uint64,bool,bytes32,bytes,uint256)))";
pub const REVOKE: &str = "revoke((bytes32,(bytes32,uint256)))";
pub const REGISTER_POLICY: &str = "registerPolicy(address)";

/// First four bytes of the keccak256 of a canonical signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Selector followed by the standard ABI encoding of `tokens`
pub fn encode_call(signature: &str, tokens: &[Token]) -> Bytes {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&ethers::abi::encode(tokens));
    data.into()
}

/// Decode call data against `signature`, returning `None` if the selector or
/// argument encoding does not match
pub fn decode_call(signature: &str, params: &[ParamType], payload: &[u8]) -> Option<Vec<Token>> {
    if payload.len() < 4 || payload[..4] != selector(signature) {
        return None;
    }
    ethers::abi::decode(params, &payload[4..]).ok()
}

/// `(string schema, address resolver, bool revocable)`
pub fn register_schema_params() -> Vec<ParamType> {
    vec![ParamType::String, ParamType::Address, ParamType::Bool]
}

pub fn register_policy_params() -> Vec<ParamType> {
    vec![ParamType::Address]
}

/// `(bytes32 schema, (address recipient, uint64 expirationTime, bool revocable,
/// bytes32 refUID, bytes data, uint256 value))`
pub fn attest_params() -> Vec<ParamType> {
    vec![ParamType::Tuple(vec![
        ParamType::FixedBytes(32),
        ParamType::Tuple(vec![
            ParamType::Address,
            ParamType::Uint(64),
            ParamType::Bool,
            ParamType::FixedBytes(32),
            ParamType::Bytes,
            ParamType::Uint(256),
        ]),
    ])]
}

/// `(bytes32 schema, (bytes32 uid, uint256 value))`
pub fn revoke_params() -> Vec<ParamType> {
    vec![ParamType::Tuple(vec![
        ParamType::FixedBytes(32),
        ParamType::Tuple(vec![ParamType::FixedBytes(32), ParamType::Uint(256)]),
    ])]
}

/// Check that `tokens` matches `params` in arity and type
///
/// Stricter than `Token::type_check`: integers must fit the declared width
/// and fixed-size byte strings must have exactly the declared length, at any
/// nesting depth.
///
/// # Arguments
/// * `context` - Where the tokens are used, for the error message
/// * `params` - Declared parameter types
/// * `tokens` - Values to check
pub fn check_tokens(context: &str, params: &[ParamType], tokens: &[Token]) -> Result<(), EncodingError> {
    if params.len() != tokens.len() {
        return Err(EncodingError::ArityMismatch {
            context: context.to_string(),
            expected: params.len(),
            got: tokens.len(),
        });
    }
    for (index, (param, token)) in params.iter().zip(tokens).enumerate() {
        if !fits(param, token) {
            return Err(EncodingError::TypeMismatch {
                context: context.to_string(),
                index,
                expected: param.to_string(),
            });
        }
    }
    Ok(())
}

/// Whether `token` is a value of `param` without truncation or padding
fn fits(param: &ParamType, token: &Token) -> bool {
    match (param, token) {
        (ParamType::Uint(bits), Token::Uint(value)) => value.bits() <= *bits,
        (ParamType::Int(bits), Token::Int(value)) => int_fits(*value, *bits),
        (ParamType::FixedBytes(size), Token::FixedBytes(bytes)) => bytes.len() == *size,
        (ParamType::Array(inner), Token::Array(items)) => items.iter().all(|item| fits(inner, item)),
        (ParamType::FixedArray(inner, len), Token::FixedArray(items)) => {
            items.len() == *len && items.iter().all(|item| fits(inner, item))
        }
        (ParamType::Tuple(params), Token::Tuple(items)) => {
            params.len() == items.len() && params.iter().zip(items).all(|(param, item)| fits(param, item))
        }
        _ => token.type_check(param),
    }
}

/// Two's complement `value` is the sign extension of a `bits`-wide integer
fn int_fits(value: U256, bits: usize) -> bool {
    if bits >= 256 {
        return true;
    }
    let half = U256::one() << (bits - 1);
    // Non-negative below 2^(bits-1), or negative with every high bit set
    value < half || !value < half
}

/// Parse a solidity type name such as `address`, `uint64` or `bytes32[]`
pub fn parse_param_type(name: &str) -> Result<ParamType, EncodingError> {
    let name = name.trim();
    let unsupported = || EncodingError::UnsupportedType(name.to_string());

    if let Some(inner) = name.strip_suffix("[]") {
        return Ok(ParamType::Array(Box::new(parse_param_type(inner)?)));
    }

    match name {
        "address" => return Ok(ParamType::Address),
        "bool" => return Ok(ParamType::Bool),
        "string" => return Ok(ParamType::String),
        "bytes" => return Ok(ParamType::Bytes),
        "uint" => return Ok(ParamType::Uint(256)),
        "int" => return Ok(ParamType::Int(256)),
        _ => {}
    }

    let sized = |digits: &str| digits.parse::<usize>().map_err(|_| unsupported());
    if let Some(digits) = name.strip_prefix("bytes") {
        let size = sized(digits)?;
        if (1..=32).contains(&size) {
            return Ok(ParamType::FixedBytes(size));
        }
    } else if let Some(digits) = name.strip_prefix("uint") {
        let bits = sized(digits)?;
        if bits % 8 == 0 && (8..=256).contains(&bits) {
            return Ok(ParamType::Uint(bits));
        }
    } else if let Some(digits) = name.strip_prefix("int") {
        let bits = sized(digits)?;
        if bits % 8 == 0 && (8..=256).contains(&bits) {
            return Ok(ParamType::Int(bits));
        }
    }
    Err(unsupported())
}

/// Parse the parameter list of a flat signature like `listProduct(bytes32,uint256)`
pub fn parse_signature(signature: &str) -> Result<Vec<ParamType>, EncodingError> {
    let invalid = || EncodingError::InvalidSignature(signature.to_string());
    let open = signature.find('(').ok_or_else(invalid)?;
    let inner = signature[open + 1..].strip_suffix(')').ok_or_else(invalid)?;
    if open == 0 || inner.contains('(') {
        return Err(invalid());
    }
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    inner.split(',').map(parse_param_type).collect()
}

/// Every address and 32-byte word embedded in `tokens`, in encounter order
///
/// Zero values are skipped; they never refer to a ledger object.
pub fn token_references(tokens: &[Token]) -> Vec<Reference> {
    let mut found = Vec::new();
    collect_references(tokens, &mut found);
    found
}

fn collect_references(tokens: &[Token], found: &mut Vec<Reference>) {
    for token in tokens {
        match token {
            Token::Address(address) if !address.is_zero() => push_unique(found, Reference::Address(*address)),
            Token::FixedBytes(bytes) if bytes.len() == 32 => {
                let word = H256::from_slice(bytes);
                if !word.is_zero() {
                    push_unique(found, Reference::Identifier(word));
                }
            }
            Token::Array(items) | Token::FixedArray(items) | Token::Tuple(items) => collect_references(items, found),
            _ => {}
        }
    }
}

pub(crate) fn push_unique(found: &mut Vec<Reference>, reference: Reference) {
    if !found.contains(&reference) {
        found.push(reference);
    }
}
