// src/codec.rs
//
// Canonical byte layouts for the signing pipeline: operation packing (both
// entry-point generations), the two-level signing digest, and the
// paymaster-data preimage/final blob. Every byte here is part of the external
// signing contract; the on-chain verifier recomputes these layouts exactly.
use ethers::abi::{encode, Token};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;

use crate::error::PaymasterError;
use crate::types::{EntryPointVersion, SponsorshipMode, UserOperation, ValidityWindow};

/// Pack two 128-bit quantities into one 256-bit word: `(high << 128) | low`.
/// Used for `accountGasLimits` and `gasFees` in the v0.7 scheme.
pub fn pack_limbs(high: U256, low: U256) -> Result<[u8; 32], PaymasterError> {
    let mut word = [0u8; 32];
    word[..16].copy_from_slice(&to_u128_be(high, "high limb")?);
    word[16..].copy_from_slice(&to_u128_be(low, "low limb")?);
    Ok(word)
}

/// Inverse of [`pack_limbs`]; returns `(high, low)`.
pub fn unpack_limbs(word: [u8; 32]) -> (U256, U256) {
    (
        U256::from_big_endian(&word[..16]),
        U256::from_big_endian(&word[16..]),
    )
}

fn to_u128_be(value: U256, what: &str) -> Result<[u8; 16], PaymasterError> {
    if value.bits() > 128 {
        return Err(PaymasterError::MalformedOperation(format!(
            "{what} exceeds 128 bits: {value}"
        )));
    }
    let mut full = [0u8; 32];
    value.to_big_endian(&mut full);
    let mut out = [0u8; 16];
    out.copy_from_slice(&full[16..]);
    Ok(out)
}

fn to_u48_be(value: u64) -> [u8; 6] {
    let mut out = [0u8; 6];
    out.copy_from_slice(&value.to_be_bytes()[2..]);
    out
}

/// Legacy flat encoding: nine fixed-width ABI slots. `pnd_hash` fills the
/// paymasterAndData slot.
pub fn pack_legacy(op: &UserOperation, pnd_hash: [u8; 32]) -> Vec<u8> {
    encode(&[
        Token::Address(op.sender),
        Token::Uint(op.nonce),
        Token::FixedBytes(keccak256(&op.init_code).to_vec()),
        Token::FixedBytes(keccak256(&op.call_data).to_vec()),
        Token::Uint(op.call_gas_limit),
        Token::Uint(op.verification_gas_limit),
        Token::Uint(op.pre_verification_gas),
        Token::Uint(op.max_fee_per_gas),
        Token::Uint(op.max_priority_fee_per_gas),
        Token::FixedBytes(pnd_hash.to_vec()),
    ])
}

/// Packed-limb encoding: verification/call gas limits share one word
/// (`accountGasLimits`), the two fee fields share another (`gasFees`).
pub fn pack_v07(op: &UserOperation, pnd_hash: [u8; 32]) -> Result<Vec<u8>, PaymasterError> {
    let account_gas_limits = pack_limbs(op.verification_gas_limit, op.call_gas_limit)?;
    let gas_fees = pack_limbs(op.max_priority_fee_per_gas, op.max_fee_per_gas)?;
    Ok(encode(&[
        Token::Address(op.sender),
        Token::Uint(op.nonce),
        Token::FixedBytes(account_gas_limits.to_vec()),
        Token::Uint(op.pre_verification_gas),
        Token::FixedBytes(gas_fees.to_vec()),
        Token::FixedBytes(keccak256(&op.init_code).to_vec()),
        Token::FixedBytes(keccak256(&op.call_data).to_vec()),
        Token::FixedBytes(pnd_hash.to_vec()),
    ]))
}

/// The 32-byte hash the paymaster key signs over. Two-level construction:
/// hash the packed operation (with the paymaster-data preimage hash in its
/// slot), then domain-bind with the entry point and chain id and hash again.
pub fn signing_digest(
    op: &UserOperation,
    paymaster_data_preimage: &[u8],
    entry_point: Address,
    chain_id: u64,
    version: EntryPointVersion,
) -> Result<H256, PaymasterError> {
    let pnd_hash = keccak256(paymaster_data_preimage);
    let packed = match version {
        EntryPointVersion::V06 => pack_legacy(op, pnd_hash),
        EntryPointVersion::V07 => pack_v07(op, pnd_hash)?,
    };
    let inner = keccak256(&packed);
    let digest = keccak256(encode(&[
        Token::FixedBytes(inner.to_vec()),
        Token::Address(entry_point),
        Token::Uint(U256::from(chain_id)),
    ]));
    Ok(H256::from(digest))
}

/// The not-yet-signed paymaster-data preimage the digest commits to.
/// Tight packing, no slot padding:
/// `address(20) || verifGas u128 || postOpGas u128 || mode u8 || validUntil u48 || validAfter u48`.
pub fn paymaster_data_preimage(
    paymaster: Address,
    verification_gas_limit: U256,
    post_op_gas_limit: U256,
    mode: SponsorshipMode,
    window: ValidityWindow,
) -> Result<Vec<u8>, PaymasterError> {
    let mut data = Vec::with_capacity(65);
    data.extend_from_slice(paymaster.as_bytes());
    data.extend_from_slice(&to_u128_be(verification_gas_limit, "paymaster verification gas")?);
    data.extend_from_slice(&to_u128_be(post_op_gas_limit, "paymaster post-op gas")?);
    data.push(mode.as_byte());
    data.extend_from_slice(&to_u48_be(window.valid_until));
    data.extend_from_slice(&to_u48_be(window.valid_after));
    Ok(data)
}

/// The final opaque authorization blob returned to callers:
/// `mode u8 || validUntil u48 || validAfter u48 || signature`.
pub fn encode_paymaster_data(
    mode: SponsorshipMode,
    window: ValidityWindow,
    signature: &[u8],
) -> Vec<u8> {
    let mut data = Vec::with_capacity(13 + signature.len());
    data.push(mode.as_byte());
    data.extend_from_slice(&to_u48_be(window.valid_until));
    data.extend_from_slice(&to_u48_be(window.valid_after));
    data.extend_from_slice(signature);
    data
}
