// src/types.rs
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// A user operation as submitted over JSON-RPC. One struct covers both
/// protocol generations: the flat gas fields are always present (defaulting
/// to zero), while the `paymaster*` fields only appear on v0.7-style
/// operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    #[serde(default)]
    pub nonce: U256,
    #[serde(default)]
    pub init_code: Bytes,
    #[serde(default)]
    pub call_data: Bytes,
    #[serde(default)]
    pub call_gas_limit: U256,
    #[serde(default)]
    pub verification_gas_limit: U256,
    #[serde(default)]
    pub pre_verification_gas: U256,
    #[serde(default)]
    pub max_fee_per_gas: U256,
    #[serde(default)]
    pub max_priority_fee_per_gas: U256,
    #[serde(default)]
    pub paymaster_and_data: Bytes,
    #[serde(default)]
    pub signature: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
}

/// Which generation of the entry-point contract an operation is bound for.
/// Selects the packing scheme used for the signing digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryPointVersion {
    /// Legacy flat-field encoding (nine fixed-width slots).
    #[serde(rename = "v0.6")]
    V06,
    /// Packed-limb encoding (accountGasLimits / gasFees words).
    #[serde(rename = "v0.7")]
    V07,
}

/// The on-chain validity window of an authorization, in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityWindow {
    pub valid_after: u64,
    pub valid_until: u64,
}

/// Clock-skew tolerance: authorizations are valid starting one minute ago.
pub const VALID_AFTER_LOOKBACK_SECS: u64 = 60;
/// Authorizations expire one hour after generation.
pub const VALID_UNTIL_LOOKAHEAD_SECS: u64 = 3600;

impl ValidityWindow {
    pub fn starting_at(now: u64) -> Self {
        Self {
            valid_after: now.saturating_sub(VALID_AFTER_LOOKBACK_SECS),
            valid_until: now + VALID_UNTIL_LOOKAHEAD_SECS,
        }
    }
}

/// The mode/flags byte carried at the head of the authorization blob.
/// Bit 0 signals "any bundler may carry this operation"; bits 1-7 hold the
/// numeric validation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SponsorshipMode {
    pub allow_all_bundlers: bool,
    pub validation_mode: u8,
}

impl SponsorshipMode {
    pub fn as_byte(self) -> u8 {
        (self.validation_mode << 1) | u8::from(self.allow_all_bundlers)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasPriceTier {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GasPriceTiers {
    pub slow: GasPriceTier,
    pub standard: GasPriceTier,
    pub fast: GasPriceTier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterStubDataResponse {
    pub paymaster: Address,
    pub paymaster_data: Bytes,
    pub paymaster_verification_gas_limit: U256,
    pub paymaster_post_op_gas_limit: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterDataResponse {
    pub paymaster: Address,
    pub paymaster_data: Bytes,
}
