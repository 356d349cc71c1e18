// src/paymaster.rs
use std::cmp;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ethers::signers::Signer;
use ethers::types::{Address, Bytes, U256};
use tracing::{debug, info};

use crate::chain::{ChainRegistry, ChainRuntime};
use crate::codec;
use crate::error::PaymasterError;
use crate::gas;
use crate::policy::{PolicyEngine, SponsorshipDecision};
use crate::types::{
    EntryPointVersion, GasPriceTiers, PaymasterDataResponse, PaymasterStubDataResponse,
    SponsorshipMode, UserOperation, ValidityWindow,
};

// Fallback estimator for the paymaster gas limits on the stub path. Real
// estimates should come from eth_estimateUserOperationGas; these caps only
// bound the placeholder values signed during estimation.
const PAYMASTER_GAS_BASE: u64 = 40_000;
const GAS_PER_CALLDATA_BYTE: u64 = 16;
const VERIFICATION_GAS_CAP: u64 = 150_000;
const POST_OP_GAS_CAP: u64 = 50_000;

pub struct Paymaster {
    registry: Arc<ChainRegistry>,
    policy: Arc<dyn PolicyEngine>,
    mode: SponsorshipMode,
}

impl Paymaster {
    pub fn new(registry: Arc<ChainRegistry>, policy: Arc<dyn PolicyEngine>) -> Self {
        Self {
            registry,
            policy,
            mode: SponsorshipMode { allow_all_bundlers: true, validation_mode: 0 },
        }
    }

    pub async fn get_gas_price(&self, chain_id: u64) -> Result<GasPriceTiers, PaymasterError> {
        let runtime = self.registry.resolve(chain_id)?;
        Ok(gas::quote(runtime).await)
    }

    /// Estimation-time sponsorship: signs over placeholder paymaster gas
    /// limits so bundlers can run gas estimation against a complete blob.
    pub async fn get_stub_data(
        &self,
        op: &UserOperation,
        entry_point: Address,
        chain_id: u64,
    ) -> Result<PaymasterStubDataResponse, PaymasterError> {
        let runtime = self.registry.resolve(chain_id)?;
        let version = runtime.entry_point_version(entry_point)?;
        validate_operation(op, false)?;

        let (verification_gas, post_op_gas) = match (
            op.paymaster_verification_gas_limit,
            op.paymaster_post_op_gas_limit,
        ) {
            (Some(v), Some(p)) => (v, p),
            _ => estimate_paymaster_gas(op.call_data.len()),
        };

        let (window, data) = self
            .authorize(runtime, op, entry_point, version, verification_gas, post_op_gas, unix_now()?)
            .await?;
        debug!(
            chain_id,
            sender = ?op.sender,
            valid_until = window.valid_until,
            "Issued stub sponsorship"
        );
        Ok(PaymasterStubDataResponse {
            paymaster: runtime.paymaster_address,
            paymaster_data: data,
            paymaster_verification_gas_limit: verification_gas,
            paymaster_post_op_gas_limit: post_op_gas,
        })
    }

    /// The binding authorization. The operation must arrive with its real
    /// gas fields; for packed-limb entry points the paymaster gas limits are
    /// required inputs, not guessed.
    pub async fn get_paymaster_data(
        &self,
        op: &UserOperation,
        entry_point: Address,
        chain_id: u64,
    ) -> Result<PaymasterDataResponse, PaymasterError> {
        let runtime = self.registry.resolve(chain_id)?;
        let version = runtime.entry_point_version(entry_point)?;
        validate_operation(op, true)?;

        let (verification_gas, post_op_gas) = match version {
            EntryPointVersion::V07 => match (
                op.paymaster_verification_gas_limit,
                op.paymaster_post_op_gas_limit,
            ) {
                (Some(v), Some(p)) => (v, p),
                _ => {
                    return Err(PaymasterError::MalformedOperation(
                        "paymaster gas limits are required for final sponsorship".to_string(),
                    ))
                }
            },
            EntryPointVersion::V06 => op
                .paymaster_verification_gas_limit
                .zip(op.paymaster_post_op_gas_limit)
                .unwrap_or_else(|| estimate_paymaster_gas(op.call_data.len())),
        };

        let (window, data) = self
            .authorize(runtime, op, entry_point, version, verification_gas, post_op_gas, unix_now()?)
            .await?;
        info!(
            chain_id,
            sender = ?op.sender,
            valid_after = window.valid_after,
            valid_until = window.valid_until,
            "Sponsored operation"
        );
        Ok(PaymasterDataResponse {
            paymaster: runtime.paymaster_address,
            paymaster_data: data,
        })
    }

    pub async fn validate_policies(
        &self,
        op: &UserOperation,
        chain_id: u64,
    ) -> SponsorshipDecision {
        self.policy.evaluate(op, chain_id).await
    }

    /// Build the validity window, digest and signature for one request.
    /// `now` is injected so the window arithmetic is testable.
    async fn authorize(
        &self,
        runtime: &ChainRuntime,
        op: &UserOperation,
        entry_point: Address,
        version: EntryPointVersion,
        verification_gas: U256,
        post_op_gas: U256,
        now: u64,
    ) -> Result<(ValidityWindow, Bytes), PaymasterError> {
        let window = ValidityWindow::starting_at(now);
        let preimage = codec::paymaster_data_preimage(
            runtime.paymaster_address,
            verification_gas,
            post_op_gas,
            self.mode,
            window,
        )?;
        let digest =
            codec::signing_digest(op, &preimage, entry_point, runtime.chain_id, version)?;
        let signature = runtime
            .wallet
            .sign_message(digest.as_bytes())
            .await
            .map_err(|e| PaymasterError::Signing(e.to_string()))?;
        let data = codec::encode_paymaster_data(self.mode, window, &signature.to_vec());
        Ok((window, Bytes::from(data)))
    }
}

fn unix_now() -> Result<u64, PaymasterError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| PaymasterError::InvalidParameters(e.to_string()))
}

fn validate_operation(op: &UserOperation, binding: bool) -> Result<(), PaymasterError> {
    if op.sender == Address::zero() {
        return Err(PaymasterError::MalformedOperation(
            "sender is the zero address".to_string(),
        ));
    }
    if binding && (op.max_fee_per_gas.is_zero() || op.max_priority_fee_per_gas.is_zero()) {
        return Err(PaymasterError::MalformedOperation(
            "gas price cannot be zero".to_string(),
        ));
    }
    Ok(())
}

/// Heuristic paymaster gas estimate: 40000 base plus 16 gas per callData
/// byte, capped per limit.
fn estimate_paymaster_gas(call_data_len: usize) -> (U256, U256) {
    let raw = PAYMASTER_GAS_BASE + GAS_PER_CALLDATA_BYTE * call_data_len as u64;
    (
        U256::from(cmp::min(raw, VERIFICATION_GAS_CAP)),
        U256::from(cmp::min(raw, POST_OP_GAS_CAP)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChainConfig, EntryPointConfig};
    use crate::policy::PermissiveEngine;
    use ethers::types::Signature;

    const CHAIN_ID: u64 = 11155111;

    fn entry_point_v07() -> Address {
        "0x0000000071727de22e5e9d8baf0edac6f37da032".parse().unwrap()
    }

    fn entry_point_v06() -> Address {
        "0x5ff137d4b0fdcd49dca30c7cf57e578a026d2789".parse().unwrap()
    }

    fn paymaster() -> Paymaster {
        let config = ChainConfig {
            chain_id: CHAIN_ID,
            rpc_url: "http://localhost:8545".to_string(),
            paymaster_address: Address::repeat_byte(0x33),
            private_key: Some(
                "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318".to_string(),
            ),
            private_key_env: None,
            entry_points: vec![
                EntryPointConfig { address: entry_point_v06(), version: EntryPointVersion::V06 },
                EntryPointConfig { address: entry_point_v07(), version: EntryPointVersion::V07 },
            ],
        };
        let registry = ChainRegistry::from_configs(&[config]).unwrap();
        Paymaster::new(Arc::new(registry), Arc::new(PermissiveEngine))
    }

    fn sample_op() -> UserOperation {
        UserOperation {
            sender: Address::repeat_byte(0x9f),
            nonce: U256::from(1),
            call_data: Bytes::from(vec![0xb6, 0x1d, 0x27, 0xf6]),
            call_gas_limit: U256::from(90_000),
            verification_gas_limit: U256::from(150_000),
            pre_verification_gas: U256::from(21_000),
            max_fee_per_gas: U256::from(45_000_000_000u64),
            max_priority_fee_per_gas: U256::from(3_000_000_000u64),
            paymaster_verification_gas_limit: Some(U256::from(100_000)),
            paymaster_post_op_gas_limit: Some(U256::from(30_000)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn stub_data_has_expected_shape() {
        let pm = paymaster();
        let mut op = sample_op();
        op.paymaster_verification_gas_limit = None;
        op.paymaster_post_op_gas_limit = None;
        let resp = pm.get_stub_data(&op, entry_point_v07(), CHAIN_ID).await.unwrap();
        assert_eq!(resp.paymaster, Address::repeat_byte(0x33));
        // mode(1) + validUntil(6) + validAfter(6) + 65-byte signature
        assert_eq!(resp.paymaster_data.len(), 78);
        // heuristic: 40000 + 16 * 4 callData bytes
        assert_eq!(resp.paymaster_verification_gas_limit, U256::from(40_064));
        assert_eq!(resp.paymaster_post_op_gas_limit, U256::from(40_064));
    }

    #[tokio::test]
    async fn heuristic_estimate_is_capped() {
        let (verif, post) = estimate_paymaster_gas(100_000);
        assert_eq!(verif, U256::from(VERIFICATION_GAS_CAP));
        assert_eq!(post, U256::from(POST_OP_GAS_CAP));
    }

    #[tokio::test]
    async fn final_data_signature_recovers_to_signer() {
        let pm = paymaster();
        let op = sample_op();
        let runtime = pm.registry.resolve(CHAIN_ID).unwrap();
        let now = 1_700_000_000;

        let (window, data) = pm
            .authorize(
                runtime,
                &op,
                entry_point_v07(),
                EntryPointVersion::V07,
                U256::from(100_000),
                U256::from(30_000),
                now,
            )
            .await
            .unwrap();
        assert_eq!(window.valid_after, now - 60);
        assert_eq!(window.valid_until, now + 3600);
        assert_eq!(data.len(), 78);

        // The embedded signature must recover to the chain's signing key
        // over the exact digest the verifier contract recomputes.
        let preimage = codec::paymaster_data_preimage(
            runtime.paymaster_address,
            U256::from(100_000),
            U256::from(30_000),
            pm.mode,
            window,
        )
        .unwrap();
        let digest = codec::signing_digest(
            &op,
            &preimage,
            entry_point_v07(),
            CHAIN_ID,
            EntryPointVersion::V07,
        )
        .unwrap();
        let signature = Signature::try_from(&data[13..]).unwrap();
        let recovered = signature.recover(digest.as_bytes().to_vec()).unwrap();
        assert_eq!(recovered, runtime.wallet.address());
    }

    #[tokio::test]
    async fn final_data_requires_gas_limits_on_v07() {
        let pm = paymaster();
        let mut op = sample_op();
        op.paymaster_verification_gas_limit = None;
        let err = pm.get_paymaster_data(&op, entry_point_v07(), CHAIN_ID).await.unwrap_err();
        assert!(matches!(err, PaymasterError::MalformedOperation(_)));
    }

    #[tokio::test]
    async fn final_data_rejects_zero_gas_price() {
        let pm = paymaster();
        let mut op = sample_op();
        op.max_fee_per_gas = U256::zero();
        let err = pm.get_paymaster_data(&op, entry_point_v07(), CHAIN_ID).await.unwrap_err();
        assert!(matches!(err, PaymasterError::MalformedOperation(_)));
    }

    #[tokio::test]
    async fn unsupported_chain_is_rejected_before_signing() {
        let pm = paymaster();
        let err = pm.get_stub_data(&sample_op(), entry_point_v07(), 424242).await.unwrap_err();
        assert!(matches!(err, PaymasterError::UnsupportedChain(424242)));
    }

    #[tokio::test]
    async fn unknown_entry_point_is_rejected() {
        let pm = paymaster();
        let err = pm
            .get_stub_data(&sample_op(), Address::repeat_byte(0x99), CHAIN_ID)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymasterError::UnsupportedEntryPoint { .. }));
    }

    #[tokio::test]
    async fn v06_final_data_round_trips_signature() {
        let pm = paymaster();
        let op = sample_op();
        let resp = pm.get_paymaster_data(&op, entry_point_v06(), CHAIN_ID).await.unwrap();
        assert_eq!(resp.paymaster_data.len(), 78);
        assert_eq!(resp.paymaster, Address::repeat_byte(0x33));
    }
}
