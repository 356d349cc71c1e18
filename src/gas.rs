// src/gas.rs
use ethers::providers::Middleware;
use ethers::types::{BlockNumber, U256};
use tracing::warn;

use crate::chain::ChainRuntime;
use crate::error::PaymasterError;
use crate::types::{GasPriceTier, GasPriceTiers};

/// Fallback fee data used when the chain cannot be queried. Sponsorship
/// availability must not depend on the fee endpoint being up.
pub const FALLBACK_BASE_FEE_WEI: u64 = 30_000_000_000; // 30 gwei
pub const FALLBACK_PRIORITY_FEE_WEI: u64 = 2_000_000_000; // 2 gwei

/// Quote slow/standard/fast fee suggestions for a chain. Never fails: on
/// upstream trouble the fallback constants feed the same tier arithmetic.
pub async fn quote(runtime: &ChainRuntime) -> GasPriceTiers {
    let (base_fee, priority_fee) = match fetch_fee_data(runtime).await {
        Ok(fees) => fees,
        Err(e) => {
            warn!(chain_id = runtime.chain_id, error = %e, "Fee data unavailable, using fallback");
            (
                U256::from(FALLBACK_BASE_FEE_WEI),
                U256::from(FALLBACK_PRIORITY_FEE_WEI),
            )
        }
    };
    compute_tiers(base_fee, priority_fee)
}

async fn fetch_fee_data(runtime: &ChainRuntime) -> Result<(U256, U256), PaymasterError> {
    let block = runtime
        .provider
        .get_block(BlockNumber::Latest)
        .await
        .map_err(|e| PaymasterError::Provider(e.to_string()))?
        .ok_or_else(|| PaymasterError::Provider("no latest block".to_string()))?;
    let base_fee = block
        .base_fee_per_gas
        .ok_or_else(|| PaymasterError::Provider("no base fee in latest block".to_string()))?;
    let priority_fee: U256 = runtime
        .provider
        .request("eth_maxPriorityFeePerGas", ())
        .await
        .map_err(|e| PaymasterError::Provider(e.to_string()))?;
    Ok((base_fee, priority_fee))
}

/// Tier arithmetic, integer floor division throughout:
/// standard priority = 1.5x the chain's suggestion, slow = 0.8x standard,
/// fast = 1.2x standard, and every tier's max fee = (base + priority) * 1.5.
fn compute_tiers(base_fee: U256, priority_fee: U256) -> GasPriceTiers {
    let standard_priority = priority_fee * 3 / 2;
    let slow_priority = standard_priority * 4 / 5;
    let fast_priority = standard_priority * 6 / 5;
    let tier = |priority: U256| GasPriceTier {
        max_fee_per_gas: (base_fee + priority) * 3 / 2,
        max_priority_fee_per_gas: priority,
    };
    GasPriceTiers {
        slow: tier(slow_priority),
        standard: tier(standard_priority),
        fast: tier(fast_priority),
    }
}
