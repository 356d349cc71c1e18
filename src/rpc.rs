// src/rpc.rs
use std::sync::Arc;

use ethers::types::Address;
use jsonrpsee::types::{ErrorObject, ErrorObjectOwned};
use jsonrpsee::RpcModule;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::PaymasterError;
use crate::paymaster::Paymaster;
use crate::types::UserOperation;

/// All failures cross the dispatch boundary as this JSON-RPC error code,
/// matching the wire protocol the source methods established.
pub const RPC_ERROR_CODE: i32 = -32603;

pub struct RpcHandler {
    paymaster: Arc<Paymaster>,
}

impl RpcHandler {
    pub fn new(paymaster: Arc<Paymaster>) -> Self {
        Self { paymaster }
    }
}

fn to_rpc_error(e: PaymasterError) -> ErrorObjectOwned {
    error!("Request failed: {e}");
    ErrorObject::owned(RPC_ERROR_CODE, e.to_string(), None::<()>)
}

fn invalid_params(msg: impl Into<String>) -> ErrorObjectOwned {
    ErrorObject::owned(RPC_ERROR_CODE, msg.into(), None::<()>)
}

/// Chain ids arrive as JSON numbers or 0x-hex strings depending on the
/// client; accept both.
fn parse_chain_id(value: &Value) -> Result<u64, ErrorObjectOwned> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| invalid_params("chain id out of range")),
        Value::String(s) => {
            let s = s.trim();
            let parsed = match s.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => s.parse(),
            };
            parsed.map_err(|_| invalid_params(format!("invalid chain id: {s}")))
        }
        _ => Err(invalid_params("chain id must be a number or hex string")),
    }
}

pub fn register_methods(module: &mut RpcModule<RpcHandler>) -> anyhow::Result<()> {
    module.register_async_method("pimlico_getUserOperationGasPrice", |params, context| async move {
        let mut seq = params.sequence();
        let chain_id = parse_chain_id(&seq.next::<Value>()?)?;
        debug!(chain_id, "Gas price requested");
        context
            .paymaster
            .get_gas_price(chain_id)
            .await
            .map_err(to_rpc_error)
    })?;

    module.register_async_method("pm_getPaymasterStubData", |params, context| async move {
        let mut seq = params.sequence();
        let op: UserOperation = seq.next()?;
        let entry_point: Address = seq.next()?;
        let chain_id = parse_chain_id(&seq.next::<Value>()?)?;
        let _context: Option<Value> = seq.optional_next()?;
        context
            .paymaster
            .get_stub_data(&op, entry_point, chain_id)
            .await
            .map_err(to_rpc_error)
    })?;

    module.register_async_method("pm_getPaymasterData", |params, context| async move {
        let mut seq = params.sequence();
        let op: UserOperation = seq.next()?;
        let entry_point: Address = seq.next()?;
        let chain_id = parse_chain_id(&seq.next::<Value>()?)?;
        let _context: Option<Value> = seq.optional_next()?;
        context
            .paymaster
            .get_paymaster_data(&op, entry_point, chain_id)
            .await
            .map_err(to_rpc_error)
    })?;

    module.register_async_method("pm_validateSponsorshipPolicies", |params, context| async move {
        let mut seq = params.sequence();
        let op: UserOperation = seq.next()?;
        let _entry_point: Address = seq.next()?;
        let policies: Value = seq.next()?;
        // The policy hook is chain-scoped; clients carry the chain id inside
        // the policies object.
        let chain_id = match policies.get("chainId") {
            Some(v) => parse_chain_id(v)?,
            None => 0,
        };
        Ok::<_, ErrorObjectOwned>(context.paymaster.validate_policies(&op, chain_id).await)
    })?;

    Ok(())
}
