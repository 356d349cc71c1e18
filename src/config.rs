// src/config.rs
use std::fs;
use std::path::Path;

use ethers::types::Address;
use serde::Deserialize;

use crate::error::PaymasterError;
use crate::types::EntryPointVersion;

/// One entry-point contract recognized on a chain, tagged with the protocol
/// generation that decides the packing scheme.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPointConfig {
    pub address: Address,
    pub version: EntryPointVersion,
}

/// Static per-chain configuration. Loaded once at startup; the runtime
/// registry is built from these and never mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub chain_id: u64,
    pub rpc_url: String,
    pub paymaster_address: Address,
    /// Hex-encoded signing key. Leave unset and use `privateKeyEnv` to pull
    /// the key from the environment instead of the config file.
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub private_key_env: Option<String>,
    pub entry_points: Vec<EntryPointConfig>,
}

impl ChainConfig {
    /// Resolve the signing key material, preferring the env indirection.
    pub fn signing_key(&self) -> Result<String, PaymasterError> {
        if let Some(var) = &self.private_key_env {
            return std::env::var(var).map_err(|_| {
                PaymasterError::Configuration(format!(
                    "chain {}: environment variable {var} is not set",
                    self.chain_id
                ))
            });
        }
        self.private_key.clone().ok_or_else(|| {
            PaymasterError::Configuration(format!(
                "chain {}: no private key configured",
                self.chain_id
            ))
        })
    }

    pub fn validate(&self) -> Result<(), PaymasterError> {
        if self.rpc_url.trim().is_empty() {
            return Err(PaymasterError::Configuration(format!(
                "chain {}: missing RPC endpoint",
                self.chain_id
            )));
        }
        if self.entry_points.is_empty() {
            return Err(PaymasterError::Configuration(format!(
                "chain {}: no entry points configured",
                self.chain_id
            )));
        }
        self.signing_key().map(|_| ())
    }
}

/// Load and validate the chain configuration file (a JSON array of chains).
pub fn load_chains(path: &Path) -> Result<Vec<ChainConfig>, PaymasterError> {
    let raw = fs::read_to_string(path).map_err(|e| {
        PaymasterError::Configuration(format!("cannot read {}: {e}", path.display()))
    })?;
    let chains: Vec<ChainConfig> = serde_json::from_str(&raw).map_err(|e| {
        PaymasterError::Configuration(format!("cannot parse {}: {e}", path.display()))
    })?;
    if chains.is_empty() {
        return Err(PaymasterError::Configuration(
            "no chains configured".to_string(),
        ));
    }
    for chain in &chains {
        chain.validate()?;
    }
    Ok(chains)
}
