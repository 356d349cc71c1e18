// src/chain.rs
use std::collections::HashMap;
use std::sync::Arc;

use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use tracing::info;

use crate::config::ChainConfig;
use crate::error::PaymasterError;
use crate::types::EntryPointVersion;

/// Everything the service holds for one supported chain. Constructed once at
/// startup and shared read-only across requests; no field is ever mutated.
pub struct ChainRuntime {
    pub chain_id: u64,
    pub provider: Arc<Provider<Http>>,
    pub wallet: LocalWallet,
    pub paymaster_address: Address,
    entry_points: HashMap<Address, EntryPointVersion>,
}

impl ChainRuntime {
    fn from_config(config: &ChainConfig) -> Result<Self, PaymasterError> {
        config.validate()?;
        let wallet = config
            .signing_key()?
            .parse::<LocalWallet>()
            .map_err(|e| {
                PaymasterError::Configuration(format!(
                    "chain {}: invalid signing key: {e}",
                    config.chain_id
                ))
            })?
            .with_chain_id(config.chain_id);
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str()).map_err(|e| {
            PaymasterError::Configuration(format!(
                "chain {}: invalid RPC endpoint: {e}",
                config.chain_id
            ))
        })?;
        let entry_points = config
            .entry_points
            .iter()
            .map(|ep| (ep.address, ep.version))
            .collect();
        Ok(Self {
            chain_id: config.chain_id,
            provider: Arc::new(provider),
            wallet,
            paymaster_address: config.paymaster_address,
            entry_points,
        })
    }

    pub fn entry_point_version(
        &self,
        entry_point: Address,
    ) -> Result<EntryPointVersion, PaymasterError> {
        self.entry_points.get(&entry_point).copied().ok_or_else(|| {
            PaymasterError::UnsupportedEntryPoint {
                entry_point: format!("{entry_point:?}"),
                chain_id: self.chain_id,
            }
        })
    }

    pub fn is_entry_point_supported(&self, entry_point: Address) -> bool {
        self.entry_points.contains_key(&entry_point)
    }
}

/// Immutable map of chain id to runtime. The single source of truth for
/// "is this chain supported"; lookups are lock-free reads.
pub struct ChainRegistry {
    chains: HashMap<u64, ChainRuntime>,
}

impl ChainRegistry {
    pub fn from_configs(configs: &[ChainConfig]) -> Result<Self, PaymasterError> {
        let mut chains = HashMap::with_capacity(configs.len());
        for config in configs {
            let runtime = ChainRuntime::from_config(config)?;
            info!(
                chain_id = runtime.chain_id,
                paymaster = ?runtime.paymaster_address,
                entry_points = runtime.entry_points.len(),
                "Configured chain"
            );
            chains.insert(runtime.chain_id, runtime);
        }
        Ok(Self { chains })
    }

    pub fn resolve(&self, chain_id: u64) -> Result<&ChainRuntime, PaymasterError> {
        self.chains
            .get(&chain_id)
            .ok_or(PaymasterError::UnsupportedChain(chain_id))
    }

    pub fn is_chain_supported(&self, chain_id: u64) -> bool {
        self.chains.contains_key(&chain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EntryPointConfig;

    fn sample_config() -> ChainConfig {
        ChainConfig {
            chain_id: 11155111,
            rpc_url: "https://rpc.sepolia.example".to_string(),
            paymaster_address: Address::repeat_byte(0x33),
            private_key: Some(
                "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318".to_string(),
            ),
            private_key_env: None,
            entry_points: vec![EntryPointConfig {
                address: Address::repeat_byte(0x57),
                version: EntryPointVersion::V07,
            }],
        }
    }

    #[test]
    fn registry_resolves_configured_chain() {
        let registry = ChainRegistry::from_configs(&[sample_config()]).unwrap();
        assert!(registry.is_chain_supported(11155111));
        let runtime = registry.resolve(11155111).unwrap();
        assert_eq!(runtime.paymaster_address, Address::repeat_byte(0x33));
        assert!(runtime.is_entry_point_supported(Address::repeat_byte(0x57)));
        assert_eq!(
            runtime.entry_point_version(Address::repeat_byte(0x57)).unwrap(),
            EntryPointVersion::V07
        );
    }

    #[test]
    fn registry_rejects_unknown_chain_and_entry_point() {
        let registry = ChainRegistry::from_configs(&[sample_config()]).unwrap();
        assert!(!registry.is_chain_supported(1));
        assert!(matches!(
            registry.resolve(1),
            Err(PaymasterError::UnsupportedChain(1))
        ));
        let runtime = registry.resolve(11155111).unwrap();
        assert!(matches!(
            runtime.entry_point_version(Address::repeat_byte(0x99)),
            Err(PaymasterError::UnsupportedEntryPoint { .. })
        ));
    }

    #[test]
    fn registry_fails_fast_on_bad_key() {
        let mut config = sample_config();
        config.private_key = Some("not-a-key".to_string());
        assert!(matches!(
            ChainRegistry::from_configs(&[config]),
            Err(PaymasterError::Configuration(_))
        ));
    }
}
