// src/error.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymasterError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported chain id: {0}")]
    UnsupportedChain(u64),

    #[error("Unsupported entry point {entry_point} on chain {chain_id}")]
    UnsupportedEntryPoint { entry_point: String, chain_id: u64 },

    #[error("Invalid UserOperation: {0}")]
    MalformedOperation(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Ethereum provider error: {0}")]
    Provider(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}
