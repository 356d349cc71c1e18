// src/main.rs
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use jsonrpsee::RpcModule;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod chain;
mod codec;
mod config;
mod error;
mod gas;
mod paymaster;
mod policy;
mod rpc;
mod types;

use crate::chain::ChainRegistry;
use crate::paymaster::Paymaster;
use crate::policy::PermissiveEngine;
use crate::rpc::RpcHandler;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(short, long, default_value = "127.0.0.1:8545")]
    rpc_server_addr: String,

    /// Path to the chain configuration file (JSON array of chains)
    #[clap(short, long, default_value = "chains.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    // Chain configuration problems are fatal: refuse to start rather than
    // serve a chain we cannot sign for.
    let chains = config::load_chains(&args.config)?;
    let registry = Arc::new(ChainRegistry::from_configs(&chains)?);
    let paymaster = Paymaster::new(registry, Arc::new(PermissiveEngine));

    let server_addr: SocketAddr = args.rpc_server_addr.parse()?;
    let handler = RpcHandler::new(Arc::new(paymaster));

    info!("Starting paymaster RPC server on {}", server_addr);

    let server_handle = start_server(server_addr, handler).await?;

    tokio::signal::ctrl_c().await?;
    server_handle.stop()?;
    info!("Server stopped");

    Ok(())
}

async fn start_server(
    server_addr: SocketAddr,
    handler: RpcHandler,
) -> anyhow::Result<ServerHandle> {
    let server = ServerBuilder::default().build(server_addr).await?;

    let mut module = RpcModule::new(handler);
    rpc::register_methods(&mut module)?;
    let server_handle = server.start(module);

    Ok(server_handle)
}
