//! Composition root (§6): load config, build one venue client per configured
//! account, open the session registry, and serve the `Martin` gRPC service
//! until SIGINT/SIGTERM. Grounded on the teacher's own `main.rs` sequencing
//! (init logging, load settings, build clients, run until shutdown signal),
//! generalized from its local-exchange-and-engine wiring to this gateway's
//! session-registry-plus-tonic-server wiring.

mod config;
mod convert;
mod rpc;
mod streams;
mod venue_factory;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gateway_core::SessionRegistry;
use gateway_proto::martin_server::MartinServer;
use tonic::transport::Server;

use config::{load_or_write_template, DEFAULT_CONFIG_PATH};
use rpc::MartinService;

#[derive(Parser, Debug)]
#[command(name = "gateway", about = "Multi-venue spot trading RPC gateway")]
struct Cli {
    /// Path to the TOML config file (written as a template if missing).
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    gateway_utils::logger::init_logger();

    let cli = Cli::parse();
    let app_config = match load_or_write_template(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            log::error!("{err:#}");
            std::process::exit(1);
        }
    };

    let accounts: HashMap<String, _> = app_config
        .accounts
        .iter()
        .map(|account| (account.name.clone(), account.clone()))
        .collect();

    let registry = Arc::new(SessionRegistry::new());
    let service = MartinService::new(registry, accounts, app_config.endpoint.clone());

    let addr = app_config
        .listen_address
        .parse()
        .with_context(|| format!("invalid listen_address {}", app_config.listen_address))?;

    log::info!("gateway listening on {addr}");

    Server::builder()
        .add_service(MartinServer::new(service))
        .serve_with_shutdown(addr, shutdown_signal())
        .await
        .context("gRPC server exited with an error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    log::info!("shutdown signal received, stopping gateway");
}
