//! `brew-cell`: run a simulated device, or drive both as the gateway.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use brew_cell::config::CellConfig;
use brew_cell::delay::SimulatedDelays;
use brew_cell::dispenser::DispenserServer;
use brew_cell::gateway;
use brew_cell::grinder::{GrinderServer, RegisterBank};
use brew_cell::inventory::InventoryLedger;
use brew_cell::logging;
use brew_cell::runtime::ServerHandle;

#[derive(Parser, Debug)]
#[command(name = "brew-cell", version, about)]
struct Cli {
    /// Configuration file; missing files fall back to defaults.
    #[arg(long, short, default_value = "config/cell.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the dispenser line protocol.
    Dispenser,
    /// Serve the grinder registers over Modbus TCP.
    Grinder,
    /// Produce one beverage through the gateway.
    Order {
        /// Beverage name, e.g. "FLAT WHITE".
        beverage: String,
    },
    /// Print dispenser stock and grinder registers.
    Status,
    /// Refill beans and every dispenser ingredient.
    Restock,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CellConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    logging::init(&config.application);

    match cli.command {
        Command::Dispenser => {
            let delays = Arc::new(SimulatedDelays::new(&config.dispenser, &config.grinder));
            let ledger = Arc::new(InventoryLedger::new(config.dispenser.max_storage));
            let server = DispenserServer::bind(config.dispenser.bind.as_str(), ledger, delays).await?;
            serve_until_ctrl_c(server.spawn()?).await
        }
        Command::Grinder => {
            let delays = Arc::new(SimulatedDelays::new(&config.dispenser, &config.grinder));
            let server = GrinderServer::bind(
                config.grinder.bind.as_str(),
                Arc::new(RegisterBank::new()),
                delays,
                &config.grinder,
            )
            .await?;
            serve_until_ctrl_c(server.spawn()?).await
        }
        Command::Order { beverage } => {
            let mut gw = gateway::connect(&config.gateway).await?;
            let report = gw.fulfill_order(&beverage).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Status => {
            let mut gw = gateway::connect(&config.gateway).await?;
            let stock = gw.inventory().await?;
            let regs = gw.grinder_registers().await?;
            println!("dispenser: {stock}");
            println!(
                "grinder:   command={:?} status={:?} bean_level={} error_code={:?}",
                regs.command, regs.status, regs.bean_level, regs.error_code
            );
            Ok(())
        }
        Command::Restock => {
            let mut gw = gateway::connect(&config.gateway).await?;
            gw.restock_grinder().await?;
            gw.refill_all().await?;
            println!("restocked");
            Ok(())
        }
    }
}

async fn serve_until_ctrl_c(handle: ServerHandle) -> Result<()> {
    info!(addr = %handle.local_addr(), "serving, ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    handle.shutdown().await?;
    Ok(())
}
