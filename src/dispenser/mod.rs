//! Beverage dispenser device: inventory-gated production behind a text
//! line protocol.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use brew_cell::delay::NoDelay;
//! use brew_cell::dispenser::DispenserServer;
//! use brew_cell::inventory::InventoryLedger;
//!
//! # async fn example() -> brew_cell::error::CellResult<()> {
//! let ledger = Arc::new(InventoryLedger::new(20));
//! let server = DispenserServer::bind("127.0.0.1:0", ledger, Arc::new(NoDelay)).await?;
//! let handle = server.spawn()?;
//! println!("dispenser on {}", handle.local_addr());
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod protocol;
pub mod server;

pub use protocol::{Reply, Request};
pub use server::DispenserServer;
