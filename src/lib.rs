//! Core library for the brew cell.
//!
//! The cell is two simulated devices and one orchestrator:
//!
//! - [`dispenser`]: a line-protocol TCP server that brews beverages out of a
//!   shared [`inventory::InventoryLedger`].
//! - [`grinder`]: a four-register Modbus TCP device with its own control loop.
//! - [`gateway`]: a client of both that fulfills one order at a time,
//!   recovering from ingredient shortages and bean depletion.
//!
//! Device latency is injected through [`delay::DelayProvider`], so the same
//! servers run at real speed from the CLI and instantly under test.

pub mod config;
pub mod contracts;
pub mod delay;
pub mod dispenser;
pub mod error;
pub mod gateway;
pub mod grinder;
pub mod inventory;
pub mod logging;
pub mod recipe;
pub mod runtime;

pub use config::CellConfig;
pub use error::{CellError, CellResult};
pub use recipe::{Beverage, Ingredient};
