//! Simulated coffee grinder exposed as a four-register Modbus TCP device.
//!
//! ```no_run
//! use std::sync::Arc;
//! use brew_cell::config::GrinderConfig;
//! use brew_cell::delay::NoDelay;
//! use brew_cell::grinder::{GrinderServer, RegisterBank};
//!
//! # async fn demo() -> brew_cell::error::CellResult<()> {
//! let config = GrinderConfig::default();
//! let server = GrinderServer::bind(
//!     "127.0.0.1:0",
//!     Arc::new(RegisterBank::new()),
//!     Arc::new(NoDelay),
//!     &config,
//! )
//! .await?;
//! let handle = server.spawn()?;
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod control;
pub mod modbus;
pub mod registers;
pub mod server;

pub use control::{GrinderControl, Transition};
pub use registers::{
    ErrorCode, GrinderCommand, GrinderRegisters, GrinderStatus, RegisterBank, RegisterError,
};
pub use server::GrinderServer;
