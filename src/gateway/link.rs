//! Device link traits.
//!
//! The gateway drives devices only through these two traits, so the
//! fulfillment algorithm can run against the real TCP clients or against
//! in-process fakes.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::dispenser::Reply;
use crate::error::{CellError, ProtocolError};
use crate::grinder::{GrinderCommand, GrinderRegisters};
use crate::inventory::{InventorySnapshot, RefillTarget};
use crate::recipe::{Beverage, Ingredient};

/// Which peer an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// The line-protocol dispenser.
    Dispenser,
    /// The Modbus grinder.
    Grinder,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Dispenser => f.write_str("dispenser"),
            Device::Grinder => f.write_str("grinder"),
        }
    }
}

/// Transport-level failure talking to one device.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer sent bytes we could not use.
    #[error("{0}")]
    Protocol(#[from] ProtocolError),

    /// Peer closed mid-exchange.
    #[error("connection closed by peer")]
    Closed,

    /// No reply within the I/O deadline.
    #[error("timed out")]
    Timeout,
}

impl From<CellError> for LinkError {
    fn from(err: CellError) -> Self {
        match err {
            CellError::Io(e) => LinkError::Io(e),
            CellError::Protocol(e) => LinkError::Protocol(e),
            other => LinkError::Protocol(ProtocolError::MalformedFrame(other.to_string())),
        }
    }
}

/// How a `MAKE` exchange ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MakeOutcome {
    /// `ACK:MAKE` followed by `DONE:SUCCESS`.
    Completed,
    /// The dispenser refused for lack of stock.
    Insufficient(Vec<Ingredient>),
    /// Any other error reply.
    Rejected(Reply),
}

/// The dispenser as seen by the gateway.
#[async_trait]
pub trait DispenserLink: Send {
    /// `STATUS:INGREDIENTS`
    async fn ingredient_status(&mut self) -> Result<InventorySnapshot, LinkError>;

    /// `REFILL:<target>`, returning once the dispenser has acknowledged.
    async fn refill(&mut self, target: RefillTarget) -> Result<(), LinkError>;

    /// `MAKE:<beverage>`, returning once brewing has finished or failed.
    async fn make(&mut self, beverage: Beverage) -> Result<MakeOutcome, LinkError>;
}

/// The grinder as seen by the gateway.
#[async_trait]
pub trait GrinderLink: Send {
    /// All four registers in one read.
    async fn registers(&mut self) -> Result<GrinderRegisters, LinkError>;

    async fn write_command(&mut self, command: GrinderCommand) -> Result<(), LinkError>;
}

/// Run `fut` under an optional deadline.
pub(crate) async fn with_deadline<F, T>(deadline: Option<Duration>, fut: F) -> Result<T, LinkError>
where
    F: Future<Output = Result<T, LinkError>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| LinkError::Timeout)?,
        None => fut.await,
    }
}
