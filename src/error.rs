//! Custom error types for the cell.
//!
//! `CellError` is the crate-wide error for the device servers and their
//! plumbing. The gateway reports terminal order failures through its own
//! tagged type, [`crate::gateway::FulfillmentError`], because callers branch
//! on those variants rather than just printing them.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: configuration failed to load or validate.
//! - **`Io`**: socket bind/accept/read/write failures.
//! - **`Protocol`**: a peer sent bytes that do not parse under the wire
//!   grammar of the device it talks to.
//! - **`UnknownBeverage`** / **`UnknownIngredient`**: identifiers outside the
//!   fixed catalogs.
//! - **`Task`**: a background server task panicked or was cancelled.

use thiserror::Error;

use crate::config::ConfigError;

/// Convenience alias for results using the cell error type.
pub type CellResult<T> = std::result::Result<T, CellError>;

/// Crate-wide error for servers and their plumbing.
#[derive(Error, Debug)]
pub enum CellError {
    /// See [`ConfigError`].
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unparseable peer bytes.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Name outside the menu.
    #[error("Unknown beverage '{0}'")]
    UnknownBeverage(String),

    /// Name outside the ingredient list.
    #[error("Unknown ingredient '{0}'")]
    UnknownIngredient(String),

    /// Background task panicked or was cancelled.
    #[error("Server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Wire-level parse failures for either device protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Dispenser line matching no known reply.
    #[error("malformed dispenser reply: '{0}'")]
    MalformedReply(String),

    /// Well-formed reply, but not the one the exchange expects.
    #[error("unexpected reply: expected {expected}, got '{got}'")]
    UnexpectedReply { expected: &'static str, got: String },

    /// Modbus frame violating the MBAP layout.
    #[error("malformed modbus frame: {0}")]
    MalformedFrame(String),

    /// Grinder answered with an exception.
    #[error("modbus exception {code:#04x} for function {function:#04x}")]
    ModbusException { function: u8, code: u8 },

    /// Reply for a different request.
    #[error("modbus transaction id mismatch: sent {sent}, received {received}")]
    TransactionMismatch { sent: u16, received: u16 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CellError::UnknownBeverage("FRAPPE".to_string());
        assert_eq!(err.to_string(), "Unknown beverage 'FRAPPE'");
    }

    #[test]
    fn test_protocol_error_wraps() {
        let err: CellError = ProtocolError::ModbusException {
            function: 0x06,
            code: 0x02,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Protocol error: modbus exception 0x02 for function 0x06"
        );
    }
}
