//! Modbus TCP client for the grinder.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::trace;

use super::link::{with_deadline, GrinderLink, LinkError};
use crate::error::ProtocolError;
use crate::grinder::modbus::{self, Frame, Request, Response};
use crate::grinder::registers::{CMD_REG, REGISTER_COUNT};
use crate::grinder::{GrinderCommand, GrinderRegisters};

/// Modbus TCP client for the grinder register bank.
#[derive(Debug)]
pub struct GrinderClient {
    stream: TcpStream,
    unit_id: u8,
    next_transaction: u16,
    io_timeout: Option<Duration>,
}

impl GrinderClient {
    /// Connect to `addr`, tagging requests with `unit_id`.
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        unit_id: u8,
        io_timeout: Option<Duration>,
    ) -> Result<Self, LinkError> {
        let stream = with_deadline(io_timeout, async {
            TcpStream::connect(addr).await.map_err(LinkError::from)
        })
        .await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            unit_id,
            next_transaction: 1,
            io_timeout,
        })
    }

    async fn call(&mut self, request: Request) -> Result<Response, LinkError> {
        let transaction_id = self.next_transaction;
        self.next_transaction = self.next_transaction.wrapping_add(1);

        let frame = Frame {
            transaction_id,
            unit_id: self.unit_id,
            function: request.function(),
            data: request.encode_data(),
        };
        trace!(?request, transaction_id, "grinder <-");

        let stream = &mut self.stream;
        let reply = with_deadline(self.io_timeout, async {
            modbus::write_frame(&mut *stream, &frame)
                .await
                .map_err(LinkError::from)?;
            modbus::read_frame(&mut *stream).await.map_err(LinkError::from)
        })
        .await?
        .ok_or(LinkError::Closed)?;

        if reply.transaction_id != transaction_id {
            return Err(ProtocolError::TransactionMismatch {
                sent: transaction_id,
                received: reply.transaction_id,
            }
            .into());
        }
        let response = Response::decode(reply.function, &reply.data)?;
        trace!(?response, transaction_id, "grinder ->");
        Ok(response)
    }
}

#[async_trait]
impl GrinderLink for GrinderClient {
    async fn registers(&mut self) -> Result<GrinderRegisters, LinkError> {
        let request = Request::ReadHoldingRegisters {
            start: 0,
            count: REGISTER_COUNT,
        };
        match self.call(request).await? {
            Response::ReadHoldingRegisters(values) => GrinderRegisters::from_raw(&values)
                .map_err(|e| LinkError::from(ProtocolError::MalformedFrame(e.to_string()))),
            other => Err(ProtocolError::UnexpectedReply {
                expected: "read holding registers",
                got: format!("{other:?}"),
            }
            .into()),
        }
    }

    async fn write_command(&mut self, command: GrinderCommand) -> Result<(), LinkError> {
        let value = command as u16;
        match self.call(Request::WriteSingleRegister { addr: CMD_REG, value }).await? {
            Response::WriteSingleRegister { addr: CMD_REG, value: echoed } if echoed == value => Ok(()),
            other => Err(ProtocolError::UnexpectedReply {
                expected: "write single register echo",
                got: format!("{other:?}"),
            }
            .into()),
        }
    }
}
