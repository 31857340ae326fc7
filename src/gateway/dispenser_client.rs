//! TCP client for the dispenser line protocol.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, trace};

use super::link::{with_deadline, DispenserLink, LinkError, MakeOutcome};
use crate::dispenser::{Reply, Request};
use crate::error::ProtocolError;
use crate::inventory::{InventorySnapshot, RefillTarget};
use crate::recipe::Beverage;

/// One persistent connection to a dispenser. Exchanges are strictly
/// request/response; the client never pipelines.
#[derive(Debug)]
pub struct DispenserClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    io_timeout: Option<Duration>,
}

impl DispenserClient {
    /// Connect, optionally bounding the connect and every later read by
    /// `io_timeout`.
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        io_timeout: Option<Duration>,
    ) -> Result<Self, LinkError> {
        let stream = with_deadline(io_timeout, async {
            TcpStream::connect(addr).await.map_err(LinkError::from)
        })
        .await?;
        stream.set_nodelay(true)?;
        let (read_half, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer,
            io_timeout,
        })
    }

    async fn send(&mut self, request: &Request) -> Result<(), LinkError> {
        let line = format!("{}\n", request);
        debug!(request = %request, "dispenser <-");
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<Reply, LinkError> {
        let mut line = String::new();
        let reader = &mut self.reader;
        let read = with_deadline(self.io_timeout, async {
            reader.read_line(&mut line).await.map_err(LinkError::from)
        })
        .await?;
        if read == 0 {
            return Err(LinkError::Closed);
        }
        trace!(reply = line.trim(), "dispenser ->");
        Ok(Reply::parse(&line)?)
    }

    async fn exchange(&mut self, request: &Request) -> Result<Reply, LinkError> {
        self.send(request).await?;
        self.read_reply().await
    }
}

fn unexpected(expected: &'static str, got: &Reply) -> LinkError {
    ProtocolError::UnexpectedReply {
        expected,
        got: got.to_string(),
    }
    .into()
}

#[async_trait]
impl DispenserLink for DispenserClient {
    async fn ingredient_status(&mut self) -> Result<InventorySnapshot, LinkError> {
        match self.exchange(&Request::Status).await? {
            Reply::Status(snapshot) => Ok(snapshot),
            other => Err(unexpected("STATUS:INGREDIENTS", &other)),
        }
    }

    async fn refill(&mut self, target: RefillTarget) -> Result<(), LinkError> {
        match self.exchange(&Request::Refill(target)).await? {
            Reply::RefillSuccess(acked) if acked == target => Ok(()),
            other => Err(unexpected("ACK:REFILL_SUCCESS", &other)),
        }
    }

    async fn make(&mut self, beverage: Beverage) -> Result<MakeOutcome, LinkError> {
        match self.exchange(&Request::Make(beverage)).await? {
            Reply::AckMake => {}
            Reply::InsufficientIngredient(missing) => return Ok(MakeOutcome::Insufficient(missing)),
            other if other.is_error() => return Ok(MakeOutcome::Rejected(other)),
            other => return Err(unexpected("ACK:MAKE", &other)),
        }

        match self.read_reply().await? {
            Reply::DoneSuccess => Ok(MakeOutcome::Completed),
            other if other.is_error() => Ok(MakeOutcome::Rejected(other)),
            other => Err(unexpected("DONE:SUCCESS", &other)),
        }
    }
}
