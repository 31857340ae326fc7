//! Dispenser TCP server: one task per accepted connection, all sharing one
//! [`InventoryLedger`].

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::protocol::{Reply, Request, MAX_LINE_BYTES};
use crate::delay::{DelayKind, DelayProvider};
use crate::error::CellResult;
use crate::inventory::{InventoryLedger, RefillTarget};
use crate::runtime::{ServerHandle, Shutdown};

/// Bound, not yet serving, dispenser.
pub struct DispenserServer {
    listener: TcpListener,
    ledger: Arc<InventoryLedger>,
    delays: Arc<dyn DelayProvider>,
}

impl DispenserServer {
    /// Bind `addr`; nothing is accepted until [`Self::run`].
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        ledger: Arc<InventoryLedger>,
        delays: Arc<dyn DelayProvider>,
    ) -> CellResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            ledger,
            delays,
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> CellResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve in a background task.
    pub fn spawn(self) -> CellResult<ServerHandle> {
        let addr = self.local_addr()?;
        Ok(ServerHandle::spawn(addr, move |shutdown| self.run(shutdown)))
    }

    /// Accept connections until `shutdown` fires.
    ///
    /// Connections already being served keep running until their peer
    /// disconnects; shutdown only stops new accepts.
    pub async fn run(self, mut shutdown: Shutdown) -> CellResult<()> {
        info!(
            addr = %self.local_addr()?,
            max_storage = self.ledger.max_storage(),
            "dispenser listening"
        );
        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = shutdown.wait() => break,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let ledger = Arc::clone(&self.ledger);
                    let delays = Arc::clone(&self.delays);
                    let span = info_span!("dispenser_conn", %peer);
                    tokio::spawn(
                        async move {
                            info!("client connected");
                            handle_connection(stream, ledger, delays).await;
                        }
                        .instrument(span),
                    );
                }
                Err(e) => {
                    // EMFILE, aborted handshakes: keep listening.
                    warn!(error = %e, "accept failed");
                }
            }
        }
        info!("dispenser stopped accepting");
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    ledger: Arc<InventoryLedger>,
    delays: Arc<dyn DelayProvider>,
) {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::with_capacity(MAX_LINE_BYTES);

    loop {
        buf.clear();
        let served = match read_request_line(&mut reader, &mut buf).await {
            Ok(LineRead::Eof) => {
                info!("client disconnected");
                return;
            }
            Ok(LineRead::Oversized(len)) => {
                warn!(len, "request line too long");
                send(&mut writer, &Reply::UnknownCommand).await
            }
            Ok(LineRead::Line) => match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => {
                    debug!(request = line.trim(), "received");
                    serve_request(line, &mut writer, &ledger, delays.as_ref()).await
                }
                Err(e) => {
                    warn!(error = %e, "request is not UTF-8");
                    send(&mut writer, &Reply::UnknownCommand).await
                }
            },
            Err(e) => {
                warn!(error = %e, "read failed, closing");
                return;
            }
        };

        if let Err(e) = served {
            warn!(error = %e, "write failed, closing");
            return;
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    Eof,
    Line,
    /// Line exceeded [`MAX_LINE_BYTES`]; all of it, up to the newline, was discarded.
    Oversized(usize),
}

/// Read one request line into `buf`, never buffering more than
/// [`MAX_LINE_BYTES`] of it.
async fn read_request_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let n = (&mut *reader)
        .take(MAX_LINE_BYTES as u64)
        .read_until(b'\n', buf)
        .await?;
    if n == 0 {
        return Ok(LineRead::Eof);
    }
    if buf.ends_with(b"\n") || n < MAX_LINE_BYTES {
        return Ok(LineRead::Line);
    }

    let mut discarded = n;
    let mut scratch = Vec::with_capacity(MAX_LINE_BYTES);
    loop {
        scratch.clear();
        let n = (&mut *reader)
            .take(MAX_LINE_BYTES as u64)
            .read_until(b'\n', &mut scratch)
            .await?;
        discarded += n;
        if n == 0 || scratch.ends_with(b"\n") {
            buf.clear();
            return Ok(LineRead::Oversized(discarded));
        }
    }
}

async fn serve_request<W>(
    line: &str,
    writer: &mut W,
    ledger: &InventoryLedger,
    delays: &dyn DelayProvider,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let request = match Request::parse(line) {
        Ok(request) => request,
        Err(reply) => {
            error!(request = line.trim(), reply = %reply, "rejected request");
            return send(writer, &reply).await;
        }
    };

    match request {
        Request::Make(beverage) => match ledger.try_consume(beverage.recipe()).await {
            Ok(()) => {
                send(writer, &Reply::AckMake).await?;
                info!(%beverage, "brewing");
                tokio::time::sleep(delays.delay(DelayKind::Brew)).await;
                send(writer, &Reply::DoneSuccess).await?;
                info!(%beverage, "brewed");
                Ok(())
            }
            Err(missing) => {
                error!(%beverage, ?missing, "insufficient ingredients");
                send(writer, &Reply::InsufficientIngredient(missing)).await
            }
        },
        Request::Refill(target) => {
            let kind = match target {
                RefillTarget::All => DelayKind::RefillAll,
                RefillTarget::One(_) => DelayKind::RefillOne,
            };
            ledger.refill(target, delays.delay(kind)).await;
            info!(%target, "refilled");
            send(writer, &Reply::RefillSuccess(target)).await
        }
        Request::Status => {
            let snapshot = ledger.snapshot().await;
            info!(%snapshot, "sent inventory status");
            send(writer, &Reply::Status(snapshot)).await
        }
    }
}

async fn send<W>(writer: &mut W, reply: &Reply) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = reply.to_string();
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
