//! Grinder Modbus TCP server.
//!
//! Every connection gets its own task; all of them, plus the control loop,
//! share one [`RegisterBank`]. Requests are answered regardless of unit id.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info, info_span, warn, Instrument};

use super::control::GrinderControl;
use super::modbus::{self, ExceptionCode, Frame, Request, Response};
use super::registers::{RegisterBank, RegisterError, WriteOutcome};
use crate::config::GrinderConfig;
use crate::delay::DelayProvider;
use crate::error::CellResult;
use crate::runtime::{ServerHandle, Shutdown};

/// Bound, not yet serving, grinder.
pub struct GrinderServer {
    listener: TcpListener,
    bank: Arc<RegisterBank>,
    control: GrinderControl,
}

impl GrinderServer {
    /// Bind `addr`; nothing is accepted until [`Self::run`].
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        bank: Arc<RegisterBank>,
        delays: Arc<dyn DelayProvider>,
        config: &GrinderConfig,
    ) -> CellResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        let control = GrinderControl::new(Arc::clone(&bank), delays, config);
        Ok(Self {
            listener,
            bank,
            control,
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> CellResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve, and run the control loop, in the background.
    pub fn spawn(self) -> CellResult<ServerHandle> {
        let addr = self.local_addr()?;
        Ok(ServerHandle::spawn(addr, move |shutdown| self.run(shutdown)))
    }

    /// Accept connections and tick the control loop until `shutdown` fires.
    pub async fn run(self, mut shutdown: Shutdown) -> CellResult<()> {
        let Self {
            listener,
            bank,
            control,
        } = self;
        info!(addr = %listener.local_addr()?, "grinder listening");

        let control_task = tokio::spawn(control.run(shutdown.clone()));

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.wait() => break,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let bank = Arc::clone(&bank);
                    let span = info_span!("grinder_conn", %peer);
                    tokio::spawn(
                        async move {
                            info!("client connected");
                            handle_connection(stream, bank).await;
                        }
                        .instrument(span),
                    );
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }

        if let Err(e) = control_task.await {
            warn!(error = %e, "control loop ended abnormally");
        }
        info!("grinder stopped accepting");
        Ok(())
    }
}

async fn handle_connection(stream: TcpStream, bank: Arc<RegisterBank>) {
    let (mut reader, mut writer) = stream.into_split();
    loop {
        let frame = match modbus::read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("client disconnected");
                return;
            }
            Err(e) => {
                warn!(error = %e, "bad frame, closing");
                return;
            }
        };

        let response = dispatch(&bank, frame.function, &frame.data);
        let reply = Frame {
            transaction_id: frame.transaction_id,
            unit_id: frame.unit_id,
            function: response.function(),
            data: response.encode_data(),
        };
        if let Err(e) = modbus::write_frame(&mut writer, &reply).await {
            warn!(error = %e, "write failed, closing");
            return;
        }
    }
}

/// Apply one request PDU to the bank.
pub fn dispatch(bank: &RegisterBank, function: u8, data: &[u8]) -> Response {
    let exception = |code| Response::Exception { function, code };

    let request = match Request::decode(function, data) {
        Ok(request) => request,
        Err(code) => {
            warn!(function, ?code, "rejected request");
            return exception(code);
        }
    };
    debug!(?request, "request");

    let result = match &request {
        Request::ReadHoldingRegisters { start, count } => bank
            .read(*start, *count)
            .map(Response::ReadHoldingRegisters),
        Request::WriteSingleRegister { addr, value } => bank
            .write(*addr, *value)
            .map(|outcome| {
                log_write(outcome, *addr, 1);
                Response::WriteSingleRegister {
                    addr: *addr,
                    value: *value,
                }
            }),
        Request::WriteMultipleRegisters { start, values } => bank
            .write_many(*start, values)
            .map(|outcome| {
                log_write(outcome, *start, values.len());
                Response::WriteMultipleRegisters {
                    start: *start,
                    count: values.len() as u16,
                }
            }),
    };

    result.unwrap_or_else(|e| {
        warn!(error = %e, "rejected request");
        exception(match e {
            RegisterError::IllegalAddress { .. } => ExceptionCode::IllegalDataAddress,
            RegisterError::IllegalValue { .. } => ExceptionCode::IllegalDataValue,
        })
    })
}

fn log_write(outcome: WriteOutcome, start: u16, count: usize) {
    match outcome {
        WriteOutcome::Applied => debug!(start, count, "registers written"),
        WriteOutcome::IgnoredBusy => warn!(start, count, "grinder busy, write ignored"),
    }
}
