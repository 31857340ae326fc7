//! Background server lifecycle.
//!
//! Both device servers run an accept loop until a shutdown signal fires.
//! [`ServerHandle`] owns that signal plus the join handle, which is what the
//! CLI and the integration tests hold on to.

use std::future::Future;
use std::net::SocketAddr;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;

use crate::error::{CellError, CellResult};

/// Shutdown signal shared by an accept loop and its background tasks.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Resolves once shutdown has been requested (or the sender is gone).
    pub async fn wait(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Create a linked trigger/receiver pair.
fn shutdown_channel() -> (watch::Sender<bool>, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (tx, Shutdown { rx })
}

/// A running server task.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    trigger: watch::Sender<bool>,
    join: JoinHandle<CellResult<()>>,
}

impl ServerHandle {
    /// Spawn `serve` with a fresh shutdown signal.
    pub fn spawn<F, Fut>(local_addr: SocketAddr, serve: F) -> Self
    where
        F: FnOnce(Shutdown) -> Fut,
        Fut: Future<Output = CellResult<()>> + Send + 'static,
    {
        let (trigger, shutdown) = shutdown_channel();
        let join = tokio::spawn(serve(shutdown));
        Self {
            local_addr,
            trigger,
            join,
        }
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Request shutdown and wait for the accept loop to exit.
    ///
    /// A panicked server task surfaces as [`CellError::Task`].
    pub async fn shutdown(self) -> CellResult<()> {
        let _ = self.trigger.send(true);
        match self.join.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "server task ended abnormally");
                Err(CellError::Task(e))
            }
        }
    }
}
