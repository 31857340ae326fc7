//! Shared fixtures for integration tests: real servers on ephemeral ports,
//! zero simulated latency.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use brew_cell::config::{GatewayConfig, GrinderConfig};
use brew_cell::delay::{DelayProvider, NoDelay};
use brew_cell::dispenser::DispenserServer;
use brew_cell::grinder::{GrinderServer, RegisterBank};
use brew_cell::inventory::InventoryLedger;
use brew_cell::runtime::ServerHandle;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

pub async fn start_dispenser(ledger: Arc<InventoryLedger>) -> ServerHandle {
    start_dispenser_with(ledger, Arc::new(NoDelay)).await
}

pub async fn start_dispenser_with(
    ledger: Arc<InventoryLedger>,
    delays: Arc<dyn DelayProvider>,
) -> ServerHandle {
    DispenserServer::bind("127.0.0.1:0", ledger, delays)
        .await
        .expect("bind dispenser")
        .spawn()
        .expect("spawn dispenser")
}

pub fn fast_grinder_config() -> GrinderConfig {
    GrinderConfig {
        tick_ms: 5,
        ..GrinderConfig::default()
    }
}

pub async fn start_grinder(bank: Arc<RegisterBank>) -> ServerHandle {
    GrinderServer::bind("127.0.0.1:0", bank, Arc::new(NoDelay), &fast_grinder_config())
        .await
        .expect("bind grinder")
        .spawn()
        .expect("spawn grinder")
}

pub fn gateway_config(dispenser: SocketAddr, grinder: SocketAddr) -> GatewayConfig {
    GatewayConfig {
        dispenser_addr: dispenser.to_string(),
        grinder_addr: grinder.to_string(),
        bean_poll_interval_ms: 5,
        accept_poll_interval_ms: 2,
        complete_poll_interval_ms: 5,
        max_poll_attempts: Some(400),
        ..GatewayConfig::default()
    }
}

/// Raw line client for the dispenser protocol.
pub struct LineClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl LineClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (read_half, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer,
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("write");
    }

    pub async fn send_bytes(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write");
    }

    pub async fn read_line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.expect("read");
        line.trim_end().to_string()
    }

    pub async fn request(&mut self, line: &str) -> String {
        self.send(line).await;
        self.read_line().await
    }
}
