//! Gateway driving live dispenser and grinder servers.

mod common;

use std::sync::Arc;

use brew_cell::gateway::{self, Device, FulfillmentError};
use brew_cell::grinder::{GrinderCommand, GrinderStatus, RegisterBank};
use brew_cell::inventory::InventoryLedger;
use brew_cell::recipe::{Beverage, Ingredient};
use brew_cell::runtime::ServerHandle;
use common::{gateway_config, start_dispenser, start_grinder};
use tokio::net::TcpListener;

struct Cell {
    ledger: Arc<InventoryLedger>,
    bank: Arc<RegisterBank>,
    dispenser: ServerHandle,
    grinder: ServerHandle,
}

impl Cell {
    async fn start(ledger: InventoryLedger, bank: RegisterBank) -> Self {
        let ledger = Arc::new(ledger);
        let bank = Arc::new(bank);
        let dispenser = start_dispenser(Arc::clone(&ledger)).await;
        let grinder = start_grinder(Arc::clone(&bank)).await;
        Self {
            ledger,
            bank,
            dispenser,
            grinder,
        }
    }

    fn config(&self) -> brew_cell::config::GatewayConfig {
        gateway_config(self.dispenser.local_addr(), self.grinder.local_addr())
    }

    async fn stop(self) {
        self.dispenser.shutdown().await.unwrap();
        self.grinder.shutdown().await.unwrap();
    }
}

fn full_except(ingredient: Ingredient, quantity: u32) -> InventoryLedger {
    InventoryLedger::with_levels(
        20,
        Ingredient::ALL
            .into_iter()
            .map(|i| (i, if i == ingredient { quantity } else { 20 })),
    )
}

#[tokio::test]
async fn test_espresso_single_grind_no_refill() {
    let cell = Cell::start(InventoryLedger::new(20), RegisterBank::new()).await;
    let before = cell.ledger.snapshot().await;

    let mut gw = gateway::connect(&cell.config()).await.unwrap();
    let report = gw.fulfill_order("ESPRESSO").await.unwrap();

    assert_eq!(report.beverage, Beverage::Espresso);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.refills, 0);
    assert_eq!(report.bean_refills, 0);
    assert_eq!(report.grind_cycles, 1);
    assert_eq!(cell.ledger.snapshot().await, before);

    let regs = cell.bank.snapshot();
    assert!((90..=95).contains(&regs.bean_level));
    assert_eq!(regs.status, GrinderStatus::Idle);
    cell.stop().await;
}

#[tokio::test]
async fn test_latte_with_one_milk_refills_then_retries() {
    let cell = Cell::start(full_except(Ingredient::Milk, 1), RegisterBank::new()).await;

    let mut gw = gateway::connect(&cell.config()).await.unwrap();
    let report = gw.fulfill_order("latte").await.unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(report.refills, 1);
    assert_eq!(report.grind_cycles, 1);
    assert_eq!(cell.ledger.snapshot().await.get(Ingredient::Milk), 17);
    cell.stop().await;
}

#[tokio::test]
async fn test_low_beans_refilled_before_grind() {
    let bank = RegisterBank::new();
    bank.write(2, 5).unwrap();
    let cell = Cell::start(InventoryLedger::new(20), bank).await;

    let mut gw = gateway::connect(&cell.config()).await.unwrap();
    let report = gw.fulfill_order("LATTE").await.unwrap();

    assert_eq!(report.bean_refills, 1);
    assert_eq!(report.grind_cycles, 1);
    // Refilled to 100, then one grind.
    let regs = cell.bank.snapshot();
    assert!((90..=95).contains(&regs.bean_level));
    assert_eq!(regs.command, GrinderCommand::None);
    cell.stop().await;
}

#[tokio::test]
async fn test_connect_honours_configured_bean_threshold() {
    let bank = RegisterBank::new();
    bank.write(2, 90).unwrap();
    let cell = Cell::start(InventoryLedger::new(20), bank).await;

    let mut config = cell.config();
    config.min_bean_level = 95;
    let mut gw = gateway::connect(&config).await.unwrap();
    let report = gw.fulfill_order("ESPRESSO").await.unwrap();

    assert_eq!(report.bean_refills, 1);
    assert!((90..=95).contains(&cell.bank.snapshot().bean_level));
    cell.stop().await;
}

#[tokio::test]
async fn test_unknown_beverage_rejected_before_any_exchange() {
    let cell = Cell::start(InventoryLedger::new(20), RegisterBank::new()).await;

    let mut gw = gateway::connect(&cell.config()).await.unwrap();
    let err = gw.fulfill_order("FRAPPUCCINO").await.unwrap_err();
    assert!(matches!(err, FulfillmentError::UnknownBeverage(_)));
    assert_eq!(cell.bank.snapshot().bean_level, 100);
    cell.stop().await;
}

#[tokio::test]
async fn test_unreachable_dispenser() {
    let cell = Cell::start(InventoryLedger::new(20), RegisterBank::new()).await;

    let vacant = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = cell.config();
    config.dispenser_addr = vacant.local_addr().unwrap().to_string();
    drop(vacant);

    let err = gateway::connect(&config).await.err().unwrap();
    assert!(matches!(
        err,
        FulfillmentError::DeviceUnreachable {
            device: Device::Dispenser,
            ..
        }
    ));
    cell.stop().await;
}

#[tokio::test]
async fn test_silent_dispenser_times_out() {
    let cell = Cell::start(InventoryLedger::new(20), RegisterBank::new()).await;

    // Accepts, never answers.
    let silent = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let silent_addr = silent.local_addr().unwrap();
    let _holder = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = silent.accept().await {
            held.push(stream);
        }
    });

    let mut config = cell.config();
    config.dispenser_addr = silent_addr.to_string();
    config.io_timeout_ms = Some(100);

    let mut gw = gateway::connect(&config).await.unwrap();
    let err = gw.fulfill_order("AMERICANO").await.unwrap_err();
    assert!(matches!(
        err,
        FulfillmentError::Timeout {
            device: Device::Dispenser
        }
    ));
    cell.stop().await;
}

#[tokio::test]
async fn test_restock_operations() {
    let bank = RegisterBank::new();
    bank.write(2, 40).unwrap();
    let ledger = InventoryLedger::with_levels(20, [(Ingredient::OatMilk, 4)]);
    let cell = Cell::start(ledger, bank).await;

    let mut gw = gateway::connect(&cell.config()).await.unwrap();
    gw.restock_grinder().await.unwrap();
    gw.refill_all().await.unwrap();

    assert_eq!(cell.bank.snapshot().bean_level, 100);
    let stock = gw.inventory().await.unwrap();
    assert!(stock.iter().all(|(_, quantity)| quantity == 20));
    cell.stop().await;
}

#[tokio::test]
async fn test_back_to_back_orders_share_the_cell() {
    let cell = Cell::start(InventoryLedger::new(20), RegisterBank::new()).await;

    for name in ["MOCHA", "OAT LATTE", "MATCHA LATTE"] {
        let mut gw = gateway::connect(&cell.config()).await.unwrap();
        gw.fulfill_order(name).await.unwrap();
    }

    let stock = cell.ledger.snapshot().await;
    assert_eq!(stock.get(Ingredient::Milk), 16);
    assert_eq!(stock.get(Ingredient::OatMilk), 17);
    assert_eq!(stock.get(Ingredient::ChocolateSauce), 19);
    assert_eq!(stock.get(Ingredient::MatchaSauce), 19);
    cell.stop().await;
}
