//! Dispenser line protocol against a live server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use brew_cell::delay::FixedDelay;
use brew_cell::inventory::InventoryLedger;
use brew_cell::recipe::Ingredient;
use common::{start_dispenser, start_dispenser_with, LineClient};
use tokio::task::JoinSet;

#[tokio::test]
async fn test_make_ack_then_done() {
    let ledger = Arc::new(InventoryLedger::new(20));
    let server = start_dispenser(Arc::clone(&ledger)).await;

    let mut client = LineClient::connect(server.local_addr()).await;
    assert_eq!(client.request("MAKE:FLAT WHITE").await, "ACK:MAKE");
    assert_eq!(client.read_line().await, "DONE:SUCCESS");
    assert_eq!(ledger.snapshot().await.get(Ingredient::Milk), 17);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_makes_never_double_spend() {
    let ledger = Arc::new(InventoryLedger::new(20));
    let server = start_dispenser(Arc::clone(&ledger)).await;
    let addr = server.local_addr();

    let mut tasks = JoinSet::new();
    for _ in 0..12 {
        tasks.spawn(async move {
            let mut client = LineClient::connect(addr).await;
            let first = client.request("MAKE:LATTE").await;
            if first == "ACK:MAKE" {
                assert_eq!(client.read_line().await, "DONE:SUCCESS");
                true
            } else {
                assert_eq!(first, "ERROR:INSUFFICIENT_INGREDIENT:MILK");
                false
            }
        });
    }

    let mut granted = 0;
    while let Some(result) = tasks.join_next().await {
        if result.unwrap() {
            granted += 1;
        }
    }

    assert_eq!(granted, 6);
    assert_eq!(ledger.snapshot().await.get(Ingredient::Milk), 20 - 3 * granted);
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_beverage_leaves_stock_alone() {
    let ledger = Arc::new(InventoryLedger::new(20));
    let server = start_dispenser(Arc::clone(&ledger)).await;
    let before = ledger.snapshot().await;

    let mut client = LineClient::connect(server.local_addr()).await;
    assert_eq!(client.request("MAKE:BUBBLE TEA").await, "ERROR:UNKNOWN_COFFEE_TYPE");
    assert_eq!(ledger.snapshot().await, before);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_insufficient_lists_every_short_ingredient() {
    let ledger = Arc::new(InventoryLedger::with_levels(20, [(Ingredient::Milk, 1)]));
    let server = start_dispenser(Arc::clone(&ledger)).await;

    let mut client = LineClient::connect(server.local_addr()).await;
    assert_eq!(
        client.request("MAKE:MACCHIATO").await,
        "ERROR:INSUFFICIENT_INGREDIENT:MILK, CARAMEL_SYRUP"
    );
    assert_eq!(ledger.snapshot().await.get(Ingredient::Milk), 1);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_refill_all_then_status_shows_ceiling() {
    let ledger = Arc::new(InventoryLedger::with_levels(
        15,
        [(Ingredient::Milk, 2), (Ingredient::MatchaSauce, 9)],
    ));
    let server = start_dispenser(ledger).await;

    let mut client = LineClient::connect(server.local_addr()).await;
    assert_eq!(client.request("REFILL:ALL").await, "ACK:REFILL_SUCCESS:ALL");
    assert_eq!(
        client.request("STATUS:INGREDIENTS").await,
        "STATUS:INGREDIENTS:MILK=15,OAT_MILK=15,MATCHA_SAUCE=15,CHOCOLATE_SAUCE=15,CARAMEL_SYRUP=15"
    );

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_errors_keep_connection_open_and_case_is_folded() {
    let ledger = Arc::new(InventoryLedger::new(20));
    let server = start_dispenser(ledger).await;

    let mut client = LineClient::connect(server.local_addr()).await;
    assert_eq!(client.request("HELLO").await, "ERROR:UNKNOWN_COMMAND");
    assert_eq!(client.request("refill:sugar").await, "ERROR:INVALID_INGREDIENT");
    assert_eq!(client.request("refill:oat_milk").await, "ACK:REFILL_SUCCESS:OAT_MILK");
    assert_eq!(client.request("make:espresso").await, "ACK:MAKE");
    assert_eq!(client.read_line().await, "DONE:SUCCESS");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_brewing_does_not_block_other_connections() {
    let ledger = Arc::new(InventoryLedger::new(20));
    let server =
        start_dispenser_with(ledger, Arc::new(FixedDelay(Duration::from_secs(2)))).await;

    let mut brewing = LineClient::connect(server.local_addr()).await;
    assert_eq!(brewing.request("MAKE:MOCHA").await, "ACK:MAKE");

    let mut other = LineClient::connect(server.local_addr()).await;
    let status = tokio::time::timeout(
        Duration::from_millis(1000),
        other.request("STATUS:INGREDIENTS"),
    )
    .await
    .expect("status answered while another connection brews");
    assert!(status.contains("MILK=18"));
    assert!(status.contains("CHOCOLATE_SAUCE=19"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_client_disconnect_does_not_affect_others() {
    let ledger = Arc::new(InventoryLedger::new(20));
    let server = start_dispenser(ledger).await;

    {
        let mut gone = LineClient::connect(server.local_addr()).await;
        gone.send("MAKE:").await;
    }

    let mut client = LineClient::connect(server.local_addr()).await;
    assert!(client
        .request("STATUS:INGREDIENTS")
        .await
        .starts_with("STATUS:INGREDIENTS:"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_oversized_line_gets_error_and_connection_survives() {
    let ledger = Arc::new(InventoryLedger::new(20));
    let server = start_dispenser(ledger).await;

    let mut client = LineClient::connect(server.local_addr()).await;
    assert_eq!(client.request(&"X".repeat(2000)).await, "ERROR:UNKNOWN_COMMAND");
    assert!(client
        .request("STATUS:INGREDIENTS")
        .await
        .starts_with("STATUS:INGREDIENTS:MILK=20"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_non_utf8_line_gets_error_and_connection_survives() {
    let ledger = Arc::new(InventoryLedger::new(20));
    let server = start_dispenser(ledger).await;

    let mut client = LineClient::connect(server.local_addr()).await;
    client.send_bytes(b"MAKE:\xff\xfe\n").await;
    assert_eq!(client.read_line().await, "ERROR:UNKNOWN_COMMAND");
    assert_eq!(client.request("MAKE:ESPRESSO").await, "ACK:MAKE");
    assert_eq!(client.read_line().await, "DONE:SUCCESS");

    server.shutdown().await.unwrap();
}
