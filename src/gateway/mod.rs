//! Orchestration gateway: a client of both device servers that turns a
//! beverage name into a grind plus a brew.
//!
//! ```no_run
//! use brew_cell::config::GatewayConfig;
//! use brew_cell::gateway;
//!
//! # async fn demo() -> Result<(), brew_cell::gateway::FulfillmentError> {
//! let mut gw = gateway::connect(&GatewayConfig::default()).await?;
//! let report = gw.fulfill_order("FLAT WHITE").await?;
//! println!("done in {:?}", report.elapsed);
//! # Ok(())
//! # }
//! ```

pub mod dispenser_client;
pub mod fulfill;
pub mod grinder_client;
pub mod link;
pub mod poll;

pub use dispenser_client::DispenserClient;
pub use fulfill::{FulfillmentError, FulfillmentReport, OrderGateway, DEFAULT_MIN_BEAN_LEVEL};
pub use grinder_client::GrinderClient;
pub use link::{Device, DispenserLink, GrinderLink, LinkError, MakeOutcome};
pub use poll::PollPolicy;

use tracing::debug;

use crate::config::GatewayConfig;

/// Open fresh connections to both devices.
pub async fn connect(
    config: &GatewayConfig,
) -> Result<OrderGateway<DispenserClient, GrinderClient>, FulfillmentError> {
    let timeout = config.io_timeout();

    let dispenser = DispenserClient::connect(config.dispenser_addr.as_str(), timeout)
        .await
        .map_err(|e| FulfillmentError::link(Device::Dispenser, e))?;
    debug!(addr = %config.dispenser_addr, "connected to dispenser");

    let grinder = GrinderClient::connect(
        config.grinder_addr.as_str(),
        config.grinder_unit_id,
        timeout,
    )
    .await
    .map_err(|e| FulfillmentError::link(Device::Grinder, e))?;
    debug!(addr = %config.grinder_addr, "connected to grinder");

    Ok(OrderGateway::new(dispenser, grinder, config))
}
