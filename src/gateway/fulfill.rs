//! Order fulfillment.
//!
//! [`OrderGateway::fulfill_order`] turns a beverage name into device
//! operations:
//!
//! 1. reject names outside the catalog;
//! 2. read the dispenser's stock and work out what the recipe is short of;
//! 3. make sure the grinder is ready, refilling beans and waiting if not;
//! 4. on a shortage, refill once and start again from step 2;
//! 5. grind, waiting first for the grinder to take the command and then
//!    for it to finish;
//! 6. `MAKE` and wait for the dispenser to finish brewing.
//!
//! Only the shortage in step 4 is retried, and only once. Every other
//! failure ends the order.

use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};

use super::link::{Device, DispenserLink, GrinderLink, LinkError, MakeOutcome};
use super::poll::PollPolicy;
use crate::config::{GatewayConfig, RefillStrategy};
use crate::grinder::{GrinderCommand, GrinderRegisters, GrinderStatus};
use crate::inventory::{InventorySnapshot, RefillTarget};
use crate::recipe::{shortages, Beverage, Ingredient};

/// Bean level the grinder needs before it will grind.
pub const DEFAULT_MIN_BEAN_LEVEL: u16 = 10;

/// Terminal outcome of a failed order.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// Name outside the menu; nothing was sent.
    #[error("unknown beverage '{0}'")]
    UnknownBeverage(String),

    /// Still short after the one refill.
    #[error("still short of {missing:?} after one refill")]
    ShortageAfterRetry { missing: Vec<Ingredient> },

    #[error("{device} unreachable: {source}")]
    DeviceUnreachable {
        device: Device,
        #[source]
        source: LinkError,
    },

    /// Device sent something unexpected.
    #[error("{device} protocol error: {detail}")]
    Protocol { device: Device, detail: String },

    /// Device reported it cannot proceed.
    #[error("{device} fault: {detail}")]
    DeviceFault { device: Device, detail: String },

    /// A wait ran out of attempts.
    #[error("gave up waiting for {what} after {attempts} polls")]
    PollExhausted { what: &'static str, attempts: u32 },

    /// Device missed the I/O deadline.
    #[error("{device} timed out")]
    Timeout { device: Device },
}

impl FulfillmentError {
    /// Attribute a link failure to the device it came from.
    pub fn link(device: Device, err: LinkError) -> Self {
        match err {
            LinkError::Protocol(e) => FulfillmentError::Protocol {
                device,
                detail: e.to_string(),
            },
            LinkError::Timeout => FulfillmentError::Timeout { device },
            source @ (LinkError::Io(_) | LinkError::Closed) => {
                FulfillmentError::DeviceUnreachable { device, source }
            }
        }
    }
}

/// What a successful order took.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FulfillmentReport {
    /// What was made.
    pub beverage: Beverage,
    /// Passes through the stock check; 2 when a refill was needed.
    pub attempts: u32,
    /// Dispenser `REFILL` requests sent.
    pub refills: u32,
    /// Grinder bean refills issued.
    pub bean_refills: u32,
    /// Grinds completed.
    pub grind_cycles: u32,
    /// Wall-clock time for the whole order.
    pub elapsed: Duration,
}

impl FulfillmentReport {
    fn new(beverage: Beverage) -> Self {
        Self {
            beverage,
            attempts: 0,
            refills: 0,
            bean_refills: 0,
            grind_cycles: 0,
            elapsed: Duration::ZERO,
        }
    }
}

/// Drives one dispenser and one grinder link.
pub struct OrderGateway<D, G> {
    dispenser: D,
    grinder: G,
    min_bean_level: u16,
    bean_poll: PollPolicy,
    accept_poll: PollPolicy,
    complete_poll: PollPolicy,
    refill_strategy: RefillStrategy,
}

impl<D: DispenserLink, G: GrinderLink> OrderGateway<D, G> {
    /// Gateway over `dispenser` and `grinder`, tuned by `config`.
    pub fn new(dispenser: D, grinder: G, config: &GatewayConfig) -> Self {
        let max = config.max_poll_attempts;
        Self {
            dispenser,
            grinder,
            min_bean_level: config.min_bean_level,
            bean_poll: PollPolicy::from_millis(config.bean_poll_interval_ms, max),
            accept_poll: PollPolicy::from_millis(config.accept_poll_interval_ms, max),
            complete_poll: PollPolicy::from_millis(config.complete_poll_interval_ms, max),
            refill_strategy: config.refill_strategy,
        }
    }

    /// Give the links back.
    pub fn into_parts(self) -> (D, G) {
        (self.dispenser, self.grinder)
    }

    /// Produce one beverage, end to end.
    pub async fn fulfill_order(&mut self, name: &str) -> Result<FulfillmentReport, FulfillmentError> {
        let beverage: Beverage = name.parse().map_err(|_| {
            error!(beverage = name.trim(), "unknown beverage");
            FulfillmentError::UnknownBeverage(name.trim().to_string())
        })?;

        let span = info_span!("fulfill", %beverage);
        async {
            let started = Instant::now();
            let result = self.run_order(beverage).await;
            match result {
                Ok(mut report) => {
                    report.elapsed = started.elapsed();
                    info!(
                        attempts = report.attempts,
                        refills = report.refills,
                        bean_refills = report.bean_refills,
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        "order complete"
                    );
                    Ok(report)
                }
                Err(e) => {
                    error!(error = %e, "order failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_order(&mut self, beverage: Beverage) -> Result<FulfillmentReport, FulfillmentError> {
        let mut report = FulfillmentReport::new(beverage);
        let mut refilled = false;

        loop {
            report.attempts += 1;

            let stock = self.inventory().await?;
            let missing = shortages(beverage.recipe(), |i| stock.get(i));

            if self.ensure_grinder_ready().await? {
                report.bean_refills += 1;
            }

            if !missing.is_empty() {
                self.recover_shortage(missing, &mut refilled, &mut report).await?;
                continue;
            }

            self.grind().await?;
            report.grind_cycles += 1;

            info!("brewing");
            match self
                .dispenser
                .make(beverage)
                .await
                .map_err(|e| FulfillmentError::link(Device::Dispenser, e))?
            {
                MakeOutcome::Completed => return Ok(report),
                MakeOutcome::Insufficient(missing) => {
                    // Stock moved between the status read and MAKE.
                    self.recover_shortage(missing, &mut refilled, &mut report).await?;
                }
                MakeOutcome::Rejected(reply) => {
                    return Err(FulfillmentError::DeviceFault {
                        device: Device::Dispenser,
                        detail: reply.to_string(),
                    });
                }
            }
        }
    }

    async fn recover_shortage(
        &mut self,
        missing: Vec<Ingredient>,
        refilled: &mut bool,
        report: &mut FulfillmentReport,
    ) -> Result<(), FulfillmentError> {
        if *refilled {
            return Err(FulfillmentError::ShortageAfterRetry { missing });
        }
        warn!(?missing, "insufficient ingredients, refilling");

        let targets: Vec<RefillTarget> = match self.refill_strategy {
            RefillStrategy::Missing => missing.into_iter().map(RefillTarget::One).collect(),
            RefillStrategy::All => vec![RefillTarget::All],
        };
        for target in targets {
            self.refill(target).await?;
            report.refills += 1;
        }
        *refilled = true;
        Ok(())
    }

    /// Current dispenser stock.
    pub async fn inventory(&mut self) -> Result<InventorySnapshot, FulfillmentError> {
        self.dispenser
            .ingredient_status()
            .await
            .map_err(|e| FulfillmentError::link(Device::Dispenser, e))
    }

    /// Top up every dispenser ingredient.
    pub async fn refill_all(&mut self) -> Result<(), FulfillmentError> {
        self.refill(RefillTarget::All).await
    }

    async fn refill(&mut self, target: RefillTarget) -> Result<(), FulfillmentError> {
        info!(%target, "refilling dispenser");
        self.dispenser
            .refill(target)
            .await
            .map_err(|e| FulfillmentError::link(Device::Dispenser, e))
    }

    /// Current grinder registers.
    pub async fn grinder_registers(&mut self) -> Result<GrinderRegisters, FulfillmentError> {
        self.grinder
            .registers()
            .await
            .map_err(|e| FulfillmentError::link(Device::Grinder, e))
    }

    async fn command_grinder(&mut self, command: GrinderCommand) -> Result<(), FulfillmentError> {
        self.grinder
            .write_command(command)
            .await
            .map_err(|e| FulfillmentError::link(Device::Grinder, e))
    }

    /// Refill beans unconditionally and wait until the grinder is idle and
    /// ready again.
    pub async fn restock_grinder(&mut self) -> Result<(), FulfillmentError> {
        info!("refilling grinder beans");
        self.command_grinder(GrinderCommand::RefillBeans).await?;

        let mut poll = self.bean_poll.start("bean refill");
        loop {
            let regs = self.grinder_registers().await?;
            if regs.command == GrinderCommand::None
                && regs.status == GrinderStatus::Idle
                && regs.is_ready(self.min_bean_level)
            {
                info!(bean_level = regs.bean_level, "grinder restocked");
                return Ok(());
            }
            poll.wait().await?;
        }
    }

    /// Returns whether a bean refill was needed.
    async fn ensure_grinder_ready(&mut self) -> Result<bool, FulfillmentError> {
        let regs = self.grinder_registers().await?;
        if regs.is_ready(self.min_bean_level) {
            return Ok(false);
        }
        warn!(
            bean_level = regs.bean_level,
            error_code = ?regs.error_code,
            "grinder not ready"
        );
        self.restock_grinder().await?;
        Ok(true)
    }

    async fn grind(&mut self) -> Result<(), FulfillmentError> {
        info!("grinding");
        self.command_grinder(GrinderCommand::Grind).await?;

        // A grind that completes within one tick may never be observed as
        // working; a cleared command register means it was taken.
        let mut poll = self.accept_poll.start("grind acceptance");
        loop {
            let regs = self.grinder_registers().await?;
            check_fault(&regs)?;
            if regs.status == GrinderStatus::Working || regs.command == GrinderCommand::None {
                break;
            }
            poll.wait().await?;
        }

        let mut poll = self.complete_poll.start("grind completion");
        loop {
            let regs = self.grinder_registers().await?;
            check_fault(&regs)?;
            if regs.status == GrinderStatus::Idle && regs.command == GrinderCommand::None {
                info!(bean_level = regs.bean_level, "grind complete");
                return Ok(());
            }
            poll.wait().await?;
        }
    }
}

fn check_fault(regs: &GrinderRegisters) -> Result<(), FulfillmentError> {
    if regs.status == GrinderStatus::Fault {
        return Err(FulfillmentError::DeviceFault {
            device: Device::Grinder,
            detail: format!(
                "status=fault error_code={:?} bean_level={}",
                regs.error_code, regs.bean_level
            ),
        });
    }
    Ok(())
}
