//! Simulated hardware latency.
//!
//! The device servers never sleep on a hard-coded constant; they ask a
//! [`DelayProvider`] how long each simulated operation takes. Production
//! wiring uses [`SimulatedDelays`] built from configuration, tests inject
//! [`NoDelay`] so the same control flow runs without wall-clock waits.

use std::time::Duration;

use rand::Rng;

use crate::config::{DispenserConfig, GrinderConfig};

/// The simulated operations that take time on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayKind {
    /// Dispenser producing one beverage.
    Brew,
    /// Dispenser refilling a single ingredient.
    RefillOne,
    /// Dispenser refilling every ingredient.
    RefillAll,
    /// Grinder grinding one dose.
    Grind,
    /// Grinder being topped up with beans.
    BeanRefill,
}

/// Duration source for simulated device operations.
pub trait DelayProvider: Send + Sync {
    fn delay(&self, kind: DelayKind) -> Duration;
}

/// Zero-length delays for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl DelayProvider for NoDelay {
    fn delay(&self, _kind: DelayKind) -> Duration {
        Duration::ZERO
    }
}

/// Fixed delays, one per kind. Handy when a test needs an operation to be
/// observably "in progress" for a bounded time.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl DelayProvider for FixedDelay {
    fn delay(&self, _kind: DelayKind) -> Duration {
        self.0
    }
}

/// Configuration-driven delays. Brew time is drawn uniformly from the
/// configured range on every call.
#[derive(Debug, Clone)]
pub struct SimulatedDelays {
    brew_min: Duration,
    brew_max: Duration,
    refill_one: Duration,
    refill_all: Duration,
    grind: Duration,
    bean_refill: Duration,
}

impl SimulatedDelays {
    /// Delays taken from the device sections of the config.
    pub fn new(dispenser: &DispenserConfig, grinder: &GrinderConfig) -> Self {
        Self {
            brew_min: Duration::from_millis(dispenser.brew_delay_min_ms),
            brew_max: Duration::from_millis(dispenser.brew_delay_max_ms),
            refill_one: Duration::from_millis(dispenser.refill_one_delay_ms),
            refill_all: Duration::from_millis(dispenser.refill_all_delay_ms),
            grind: Duration::from_millis(grinder.grind_ms),
            bean_refill: Duration::from_millis(grinder.bean_refill_ms),
        }
    }
}

impl DelayProvider for SimulatedDelays {
    fn delay(&self, kind: DelayKind) -> Duration {
        match kind {
            DelayKind::Brew => {
                if self.brew_max <= self.brew_min {
                    self.brew_min
                } else {
                    rand::thread_rng().gen_range(self.brew_min..=self.brew_max)
                }
            }
            DelayKind::RefillOne => self.refill_one,
            DelayKind::RefillAll => self.refill_all,
            DelayKind::Grind => self.grind,
            DelayKind::BeanRefill => self.bean_refill,
        }
    }
}
