//! The grinder's control loop.
//!
//! A single task polls the command register at a fixed tick and drives the
//! other registers. It is the only writer that bypasses the busy rule of
//! [`RegisterBank::write`].

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::registers::{ErrorCode, GrinderCommand, GrinderStatus, RegisterBank, FULL_BEAN_LEVEL};
use crate::config::GrinderConfig;
use crate::delay::{DelayKind, DelayProvider};
use crate::runtime::Shutdown;

/// What one tick of the loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No command pending.
    None,
    /// A grind ran; `used` beans were consumed.
    Ground { used: u16, bean_level: u16 },
    /// A grind was requested with too few beans.
    Faulted { bean_level: u16 },
    /// A grind was requested while faulted; the command was dropped.
    IgnoredWhileFaulted,
    /// Beans restored and fault cleared.
    Refilled,
}

/// Applies pending grinder commands to the register bank.
pub struct GrinderControl {
    bank: Arc<RegisterBank>,
    delays: Arc<dyn DelayProvider>,
    tick: Duration,
    min_bean_level: u16,
    usage_min: u16,
    usage_max: u16,
}

impl GrinderControl {
    /// Control loop over `bank`, timed by `delays`.
    pub fn new(
        bank: Arc<RegisterBank>,
        delays: Arc<dyn DelayProvider>,
        config: &GrinderConfig,
    ) -> Self {
        Self {
            bank,
            delays,
            tick: Duration::from_millis(config.tick_ms),
            min_bean_level: config.min_bean_level,
            usage_min: config.grind_usage_min,
            usage_max: config.grind_usage_max,
        }
    }

    /// Tick until shutdown.
    pub async fn run(self, mut shutdown: Shutdown) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(tick_ms = self.tick.as_millis() as u64, "grinder control loop started");

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.wait() => break,
            }
            let transition = self.step().await;
            if transition != Transition::None {
                debug!(?transition, "grinder tick");
            }
        }
        info!("grinder control loop stopped");
    }

    /// Evaluate the command register once.
    pub async fn step(&self) -> Transition {
        let regs = self.bank.snapshot();
        match regs.command {
            GrinderCommand::None => Transition::None,
            GrinderCommand::RefillBeans => self.refill().await,
            GrinderCommand::Grind if regs.status == GrinderStatus::Fault => {
                warn!("grind requested while faulted, ignoring until beans are refilled");
                self.bank.update(|r| r.command = GrinderCommand::None);
                Transition::IgnoredWhileFaulted
            }
            GrinderCommand::Grind => self.grind().await,
        }
    }

    async fn grind(&self) -> Transition {
        let min = self.min_bean_level;
        let started = self.bank.update(|r| {
            if r.bean_level < min {
                r.status = GrinderStatus::Fault;
                r.error_code = ErrorCode::InsufficientBeans;
                r.command = GrinderCommand::None;
                Err(r.bean_level)
            } else {
                r.status = GrinderStatus::Working;
                Ok(())
            }
        });
        if let Err(bean_level) = started {
            error!(bean_level, min_bean_level = min, "insufficient beans");
            return Transition::Faulted { bean_level };
        }

        info!("grinding");
        tokio::time::sleep(self.delays.delay(DelayKind::Grind)).await;

        let used = self.draw_usage();
        let bean_level = self.bank.update(|r| {
            r.bean_level = r.bean_level.saturating_sub(used);
            r.status = GrinderStatus::Idle;
            r.command = GrinderCommand::None;
            r.bean_level
        });
        info!(used, bean_level, "grind complete");
        Transition::Ground { used, bean_level }
    }

    async fn refill(&self) -> Transition {
        self.bank.update(|r| r.status = GrinderStatus::Working);
        info!("refilling beans");
        tokio::time::sleep(self.delays.delay(DelayKind::BeanRefill)).await;
        self.bank.update(|r| {
            r.bean_level = FULL_BEAN_LEVEL;
            r.error_code = ErrorCode::None;
            r.status = GrinderStatus::Idle;
            r.command = GrinderCommand::None;
        });
        info!(bean_level = FULL_BEAN_LEVEL, "beans refilled");
        Transition::Refilled
    }

    fn draw_usage(&self) -> u16 {
        if self.usage_max <= self.usage_min {
            self.usage_min
        } else {
            rand::thread_rng().gen_range(self.usage_min..=self.usage_max)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay::NoDelay;
    use crate::grinder::registers::GrinderRegisters;
    use tracing_test::traced_test;

    fn control(bank: &Arc<RegisterBank>) -> GrinderControl {
        GrinderControl::new(Arc::clone(bank), Arc::new(NoDelay), &GrinderConfig::default())
    }

    #[tokio::test]
    async fn test_idle_tick_does_nothing() {
        let bank = Arc::new(RegisterBank::new());
        assert_eq!(control(&bank).step().await, Transition::None);
        assert_eq!(bank.snapshot(), GrinderRegisters::INITIAL);
    }

    #[tokio::test]
    async fn test_grind_consumes_beans_within_range() {
        let bank = Arc::new(RegisterBank::new());
        bank.write(0, 1).unwrap();

        let t = control(&bank).step().await;
        let Transition::Ground { used, bean_level } = t else {
            panic!("unexpected transition {t:?}");
        };
        assert!((5..=10).contains(&used));
        assert_eq!(bean_level, 100 - used);

        let regs = bank.snapshot();
        assert_eq!(regs.status, GrinderStatus::Idle);
        assert_eq!(regs.command, GrinderCommand::None);
        assert_eq!(regs.bean_level, bean_level);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_low_beans_fault_without_working() {
        let bank = Arc::new(RegisterBank::new());
        bank.write(2, 5).unwrap();
        bank.write(0, 1).unwrap();

        assert_eq!(
            control(&bank).step().await,
            Transition::Faulted { bean_level: 5 }
        );
        let regs = bank.snapshot();
        assert_eq!(regs.status, GrinderStatus::Fault);
        assert_eq!(regs.error_code, ErrorCode::InsufficientBeans);
        assert_eq!(regs.command, GrinderCommand::None);
        assert_eq!(regs.bean_level, 5);
        assert!(logs_contain("insufficient beans"));
    }

    #[tokio::test]
    async fn test_refill_clears_fault() {
        let bank = Arc::new(RegisterBank::new());
        bank.update(|r| {
            r.status = GrinderStatus::Fault;
            r.error_code = ErrorCode::InsufficientBeans;
            r.bean_level = 3;
        });
        bank.write(0, 2).unwrap();

        assert_eq!(control(&bank).step().await, Transition::Refilled);
        assert_eq!(bank.snapshot(), GrinderRegisters::INITIAL);
    }

    #[tokio::test]
    async fn test_grind_while_faulted_is_dropped() {
        let bank = Arc::new(RegisterBank::new());
        bank.update(|r| {
            r.status = GrinderStatus::Fault;
            r.error_code = ErrorCode::InsufficientBeans;
        });
        bank.write(0, 1).unwrap();

        assert_eq!(control(&bank).step().await, Transition::IgnoredWhileFaulted);
        let regs = bank.snapshot();
        assert_eq!(regs.status, GrinderStatus::Fault);
        assert_eq!(regs.command, GrinderCommand::None);
    }

    #[tokio::test]
    async fn test_usage_never_underflows() {
        let bank = Arc::new(RegisterBank::new());
        let config = GrinderConfig {
            min_bean_level: 0,
            ..GrinderConfig::default()
        };
        bank.write(2, 2).unwrap();
        bank.write(0, 1).unwrap();
        let control = GrinderControl::new(Arc::clone(&bank), Arc::new(NoDelay), &config);
        control.step().await;
        assert_eq!(bank.snapshot().bean_level, 0);
    }
}
