//! Fixed-interval polling with an optional attempt ceiling.
//!
//! ```ignore
//! let mut poll = policy.start("grind completion");
//! loop {
//!     if done(link.registers().await?) {
//!         break;
//!     }
//!     poll.wait().await?;
//! }
//! ```

use std::time::Duration;

use super::fulfill::FulfillmentError;

/// How often to poll and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between polls.
    pub interval: Duration,
    /// `None` polls forever.
    pub max_attempts: Option<u32>,
}

impl PollPolicy {
    /// Policy with an explicit interval.
    pub fn new(interval: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Policy from config milliseconds.
    pub fn from_millis(interval_ms: u64, max_attempts: Option<u32>) -> Self {
        Self::new(Duration::from_millis(interval_ms), max_attempts)
    }

    /// Begin one wait; `what` names it in the exhaustion error.
    pub fn start(&self, what: &'static str) -> Poll {
        Poll {
            policy: *self,
            what,
            attempts: 0,
        }
    }
}

/// An in-progress wait.
#[derive(Debug)]
pub struct Poll {
    policy: PollPolicy,
    what: &'static str,
    attempts: u32,
}

impl Poll {
    /// Count a failed probe and sleep before the next one.
    pub async fn wait(&mut self) -> Result<(), FulfillmentError> {
        self.attempts += 1;
        if let Some(max) = self.policy.max_attempts {
            if self.attempts >= max {
                return Err(FulfillmentError::PollExhausted {
                    what: self.what,
                    attempts: self.attempts,
                });
            }
        }
        tokio::time::sleep(self.policy.interval).await;
        Ok(())
    }

    /// Polls made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
