//! Cell configuration using Figment
//!
//! Configuration is loaded from (in order of precedence, highest first):
//! 1. Environment variables prefixed with `BREWCELL_`, nested keys separated
//!    by a double underscore
//! 2. TOML configuration file (default: `config/cell.toml`)
//!
//! Every field has a default, so an absent file yields a working
//! localhost setup.
//!
//! ```text
//! BREWCELL_APPLICATION__LOG_LEVEL=debug
//! BREWCELL_DISPENSER__MAX_STORAGE=50
//! BREWCELL_GATEWAY__GRINDER_ADDR=10.0.0.7:5020
//! ```
//!
//! # Example
//!
//! ```no_run
//! use brew_cell::config::CellConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CellConfig::load()?;
//!     println!("Dispenser listens on {}", config.dispenser.bind);
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// figment could not extract the configuration.
    #[error("Configuration load error: {0}")]
    LoadError(#[from] Box<figment::Error>),
    /// A value failed validation.
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CellConfig {
    /// Process-wide settings.
    pub application: ApplicationConfig,
    /// Dispenser server settings.
    pub dispenser: DispenserConfig,
    /// Grinder server settings.
    pub grinder: GrinderConfig,
    /// Gateway client settings.
    pub gateway: GatewayConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Name used in log output.
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "brew-cell".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Dispenser server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispenserConfig {
    /// Listen address.
    pub bind: String,
    /// Per-ingredient ceiling; also the initial stock.
    pub max_storage: u32,
    /// Shortest simulated brew.
    pub brew_delay_min_ms: u64,
    /// Longest simulated brew.
    pub brew_delay_max_ms: u64,
    /// Time to refill one ingredient.
    pub refill_one_delay_ms: u64,
    /// Time to refill every ingredient.
    pub refill_all_delay_ms: u64,
}

impl Default for DispenserConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8888".to_string(),
            max_storage: 20,
            brew_delay_min_ms: 5000,
            brew_delay_max_ms: 10000,
            refill_one_delay_ms: 3000,
            refill_all_delay_ms: 7000,
        }
    }
}

/// Grinder register-bank server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrinderConfig {
    /// Listen address.
    pub bind: String,
    /// Control loop period.
    pub tick_ms: u64,
    /// Time one grind takes.
    pub grind_ms: u64,
    /// Time a bean refill takes.
    pub bean_refill_ms: u64,
    /// Bean level below which a grind request faults.
    pub min_bean_level: u16,
    /// Fewest beans one grind consumes.
    pub grind_usage_min: u16,
    /// Most beans one grind consumes.
    pub grind_usage_max: u16,
}

impl Default for GrinderConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5020".to_string(),
            tick_ms: 500,
            grind_ms: 5000,
            bean_refill_ms: 2000,
            min_bean_level: 10,
            grind_usage_min: 5,
            grind_usage_max: 10,
        }
    }
}

/// How the gateway asks the dispenser to recover from a shortage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefillStrategy {
    /// `REFILL:<INGREDIENT>` for each short ingredient.
    #[default]
    Missing,
    /// A single `REFILL:ALL`.
    All,
}

/// Gateway (orchestrator) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Dispenser line-protocol address.
    pub dispenser_addr: String,
    /// Grinder Modbus TCP address.
    pub grinder_addr: String,
    /// Modbus unit id sent with every grinder request.
    pub grinder_unit_id: u8,
    /// Bean level below which the gateway restocks before grinding.
    pub min_bean_level: u16,
    /// Interval while waiting for a bean refill to clear.
    pub bean_poll_interval_ms: u64,
    /// Interval while waiting for the grinder to accept a grind command.
    pub accept_poll_interval_ms: u64,
    /// Interval while waiting for a grind to complete.
    pub complete_poll_interval_ms: u64,
    /// Upper bound on polls per wait. Absent means poll forever.
    pub max_poll_attempts: Option<u32>,
    /// Per-exchange network deadline. Absent means block indefinitely.
    pub io_timeout_ms: Option<u64>,
    /// How shortages are refilled.
    pub refill_strategy: RefillStrategy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            dispenser_addr: "127.0.0.1:8888".to_string(),
            grinder_addr: "127.0.0.1:5020".to_string(),
            grinder_unit_id: 1,
            min_bean_level: crate::gateway::DEFAULT_MIN_BEAN_LEVEL,
            bean_poll_interval_ms: 200,
            accept_poll_interval_ms: 100,
            complete_poll_interval_ms: 500,
            max_poll_attempts: None,
            io_timeout_ms: None,
            refill_strategy: RefillStrategy::Missing,
        }
    }
}

impl GatewayConfig {
    /// Per-exchange deadline, if configured.
    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_ms.map(Duration::from_millis)
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl CellConfig {
    /// Load configuration from `config/cell.toml` and environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/cell.toml")
    }

    /// Load configuration from a specific file path, then validate it.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(path.as_ref())
            .extract()
            .map_err(|e| ConfigError::LoadError(Box::new(e)))?;

        config.validate()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(CellConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("BREWCELL_").split("__"))
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Every address parses as `host:port`
    /// - Storage ceiling is non-zero
    /// - Delay and grind-usage ranges are not inverted
    /// - Poll intervals and tick period are non-zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        for (field, addr) in [
            ("dispenser.bind", &self.dispenser.bind),
            ("grinder.bind", &self.grinder.bind),
            ("gateway.dispenser_addr", &self.gateway.dispenser_addr),
            ("gateway.grinder_addr", &self.gateway.grinder_addr),
        ] {
            validate_addr(field, addr)?;
        }

        if self.dispenser.max_storage == 0 {
            return Err(ConfigError::ValidationError(
                "dispenser.max_storage must be > 0".to_string(),
            ));
        }

        if self.dispenser.brew_delay_min_ms > self.dispenser.brew_delay_max_ms {
            return Err(ConfigError::ValidationError(format!(
                "dispenser brew delay range inverted: {} > {}",
                self.dispenser.brew_delay_min_ms, self.dispenser.brew_delay_max_ms
            )));
        }

        if self.grinder.tick_ms == 0 {
            return Err(ConfigError::ValidationError(
                "grinder.tick_ms must be > 0".to_string(),
            ));
        }

        if self.grinder.min_bean_level > 100 {
            return Err(ConfigError::ValidationError(format!(
                "grinder.min_bean_level {} exceeds 100",
                self.grinder.min_bean_level
            )));
        }

        if self.gateway.min_bean_level > 100 {
            return Err(ConfigError::ValidationError(format!(
                "gateway.min_bean_level {} exceeds 100",
                self.gateway.min_bean_level
            )));
        }

        if self.grinder.grind_usage_min > self.grinder.grind_usage_max {
            return Err(ConfigError::ValidationError(format!(
                "grinder usage range inverted: {} > {}",
                self.grinder.grind_usage_min, self.grinder.grind_usage_max
            )));
        }

        for (field, value) in [
            ("gateway.bean_poll_interval_ms", self.gateway.bean_poll_interval_ms),
            ("gateway.accept_poll_interval_ms", self.gateway.accept_poll_interval_ms),
            (
                "gateway.complete_poll_interval_ms",
                self.gateway.complete_poll_interval_ms,
            ),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be > 0",
                    field
                )));
            }
        }

        if self.gateway.max_poll_attempts == Some(0) {
            return Err(ConfigError::ValidationError(
                "gateway.max_poll_attempts must be > 0 when set".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_addr(field: &str, addr: &str) -> Result<(), ConfigError> {
    if addr.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "{} cannot be empty",
            field
        )));
    }
    // Host names are allowed for client addresses, so only the port is checked
    // strictly when the address is not a literal socket address.
    if addr.parse::<SocketAddr>().is_ok() {
        return Ok(());
    }
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(()),
        _ => Err(ConfigError::ValidationError(format!(
            "{} '{}' is not a valid host:port address",
            field, addr
        ))),
    }
}
