//! The grinder's four holding registers.
//!
//! | Address | Register     | Values                                   |
//! |---------|--------------|------------------------------------------|
//! | 0       | `command`    | 0 = none, 1 = grind, 2 = refill beans    |
//! | 1       | `status`     | 0 = idle, 1 = working, 2 = fault         |
//! | 2       | `bean_level` | 0..=100 (percent)                        |
//! | 3       | `error_code` | 0 = none, 1 = insufficient beans         |
//!
//! External peers may write any register; value ranges are enforced, the
//! read-only nature of registers 1..=3 is not. While the grinder is working,
//! external writes are accepted on the wire but discarded.

use parking_lot::Mutex;
use thiserror::Error;

/// Command register address.
pub const CMD_REG: u16 = 0;
/// Status register address.
pub const STATUS_REG: u16 = 1;
/// Bean level register address.
pub const BEAN_LEVEL_REG: u16 = 2;
/// Error code register address.
pub const ERROR_CODE_REG: u16 = 3;
/// Number of holding registers.
pub const REGISTER_COUNT: u16 = 4;

/// Bean level after a refill.
pub const FULL_BEAN_LEVEL: u16 = 100;

/// Value of the command register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum GrinderCommand {
    /// Nothing pending.
    None = 0,
    /// Grind one portion.
    Grind = 1,
    /// Refill the hopper.
    RefillBeans = 2,
}

impl TryFrom<u16> for GrinderCommand {
    type Error = u16;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(GrinderCommand::None),
            1 => Ok(GrinderCommand::Grind),
            2 => Ok(GrinderCommand::RefillBeans),
            other => Err(other),
        }
    }
}

/// Value of the status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum GrinderStatus {
    /// Ready for a command.
    Idle = 0,
    /// Running a command.
    Working = 1,
    /// Cannot grind until refilled.
    Fault = 2,
}

impl TryFrom<u16> for GrinderStatus {
    type Error = u16;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(GrinderStatus::Idle),
            1 => Ok(GrinderStatus::Working),
            2 => Ok(GrinderStatus::Fault),
            other => Err(other),
        }
    }
}

/// Value of the error-code register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    /// No error.
    None = 0,
    /// Too few beans to grind.
    InsufficientBeans = 1,
}

impl TryFrom<u16> for ErrorCode {
    type Error = u16;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(ErrorCode::None),
            1 => Ok(ErrorCode::InsufficientBeans),
            other => Err(other),
        }
    }
}

/// A typed copy of all four registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrinderRegisters {
    /// Register 0.
    pub command: GrinderCommand,
    /// Register 1.
    pub status: GrinderStatus,
    /// Register 2.
    pub bean_level: u16,
    /// Register 3.
    pub error_code: ErrorCode,
}

impl GrinderRegisters {
    /// Power-on state: idle, full hopper, no fault.
    pub const INITIAL: GrinderRegisters = GrinderRegisters {
        command: GrinderCommand::None,
        status: GrinderStatus::Idle,
        bean_level: FULL_BEAN_LEVEL,
        error_code: ErrorCode::None,
    };

    /// Raw values in address order.
    pub fn to_raw(self) -> [u16; REGISTER_COUNT as usize] {
        [
            self.command as u16,
            self.status as u16,
            self.bean_level,
            self.error_code as u16,
        ]
    }

    /// Decode the four raw register values, in address order.
    pub fn from_raw(raw: &[u16]) -> Result<Self, RegisterError> {
        let [command, status, bean_level, error_code] = raw else {
            return Err(RegisterError::IllegalAddress {
                start: 0,
                count: raw.len() as u16,
            });
        };
        let mut regs = GrinderRegisters::INITIAL;
        regs.set(CMD_REG, *command)?;
        regs.set(STATUS_REG, *status)?;
        regs.set(BEAN_LEVEL_REG, *bean_level)?;
        regs.set(ERROR_CODE_REG, *error_code)?;
        Ok(regs)
    }

    /// Ready to grind: enough beans and no latched fault.
    pub fn is_ready(&self, min_bean_level: u16) -> bool {
        self.bean_level >= min_bean_level && self.error_code == ErrorCode::None
    }

    fn set(&mut self, addr: u16, value: u16) -> Result<(), RegisterError> {
        let illegal = || RegisterError::IllegalValue { addr, value };
        match addr {
            CMD_REG => self.command = GrinderCommand::try_from(value).map_err(|_| illegal())?,
            STATUS_REG => self.status = GrinderStatus::try_from(value).map_err(|_| illegal())?,
            BEAN_LEVEL_REG if value <= FULL_BEAN_LEVEL => self.bean_level = value,
            BEAN_LEVEL_REG => return Err(illegal()),
            ERROR_CODE_REG => self.error_code = ErrorCode::try_from(value).map_err(|_| illegal())?,
            _ => return Err(RegisterError::IllegalAddress { start: addr, count: 1 }),
        }
        Ok(())
    }
}

/// Why a register access was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegisterError {
    /// Range outside the bank.
    #[error("register range {start}+{count} outside 0..{REGISTER_COUNT}")]
    IllegalAddress { start: u16, count: u16 },
    /// Value outside the register's domain.
    #[error("value {value} not allowed in register {addr}")]
    IllegalValue { addr: u16, value: u16 },
}

/// Whether an external write took effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Write took effect.
    Applied,
    /// Discarded because the grinder was working.
    IgnoredBusy,
}

/// The shared register set. Every access, from serving connections and from
/// the control loop alike, goes through one mutex.
#[derive(Debug)]
pub struct RegisterBank {
    regs: Mutex<GrinderRegisters>,
}

impl Default for RegisterBank {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBank {
    /// Bank in the power-on state.
    pub fn new() -> Self {
        Self::with_state(GrinderRegisters::INITIAL)
    }

    /// Bank starting from `regs`.
    pub fn with_state(regs: GrinderRegisters) -> Self {
        Self {
            regs: Mutex::new(regs),
        }
    }

    /// Copy of all four registers.
    pub fn snapshot(&self) -> GrinderRegisters {
        *self.regs.lock()
    }

    /// Read `count` consecutive raw values starting at `start`.
    pub fn read(&self, start: u16, count: u16) -> Result<Vec<u16>, RegisterError> {
        let range = checked_range(start, count)?;
        let raw = self.regs.lock().to_raw();
        Ok(raw[range].to_vec())
    }

    /// External single-register write.
    pub fn write(&self, addr: u16, value: u16) -> Result<WriteOutcome, RegisterError> {
        self.write_many(addr, &[value])
    }

    /// External multi-register write. All values are validated before any is
    /// applied.
    pub fn write_many(&self, start: u16, values: &[u16]) -> Result<WriteOutcome, RegisterError> {
        checked_range(start, values.len() as u16)?;
        let mut regs = self.regs.lock();

        let mut next = *regs;
        for (offset, value) in values.iter().enumerate() {
            next.set(start + offset as u16, *value)?;
        }

        if regs.status == GrinderStatus::Working {
            return Ok(WriteOutcome::IgnoredBusy);
        }
        *regs = next;
        Ok(WriteOutcome::Applied)
    }

    /// Read-modify-write on behalf of the control loop; never refused.
    pub fn update<R>(&self, f: impl FnOnce(&mut GrinderRegisters) -> R) -> R {
        f(&mut self.regs.lock())
    }
}

fn checked_range(start: u16, count: u16) -> Result<std::ops::Range<usize>, RegisterError> {
    let end = start as usize + count as usize;
    if count == 0 || end > REGISTER_COUNT as usize {
        return Err(RegisterError::IllegalAddress { start, count });
    }
    Ok(start as usize..end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let bank = RegisterBank::new();
        assert_eq!(bank.read(0, 4).unwrap(), vec![0, 0, 100, 0]);
    }

    #[test]
    fn test_out_of_range_read() {
        let bank = RegisterBank::new();
        assert!(matches!(
            bank.read(3, 2),
            Err(RegisterError::IllegalAddress { start: 3, count: 2 })
        ));
        assert!(bank.read(0, 0).is_err());
    }

    #[test]
    fn test_write_validates_values() {
        let bank = RegisterBank::new();
        assert_eq!(
            bank.write(CMD_REG, 7),
            Err(RegisterError::IllegalValue { addr: 0, value: 7 })
        );
        assert!(bank.write(BEAN_LEVEL_REG, 101).is_err());
        assert_eq!(bank.write(BEAN_LEVEL_REG, 5), Ok(WriteOutcome::Applied));
        assert_eq!(bank.snapshot().bean_level, 5);
    }

    #[test]
    fn test_writes_ignored_while_working() {
        let bank = RegisterBank::new();
        bank.update(|r| r.status = GrinderStatus::Working);
        assert_eq!(bank.write(CMD_REG, 2), Ok(WriteOutcome::IgnoredBusy));
        assert_eq!(bank.snapshot().command, GrinderCommand::None);
    }

    #[test]
    fn test_write_many_is_all_or_nothing() {
        let bank = RegisterBank::new();
        assert!(bank.write_many(BEAN_LEVEL_REG, &[50, 9]).is_err());
        assert_eq!(bank.snapshot().bean_level, 100);
    }

    #[test]
    fn test_from_raw_roundtrip() {
        let regs = GrinderRegisters {
            command: GrinderCommand::None,
            status: GrinderStatus::Fault,
            bean_level: 4,
            error_code: ErrorCode::InsufficientBeans,
        };
        assert_eq!(GrinderRegisters::from_raw(&regs.to_raw()).unwrap(), regs);
        assert!(GrinderRegisters::from_raw(&[0, 0]).is_err());
    }
}
