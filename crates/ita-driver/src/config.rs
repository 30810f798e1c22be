//! Driver configuration
//!
//! Everything the driver needs to know about its environment: where the
//! engine's memory window starts, how long to let a soft reset settle, how to
//! wait on status registers, and where to map the register block from when
//! running against real hardware.
//!
//! Values come from [`DriverConfig::default`], the `with_*` builders, or
//! [`DriverConfig::from_env`]:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `ITA_WINDOW_BASE` | `window` base |
//! | `ITA_WINDOW_SIZE` | `window` size |
//! | `ITA_POLL_TIMEOUT_MS` | `poll` (bounded spin; `0` = unbounded) |
//! | `ITA_RESET_DELAY` | `reset_settle_cycles` |
//! | `ITA_MMIO_DEVICE` | `mmio.device` |
//! | `ITA_ENGINE_BASE` | `mmio.engine_base` |
//! | `ITA_BUSY_BASE` | `mmio.busy_base` |
//!
//! Numbers accept decimal or `0x` hex.

use crate::error::{ItaError, Result};
use crate::wait::{BoundedPoll, BusyPoll, SleepPoll, WaitCondition, WaitStrategy};
use ita_chip::regs::RESET_SETTLE_CYCLES;
use ita_chip::MemoryWindow;
use std::path::PathBuf;
use std::time::Duration;

/// Default window: 128 KiB at 0x1000_0000.
pub const DEFAULT_WINDOW: MemoryWindow = MemoryWindow::new(0x1000_0000, 0x2_0000);

/// Default simulated job latency, in status polls.
pub const DEFAULT_SIMULATED_LATENCY: u32 = 4;

/// How the controller waits on status registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollPolicy {
    /// Spin forever
    #[default]
    Busy,
    /// Spin until the timeout expires
    Bounded {
        /// Deadline per wait
        timeout: Duration,
    },
    /// Sleep between polls until the timeout expires
    Sleep {
        /// Pause between status reads
        interval: Duration,
        /// Deadline per wait
        timeout: Duration,
    },
}

impl WaitStrategy for PollPolicy {
    fn wait_until<F>(&mut self, condition: WaitCondition, ready: F) -> Result<u64>
    where
        F: FnMut() -> Result<bool>,
    {
        match *self {
            Self::Busy => BusyPoll.wait_until(condition, ready),
            Self::Bounded { timeout } => BoundedPoll::timeout(timeout).wait_until(condition, ready),
            Self::Sleep { interval, timeout } => {
                SleepPoll::new(interval, timeout).wait_until(condition, ready)
            }
        }
    }
}

/// Physical placement of the register block for the MMIO backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MmioConfig {
    /// Device file to map from (`/dev/mem`, a UIO node, ...)
    pub device: PathBuf,
    /// Physical address of the engine register block
    pub engine_base: u64,
    /// Physical address of the busy word
    pub busy_base: u64,
}

/// Driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Memory window job addresses are relative to
    pub window: MemoryWindow,

    /// Reject job addresses outside `window` on the typed path
    pub validate_addresses: bool,

    /// No-op iterations after a soft reset
    pub reset_settle_cycles: u32,

    /// Wait behaviour for `acquire_slot` / `wait_idle`
    pub poll: PollPolicy,

    /// Job latency of the simulated engine, in status polls
    pub simulated_latency: u32,

    /// Register block placement, required by the MMIO backend only
    pub mmio: Option<MmioConfig>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            validate_addresses: true,
            reset_settle_cycles: RESET_SETTLE_CYCLES,
            poll: PollPolicy::Busy,
            simulated_latency: DEFAULT_SIMULATED_LATENCY,
            mmio: None,
        }
    }
}

impl DriverConfig {
    /// Set the memory window.
    #[must_use]
    pub fn with_window(mut self, window: MemoryWindow) -> Self {
        self.window = window;
        self
    }

    /// Enable or disable address validation on the typed path.
    #[must_use]
    pub fn with_address_validation(mut self, validate: bool) -> Self {
        self.validate_addresses = validate;
        self
    }

    /// Set the wait policy.
    #[must_use]
    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Bound every wait by `timeout` (spinning).
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_poll(PollPolicy::Bounded { timeout })
    }

    /// Set the reset settle delay.
    #[must_use]
    pub fn with_reset_settle_cycles(mut self, cycles: u32) -> Self {
        self.reset_settle_cycles = cycles;
        self
    }

    /// Set the simulated job latency.
    #[must_use]
    pub fn with_simulated_latency(mut self, polls: u32) -> Self {
        self.simulated_latency = polls;
        self
    }

    /// Set the MMIO placement.
    #[must_use]
    pub fn with_mmio(mut self, mmio: MmioConfig) -> Self {
        self.mmio = Some(mmio);
        self
    }

    /// Defaults overridden by `ITA_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ItaError::InvalidConfig`] if a variable is set but does not
    /// parse, or if only part of the MMIO placement is given.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup<L>(lookup: L) -> Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let number = |key: &str| -> Result<Option<u64>> {
            lookup(key).map(|v| parse_number(key, &v)).transpose()
        };
        let word = |key: &str| -> Result<Option<u32>> {
            number(key)?
                .map(|v| {
                    u32::try_from(v)
                        .map_err(|_| ItaError::invalid_config(key, format!("{v:#x} exceeds 32 bits")))
                })
                .transpose()
        };

        let base = word("ITA_WINDOW_BASE")?.unwrap_or(config.window.base());
        let size = word("ITA_WINDOW_SIZE")?.unwrap_or(config.window.size());
        config.window = MemoryWindow::new(base, size);

        if let Some(ms) = number("ITA_POLL_TIMEOUT_MS")? {
            config.poll = if ms == 0 {
                PollPolicy::Busy
            } else {
                PollPolicy::Bounded {
                    timeout: Duration::from_millis(ms),
                }
            };
        }
        if let Some(cycles) = word("ITA_RESET_DELAY")? {
            config.reset_settle_cycles = cycles;
        }

        let engine_base = number("ITA_ENGINE_BASE")?;
        let busy_base = number("ITA_BUSY_BASE")?;
        config.mmio = match (engine_base, busy_base) {
            (Some(engine_base), Some(busy_base)) => Some(MmioConfig {
                device: lookup("ITA_MMIO_DEVICE").map_or_else(|| "/dev/mem".into(), PathBuf::from),
                engine_base,
                busy_base,
            }),
            (None, None) => None,
            _ => {
                return Err(ItaError::invalid_config(
                    "ITA_ENGINE_BASE/ITA_BUSY_BASE",
                    "both must be set together",
                ))
            }
        };

        tracing::debug!(
            "Driver config: window {}, poll {:?}, reset settle {}",
            config.window,
            config.poll,
            config.reset_settle_cycles
        );
        Ok(config)
    }
}

/// Parse a decimal or `0x`-prefixed hex number.
///
/// # Errors
///
/// Returns [`ItaError::InvalidConfig`] naming `key` if `value` does not parse.
pub fn parse_number(key: &str, value: &str) -> Result<u64> {
    let value = value.trim().replace('_', "");
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| ItaError::invalid_config(key, format!("{value:?}: {e}")))
}
