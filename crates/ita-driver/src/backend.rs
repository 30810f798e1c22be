//! Register file abstraction
//!
//! The driver never touches a raw pointer directly. Every register access
//! goes through a [`RegisterFile`], injected into the controller:
//!
//! - [`MmioRegisters`](crate::backends::MmioRegisters): volatile accesses to
//!   the mapped engine block, for real hardware
//! - [`SimulatedEngine`](crate::backends::SimulatedEngine): in-memory model
//!   with the same read/write semantics, for tests and bring-up

use crate::config::DriverConfig;
use crate::error::Result;
use ita_chip::Reg;
use std::fmt::Debug;

/// Access to the engine's control/status registers.
///
/// Reads take `&mut self`: a status read may have side effects (the
/// simulator advances time on every poll) and the engine tolerates only one
/// writer, so exclusive access is required throughout.
pub trait RegisterFile: Debug + Send {
    /// Read a 32-bit register.
    ///
    /// # Errors
    ///
    /// Returns error if the register cannot be accessed.
    fn read(&mut self, reg: Reg) -> Result<u32>;

    /// Write a 32-bit register.
    ///
    /// # Errors
    ///
    /// Returns error if the register cannot be accessed or the backend
    /// refuses the value.
    fn write(&mut self, reg: Reg, value: u32) -> Result<()>;

    /// Burn `cycles` no-op iterations, e.g. to let a reset propagate.
    fn settle(&mut self, cycles: u32) {
        for i in 0..cycles {
            std::hint::black_box(i);
            std::hint::spin_loop();
        }
    }

    /// Backend type for logging
    fn backend_type(&self) -> BackendType;
}

impl<T: RegisterFile + ?Sized> RegisterFile for Box<T> {
    fn read(&mut self, reg: Reg) -> Result<u32> {
        (**self).read(reg)
    }

    fn write(&mut self, reg: Reg, value: u32) -> Result<()> {
        (**self).write(reg, value)
    }

    fn settle(&mut self, cycles: u32) {
        (**self).settle(cycles);
    }

    fn backend_type(&self) -> BackendType {
        (**self).backend_type()
    }
}

/// Backend type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Memory-mapped hardware registers
    Mmio,

    /// In-memory engine model, no hardware required
    Software,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mmio => write!(f, "MMIO"),
            Self::Software => write!(f, "Software (simulated engine)"),
        }
    }
}

/// Backend selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendSelection {
    /// MMIO if a placement is configured, otherwise the simulator
    Auto,

    /// Force memory-mapped hardware
    Mmio,

    /// Force the simulated engine
    Software,
}

/// Open the register file chosen by `selection`.
///
/// # Errors
///
/// Returns error if the MMIO backend is requested but not configured, or if
/// mapping the registers fails.
pub fn open_backend(
    selection: BackendSelection,
    config: &DriverConfig,
) -> Result<Box<dyn RegisterFile>> {
    use crate::backends::{MmioRegisters, SimulatedEngine};

    match selection {
        BackendSelection::Auto => {
            if config.mmio.is_some() {
                if let Ok(regs) = MmioRegisters::open(config) {
                    tracing::info!("Using MMIO backend");
                    return Ok(Box::new(regs));
                }
            }
            tracing::info!("No mapped engine available, using simulated engine");
            Ok(Box::new(SimulatedEngine::from_config(config)))
        }

        BackendSelection::Mmio => {
            MmioRegisters::open(config).map(|r| Box::new(r) as Box<dyn RegisterFile>)
        }

        BackendSelection::Software => Ok(Box::new(SimulatedEngine::from_config(config))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MmioConfig;
    use crate::error::ItaError;

    fn unmappable() -> DriverConfig {
        DriverConfig::default().with_mmio(MmioConfig {
            device: "/nonexistent/ita-mem".into(),
            engine_base: 0x4000_0000,
            busy_base: 0x4000_1000,
        })
    }

    #[test]
    fn auto_falls_back_to_simulator() {
        let regs = open_backend(BackendSelection::Auto, &unmappable()).unwrap();
        assert_eq!(regs.backend_type(), BackendType::Software);
    }

    #[test]
    fn forced_mmio_reports_mapping_failure() {
        let err = open_backend(BackendSelection::Mmio, &unmappable()).unwrap_err();
        assert!(matches!(err, ItaError::Mapping { .. }));
    }

    #[test]
    fn forced_mmio_without_placement_is_a_config_error() {
        let err = open_backend(BackendSelection::Mmio, &DriverConfig::default()).unwrap_err();
        assert!(matches!(err, ItaError::InvalidConfig { .. }));
    }
}
