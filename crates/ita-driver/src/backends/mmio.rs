//! MMIO register file
//!
//! Drives real hardware: the engine control block and the busy word are two
//! separately mapped ranges. Register writes are volatile and issued in
//! program order; a `SeqCst` fence follows every control write and precedes
//! every status read so no store is still in flight when software samples
//! the queue or busy state.

use super::mmap::MmapRegion;
use crate::backend::{BackendType, RegisterFile};
use crate::config::DriverConfig;
use crate::error::{ItaError, Result};
use ita_chip::regs::{BLOCK_SIZE, BUSY_BLOCK_SIZE};
use ita_chip::{Block, Reg};
use std::sync::atomic::{fence, Ordering};

/// Engine registers behind `mmap`
#[derive(Debug)]
pub struct MmioRegisters {
    engine: MmapRegion,
    busy: MmapRegion,
}

impl MmioRegisters {
    /// Map the register block described by `config.mmio`.
    ///
    /// # Errors
    ///
    /// Returns error if no MMIO placement is configured or mapping fails.
    pub fn open(config: &DriverConfig) -> Result<Self> {
        let mmio = config.mmio.as_ref().ok_or_else(|| {
            ItaError::invalid_config("mmio", "no engine placement configured")
        })?;

        tracing::info!(
            "Opening ITA registers: engine {:#x}, busy {:#x} via {}",
            mmio.engine_base,
            mmio.busy_base,
            mmio.device.display()
        );

        let engine = MmapRegion::new(&mmio.device, mmio.engine_base, BLOCK_SIZE)?;
        let busy = MmapRegion::new(&mmio.device, mmio.busy_base, BUSY_BLOCK_SIZE)?;
        Ok(Self { engine, busy })
    }

    fn region(&mut self, reg: Reg) -> &mut MmapRegion {
        match reg.block() {
            Block::Engine => &mut self.engine,
            Block::Busy => &mut self.busy,
        }
    }
}

impl RegisterFile for MmioRegisters {
    fn read(&mut self, reg: Reg) -> Result<u32> {
        if reg.is_status() {
            fence(Ordering::SeqCst);
        }
        self.region(reg).read_u32(reg.offset())
    }

    fn write(&mut self, reg: Reg, value: u32) -> Result<()> {
        if reg.is_status() {
            return Err(ItaError::invalid_state(format!("{reg} is read-only")));
        }
        self.region(reg).write_u32(reg.offset(), value)?;
        if matches!(reg, Reg::CtrlTrigger | Reg::SoftReset) {
            fence(Ordering::SeqCst);
        }
        Ok(())
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Mmio
    }
}
