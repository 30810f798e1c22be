//! Register interface layer
//!
//! Turns a job into the exact sequence of register writes the engine
//! expects. Two entry points:
//!
//! - raw: [`EngineRegisters::write_job`] / [`EngineRegisters::write_requant`]
//!   take already-packed words and absolute addresses and write them
//!   unchecked, bit for bit as the firmware does
//! - typed: [`EngineRegisters::program`] takes a [`Job`], optionally checks
//!   its addresses against the window, then issues the same writes
//!
//! Write order inside `write_job` is fixed: the five addresses, then
//! `TILE_SHAPE`, `LAYER_SELECT`, and `FLAGS` last.

use crate::backend::RegisterFile;
use crate::config::DriverConfig;
use crate::error::{ItaError, Result};
use crate::job::{Job, JobAddresses};
use ita_chip::regs::reset;
use ita_chip::{MemoryWindow, Reg};
use tracing::{debug, trace};

/// Register-level access to one engine.
#[derive(Debug)]
pub struct EngineRegisters<R> {
    regs: R,
    window: MemoryWindow,
    reset_settle_cycles: u32,
    validate_addresses: bool,
}

impl<R: RegisterFile> EngineRegisters<R> {
    /// Wrap a register file with the window and reset timing from `config`.
    pub fn new(regs: R, config: &DriverConfig) -> Self {
        debug!(
            "Engine registers on {} backend, window {}",
            regs.backend_type(),
            config.window
        );
        Self {
            regs,
            window: config.window,
            reset_settle_cycles: config.reset_settle_cycles,
            validate_addresses: config.validate_addresses,
        }
    }

    /// Write one register.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn write(&mut self, reg: Reg, value: u32) -> Result<()> {
        trace!("{reg} <- {value:#010x}");
        self.regs.write(reg, value)
    }

    /// Read one register.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn read(&mut self, reg: Reg) -> Result<u32> {
        self.regs.read(reg)
    }

    /// Program the job registers from raw values.
    ///
    /// Addresses are absolute and translated to window-relative offsets by
    /// wrapping subtraction; nothing is range-checked.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    #[allow(clippy::too_many_arguments)]
    pub fn write_job(
        &mut self,
        input_addr: u32,
        weight_addr: u32,
        weight_next_addr: u32,
        bias_addr: u32,
        output_addr: u32,
        tiles: u32,
        layer: u32,
        flags: u32,
    ) -> Result<()> {
        let addresses = JobAddresses {
            input: input_addr,
            weight: weight_addr,
            weight_next: weight_next_addr,
            bias: bias_addr,
            output: output_addr,
        };
        for (reg, addr) in addresses.registers() {
            let offset = self.window.relative(addr);
            self.write(reg, offset)?;
        }
        self.write(Reg::TileShape, tiles)?;
        self.write(Reg::LayerSelect, layer)?;
        self.write(Reg::Flags, flags)
    }

    /// Program the six requantization words.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn write_requant(
        &mut self,
        eps1: u32,
        eps2: u32,
        shift1: u32,
        shift2: u32,
        add1: u32,
        add2: u32,
    ) -> Result<()> {
        self.write(Reg::RequantEps1, eps1)?;
        self.write(Reg::RequantEps2, eps2)?;
        self.write(Reg::RequantShift1, shift1)?;
        self.write(Reg::RequantShift2, shift2)?;
        self.write(Reg::RequantAdd1, add1)?;
        self.write(Reg::RequantAdd2, add2)
    }

    /// Check every job address against the window.
    ///
    /// # Errors
    ///
    /// Returns [`ItaError::AddressOutOfWindow`] for the first address outside.
    pub fn check_addresses(&self, addresses: &JobAddresses) -> Result<()> {
        for (register, addr) in addresses.registers() {
            if !self.window.contains(addr) {
                return Err(ItaError::AddressOutOfWindow {
                    register,
                    addr,
                    base: self.window.base(),
                    size: self.window.size(),
                });
            }
        }
        Ok(())
    }

    /// Program a full context: requantization first, then the job registers.
    ///
    /// With address validation enabled, nothing is written unless every
    /// address lies in the window.
    ///
    /// # Errors
    ///
    /// Returns [`ItaError::AddressOutOfWindow`] or backend errors.
    pub fn program(&mut self, job: &Job) -> Result<()> {
        let cfg = &job.config;
        if self.validate_addresses {
            self.check_addresses(&cfg.addresses)?;
        }
        let rq = &job.requant;
        self.write_requant(rq.eps1, rq.eps2, rq.shift1, rq.shift2, rq.add1, rq.add2)?;
        let a = &cfg.addresses;
        self.write_job(
            a.input,
            a.weight,
            a.weight_next,
            a.bias,
            a.output,
            cfg.tiles.word(),
            cfg.layer.word(),
            cfg.flags.word(),
        )
    }

    /// Full reset: execution state and programmed registers.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn soft_reset(&mut self) -> Result<()> {
        self.reset_with(reset::FULL)
    }

    /// Reset execution state, keep the last programmed registers.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn soft_reset_keep_config(&mut self) -> Result<()> {
        self.reset_with(reset::KEEP_CONFIG)
    }

    fn reset_with(&mut self, value: u32) -> Result<()> {
        debug!("Soft reset ({value})");
        self.write(Reg::SoftReset, value)?;
        // Reset needs a few cycles to propagate before the next access.
        self.regs.settle(self.reset_settle_cycles);
        Ok(())
    }

    /// Memory window used for address translation.
    pub const fn window(&self) -> &MemoryWindow {
        &self.window
    }

    /// Underlying register file.
    pub const fn inner(&self) -> &R {
        &self.regs
    }

    /// Underlying register file, mutably.
    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    /// Release the register file.
    pub fn into_inner(self) -> R {
        self.regs
    }
}
