//! Software (simulated engine) backend
//!
//! Implements [`RegisterFile`] with an in-memory model of the engine's
//! control block and its two-slot job queue. No arithmetic is modelled: a
//! job is a snapshot of the context registers taken when it was staged,
//! held for a fixed number of status polls, then retired.
//!
//! ## Queue model
//!
//! ```text
//!            commit (1) / trigger (0, if reprogrammed)
//! registers ─────────────────────────────────────────▶ staged ──▶ running ──▶ completed
//!                                                      └── at most QUEUE_CAPACITY together ──┘
//! ```
//!
//! - `commit` stages the current registers; it never starts the engine.
//! - `trigger` stages the registers if they were written since the last
//!   stage, then arms the engine: the queue head starts if idle, and staged
//!   contexts keep flowing until the queue drains.
//! - Time advances by one tick per status read (`QUEUE_FREE_COUNT`,
//!   `BUSY`); a running job retires after `latency` ticks.
//! - Staging with no free slot is refused with
//!   [`ItaError::QueueOverflow`].
//!
//! A keep-config reset leaves the last programmed registers pending, so the
//! next trigger runs them again.
//!
//! Every write is logged in program order and every staged context is kept,
//! so tests can check ordering and write isolation after the fact.

use crate::backend::{BackendType, RegisterFile};
use crate::config::DriverConfig;
use crate::error::{ItaError, Result};
use crate::job::{Job, RequantParams};
use ita_chip::regs::{ctrl, reset, QUEUE_CAPACITY};
use ita_chip::{MemoryWindow, Reg};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Context registers captured when a job was staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContextSnapshot {
    words: [u32; Reg::CONTEXT.len()],
}

impl ContextSnapshot {
    /// The register values a correct driver programs for `job`.
    #[must_use]
    pub fn expected(job: &Job, window: &MemoryWindow) -> Self {
        let mut snap = Self::default();
        for (reg, addr) in job.config.addresses.registers() {
            snap.set(reg, window.relative(addr));
        }
        snap.set(Reg::TileShape, job.config.tiles.word());
        snap.set(Reg::LayerSelect, job.config.layer.word());
        snap.set(Reg::Flags, job.config.flags.word());
        for (reg, word) in job.requant.registers() {
            snap.set(reg, word);
        }
        snap
    }

    /// Value of a context register; `None` for control/status registers.
    #[must_use]
    pub fn get(&self, reg: Reg) -> Option<u32> {
        reg.context_index().map(|i| self.words[i])
    }

    fn set(&mut self, reg: Reg, value: u32) {
        if let Some(i) = reg.context_index() {
            self.words[i] = value;
        }
    }

    /// Window-relative addresses in register order.
    #[must_use]
    pub fn addresses(&self) -> [u32; 5] {
        [
            self.words[0],
            self.words[1],
            self.words[2],
            self.words[3],
            self.words[4],
        ]
    }

    /// Requantization words.
    #[must_use]
    pub const fn requant(&self) -> RequantParams {
        RequantParams {
            eps1: self.words[6],
            eps2: self.words[7],
            shift1: self.words[8],
            shift2: self.words[9],
            add1: self.words[10],
            add2: self.words[11],
        }
    }

    /// Packed tile word.
    #[must_use]
    pub const fn tiles(&self) -> u32 {
        self.words[5]
    }

    /// Packed layer word.
    #[must_use]
    pub const fn layer(&self) -> u32 {
        self.words[12]
    }

    /// Packed flag word.
    #[must_use]
    pub const fn flags(&self) -> u32 {
        self.words[13]
    }
}

#[derive(Debug)]
struct Running {
    context: ContextSnapshot,
    remaining: u32,
}

/// In-memory engine with a two-slot job queue.
#[derive(Debug)]
pub struct SimulatedEngine {
    /// Live context registers
    registers: ContextSnapshot,
    /// Context registers written since the last stage
    dirty: bool,
    staged: VecDeque<ContextSnapshot>,
    running: Option<Running>,
    /// Set by trigger, cleared when the queue drains
    armed: bool,
    /// Ticks a job stays running
    latency: u32,
    /// Fault injection: jobs never retire
    stalled: bool,

    committed: Vec<ContextSnapshot>,
    completed: Vec<ContextSnapshot>,
    writes: Vec<(Reg, u32)>,
    max_in_flight: u32,
    polls: u64,
    settle_cycles: u64,
    resets: u32,
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SIMULATED_LATENCY)
    }
}

impl SimulatedEngine {
    /// Engine whose jobs retire after `latency` status polls (minimum 1).
    pub fn new(latency: u32) -> Self {
        Self {
            registers: ContextSnapshot::default(),
            dirty: false,
            staged: VecDeque::with_capacity(QUEUE_CAPACITY as usize),
            running: None,
            armed: false,
            latency: latency.max(1),
            stalled: false,
            committed: Vec::new(),
            completed: Vec::new(),
            writes: Vec::new(),
            max_in_flight: 0,
            polls: 0,
            settle_cycles: 0,
            resets: 0,
        }
    }

    /// Engine configured from the driver settings.
    pub fn from_config(config: &DriverConfig) -> Self {
        Self::new(config.simulated_latency)
    }

    /// Stop retiring jobs: the engine hangs like faulty hardware.
    #[must_use]
    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    /// Resume (or stop) retiring jobs.
    pub fn set_stalled(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    /// Contexts staged or executing.
    #[allow(clippy::cast_possible_truncation)]
    pub fn in_flight(&self) -> u32 {
        self.staged.len() as u32 + u32::from(self.running.is_some())
    }

    /// Current free-slot count.
    pub fn free_slots(&self) -> u32 {
        QUEUE_CAPACITY.saturating_sub(self.in_flight())
    }

    /// Whether a job is executing.
    pub const fn is_busy(&self) -> bool {
        self.running.is_some()
    }

    /// Every context staged since creation, in staging order.
    pub fn committed(&self) -> &[ContextSnapshot] {
        &self.committed
    }

    /// Every context that finished executing, in completion order.
    pub fn completed(&self) -> &[ContextSnapshot] {
        &self.completed
    }

    /// All register writes in program order.
    pub fn writes(&self) -> &[(Reg, u32)] {
        &self.writes
    }

    /// Highest number of contexts ever in flight at once.
    pub const fn max_in_flight(&self) -> u32 {
        self.max_in_flight
    }

    /// Status reads served.
    pub const fn polls(&self) -> u64 {
        self.polls
    }

    /// Total settle cycles requested after resets.
    pub const fn settle_cycles(&self) -> u64 {
        self.settle_cycles
    }

    /// Soft resets received.
    pub const fn resets(&self) -> u32 {
        self.resets
    }

    /// Live value of a context register.
    pub fn register(&self, reg: Reg) -> Option<u32> {
        self.registers.get(reg)
    }

    fn stage(&mut self) -> Result<()> {
        let in_flight = self.in_flight();
        if in_flight >= QUEUE_CAPACITY {
            return Err(ItaError::QueueOverflow { in_flight });
        }
        self.staged.push_back(self.registers);
        self.committed.push(self.registers);
        self.dirty = false;
        self.max_in_flight = self.max_in_flight.max(self.in_flight());
        debug!(
            "Staged context #{} ({} in flight)",
            self.committed.len(),
            self.in_flight()
        );
        Ok(())
    }

    fn start_next(&mut self) {
        if self.running.is_some() || !self.armed {
            return;
        }
        match self.staged.pop_front() {
            Some(context) => {
                self.running = Some(Running {
                    context,
                    remaining: self.latency,
                });
            }
            None => self.armed = false,
        }
    }

    fn tick(&mut self) {
        self.polls += 1;
        if self.stalled {
            return;
        }
        if let Some(run) = self.running.as_mut() {
            run.remaining = run.remaining.saturating_sub(1);
            if run.remaining == 0 {
                if let Some(done) = self.running.take() {
                    self.completed.push(done.context);
                    trace!("Retired context, {} completed", self.completed.len());
                }
            }
        }
        self.start_next();
    }

    fn soft_reset(&mut self, keep_config: bool) {
        self.staged.clear();
        self.running = None;
        self.armed = false;
        // Retained registers count as a pending context for the next trigger.
        self.dirty = keep_config;
        if !keep_config {
            self.registers = ContextSnapshot::default();
        }
        self.resets += 1;
        debug!("Soft reset (keep config: {keep_config})");
    }
}

impl RegisterFile for SimulatedEngine {
    fn read(&mut self, reg: Reg) -> Result<u32> {
        let value = match reg {
            Reg::QueueFreeCount => {
                self.tick();
                self.free_slots()
            }
            Reg::Busy => {
                self.tick();
                u32::from(self.is_busy())
            }
            Reg::CtrlTrigger | Reg::SoftReset => 0,
            _ => self.registers.get(reg).unwrap_or_default(),
        };
        trace!("Read {reg} = {value:#x}");
        Ok(value)
    }

    fn write(&mut self, reg: Reg, value: u32) -> Result<()> {
        trace!("Write {reg} = {value:#x}");
        self.writes.push((reg, value));
        match reg {
            Reg::CtrlTrigger => match value {
                ctrl::COMMIT => self.stage(),
                ctrl::TRIGGER => {
                    if self.dirty {
                        self.stage()?;
                    }
                    self.armed = true;
                    self.start_next();
                    Ok(())
                }
                other => Err(ItaError::invalid_state(format!(
                    "CTRL_TRIGGER accepts 0 or 1, got {other:#x}"
                ))),
            },
            Reg::SoftReset => {
                self.soft_reset(value == reset::KEEP_CONFIG);
                Ok(())
            }
            Reg::QueueFreeCount | Reg::Busy => Err(ItaError::invalid_state(format!(
                "{reg} is read-only"
            ))),
            _ => {
                self.registers.set(reg, value);
                self.dirty = true;
                Ok(())
            }
        }
    }

    fn settle(&mut self, cycles: u32) {
        self.settle_cycles += u64::from(cycles);
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Software
    }
}
