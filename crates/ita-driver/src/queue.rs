//! Job-queue controller
//!
//! Drives the engine's two-slot context queue with four primitives:
//!
//! | Primitive | Register effect | Blocks |
//! |-----------|-----------------|--------|
//! | [`JobQueue::acquire_slot`] | polls `QUEUE_FREE_COUNT` | until a slot is free |
//! | [`JobQueue::commit`] | `CTRL_TRIGGER <- 1` | no |
//! | [`JobQueue::trigger`] | `CTRL_TRIGGER <- 0` | no |
//! | [`JobQueue::wait_idle`] | polls `BUSY` | until the engine is idle |
//!
//! `commit` only stages the programmed registers. `trigger` stages them if
//! they changed and starts the engine, which then works through the queue
//! on its own. Context registers must never be written while the queue is
//! full: always `acquire_slot` before programming the next context.
//!
//! [`JobQueue::configure_and_run`] is the canonical pipelined sequence: the
//! first two contexts are loaded back to back (commit, then trigger) so the
//! engine finds its next job already staged, and every later context waits
//! for the slot its predecessor frees.

use crate::backend::RegisterFile;
use crate::config::{DriverConfig, PollPolicy};
use crate::error::Result;
use crate::interface::EngineRegisters;
use crate::job::Job;
use crate::wait::{WaitCondition, WaitStrategy};
use ita_chip::regs::ctrl;
use ita_chip::Reg;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Summary of one [`JobQueue::configure_and_run`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunReport {
    /// Contexts programmed and handed to the engine
    pub contexts: usize,
    /// Slot acquisitions that had to wait for the engine
    pub slot_waits: usize,
    /// Status reads across all waits
    pub polls: u64,
    /// Wall time from reset to idle
    pub elapsed: Duration,
}

/// Controller for one engine's job queue.
///
/// Owns the register interface exclusively; a second controller on the same
/// engine would interleave context writes.
#[derive(Debug)]
pub struct JobQueue<R, W = PollPolicy> {
    regs: EngineRegisters<R>,
    wait: W,
    polls: u64,
    slot_waits: usize,
}

impl<R: RegisterFile> JobQueue<R> {
    /// Controller waiting according to `config.poll`.
    pub fn new(regs: R, config: &DriverConfig) -> Self {
        Self::with_wait(regs, config, config.poll)
    }
}

impl<R: RegisterFile, W: WaitStrategy> JobQueue<R, W> {
    /// Controller with an explicit wait strategy.
    pub fn with_wait(regs: R, config: &DriverConfig, wait: W) -> Self {
        Self {
            regs: EngineRegisters::new(regs, config),
            wait,
            polls: 0,
            slot_waits: 0,
        }
    }

    /// Block until the queue has at least one free slot.
    ///
    /// # Errors
    ///
    /// Returns [`ItaError::EngineTimeout`](crate::ItaError::EngineTimeout)
    /// from bounded strategies, or backend errors.
    pub fn acquire_slot(&mut self) -> Result<()> {
        let regs = &mut self.regs;
        let polls = self.wait.wait_until(WaitCondition::FreeSlot, || {
            Ok(regs.read(Reg::QueueFreeCount)? >= 1)
        })?;
        self.polls += polls;
        if polls > 1 {
            self.slot_waits += 1;
        }
        debug!("Acquired queue slot after {polls} polls");
        Ok(())
    }

    /// Stage the programmed context without starting the engine.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn commit(&mut self) -> Result<()> {
        debug!("Commit");
        self.regs.write(Reg::CtrlTrigger, ctrl::COMMIT)
    }

    /// Stage the programmed context if needed and start the engine.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn trigger(&mut self) -> Result<()> {
        debug!("Trigger");
        self.regs.write(Reg::CtrlTrigger, ctrl::TRIGGER)
    }

    /// Block until no job is executing.
    ///
    /// # Errors
    ///
    /// Returns [`ItaError::EngineTimeout`](crate::ItaError::EngineTimeout)
    /// from bounded strategies, or backend errors.
    pub fn wait_idle(&mut self) -> Result<()> {
        let regs = &mut self.regs;
        let polls = self
            .wait
            .wait_until(WaitCondition::Idle, || Ok(regs.read(Reg::Busy)? == 0))?;
        self.polls += polls;
        debug!("Engine idle after {polls} polls");
        Ok(())
    }

    /// Current free-slot count. Counts as a status poll.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn free_slots(&mut self) -> Result<u32> {
        self.regs.read(Reg::QueueFreeCount)
    }

    /// Whether a job is executing. Counts as a status poll.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn is_busy(&mut self) -> Result<bool> {
        Ok(self.regs.read(Reg::Busy)? != 0)
    }

    /// Reset the engine, then run `jobs` in order through the queue and
    /// wait for the last one to finish.
    ///
    /// An empty slice touches nothing. On error the engine may hold
    /// partially programmed or queued contexts; reset before reuse.
    ///
    /// # Errors
    ///
    /// Returns the first error from programming, waiting or the backend.
    pub fn configure_and_run(&mut self, jobs: &[Job]) -> Result<RunReport> {
        if jobs.is_empty() {
            return Ok(RunReport::default());
        }

        info!("Running {} context(s)", jobs.len());
        let start = Instant::now();
        self.polls = 0;
        self.slot_waits = 0;

        self.regs.soft_reset()?;
        self.acquire_slot()?;
        self.regs.program(&jobs[0])?;

        if let Some(second) = jobs.get(1) {
            self.commit()?;
            // The second slot is free: one staged context, nothing running.
            self.regs.program(second)?;
        }
        self.trigger()?;

        for job in jobs.iter().skip(2) {
            self.acquire_slot()?;
            self.regs.program(job)?;
            self.trigger()?;
        }

        self.wait_idle()?;

        let report = RunReport {
            contexts: jobs.len(),
            slot_waits: self.slot_waits,
            polls: self.polls,
            elapsed: start.elapsed(),
        };
        info!(
            "Ran {} context(s) in {:?} ({} polls, {} slot waits)",
            report.contexts, report.elapsed, report.polls, report.slot_waits
        );
        Ok(report)
    }

    /// Register interface, for raw programming and resets.
    pub fn registers(&mut self) -> &mut EngineRegisters<R> {
        &mut self.regs
    }

    /// Underlying register file.
    pub const fn backend(&self) -> &R {
        self.regs.inner()
    }

    /// Release the register file.
    pub fn into_inner(self) -> R {
        self.regs.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SimulatedEngine;
    use crate::job::{EngineConfig, JobAddresses, RequantParams};
    use crate::wait::BoundedPoll;
    use crate::ItaError;
    use ita_chip::{Activation, JobFlags, Layer, LayerSelect, TileShape};

    fn job(n: u32) -> Job {
        let base = 0x1000_0000 + n * 0x100;
        Job::new(
            EngineConfig {
                addresses: JobAddresses {
                    input: base,
                    weight: base + 0x10,
                    weight_next: base + 0x20,
                    bias: base + 0x30,
                    output: base + 0x40,
                },
                tiles: TileShape::new(1, 1, 1).unwrap(),
                layer: LayerSelect::new(Layer::Attention, Activation::Identity),
                flags: JobFlags::empty(),
            },
            RequantParams::default(),
        )
    }

    fn queue(latency: u32) -> JobQueue<SimulatedEngine> {
        JobQueue::new(SimulatedEngine::new(latency), &DriverConfig::default())
    }

    #[test]
    fn empty_run_touches_nothing() {
        let mut q = queue(1);
        let report = q.configure_and_run(&[]).unwrap();
        assert_eq!(report.contexts, 0);
        assert!(q.backend().writes().is_empty());
        assert_eq!(q.backend().resets(), 0);
    }

    #[test]
    fn single_context_triggers_without_commit() {
        let mut q = queue(3);
        q.configure_and_run(&[job(0)]).unwrap();
        let ctrl: Vec<u32> = q
            .backend()
            .writes()
            .iter()
            .filter(|(r, _)| *r == Reg::CtrlTrigger)
            .map(|(_, v)| *v)
            .collect();
        assert_eq!(ctrl, [ctrl::TRIGGER]);
        assert_eq!(q.backend().completed().len(), 1);
    }

    #[test]
    fn pipelined_sequence_of_control_writes() {
        let mut q = queue(4);
        let report = q.configure_and_run(&[job(0), job(1), job(2), job(3)]).unwrap();
        let ctrl: Vec<u32> = q
            .backend()
            .writes()
            .iter()
            .filter(|(r, _)| *r == Reg::CtrlTrigger)
            .map(|(_, v)| *v)
            .collect();
        assert_eq!(
            ctrl,
            [ctrl::COMMIT, ctrl::TRIGGER, ctrl::TRIGGER, ctrl::TRIGGER]
        );
        assert_eq!(report.contexts, 4);
        assert_eq!(report.slot_waits, 2);
        assert_eq!(q.backend().completed().len(), 4);
        assert_eq!(q.backend().max_in_flight(), 2);
    }

    #[test]
    fn acquire_after_reset_is_immediate() {
        let mut q = JobQueue::with_wait(
            SimulatedEngine::new(1),
            &DriverConfig::default(),
            BoundedPoll::polls(1),
        );
        q.registers().soft_reset().unwrap();
        q.acquire_slot().unwrap();
        assert_eq!(q.backend().polls(), 1);
    }

    #[test]
    fn stalled_engine_times_out() {
        let mut q = JobQueue::with_wait(
            SimulatedEngine::new(1).stalled(),
            &DriverConfig::default(),
            BoundedPoll::polls(50),
        );
        let err = q.configure_and_run(&[job(0), job(1), job(2)]).unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(
            err,
            ItaError::EngineTimeout { condition: WaitCondition::FreeSlot, polls: 50, .. }
        ));
    }

    #[test]
    fn busy_and_free_slots_follow_engine() {
        let mut q = queue(2);
        assert_eq!(q.free_slots().unwrap(), 2);
        q.registers().program(&job(0)).unwrap();
        q.trigger().unwrap();
        assert!(q.is_busy().unwrap());
        q.wait_idle().unwrap();
        assert!(!q.is_busy().unwrap());
        assert_eq!(q.into_inner().completed().len(), 1);
    }
}
