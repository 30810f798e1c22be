//! Driver for the ITA integer transformer accelerator.
//!
//! Programs accelerator jobs through the engine's control/status registers
//! and drives its two-slot job queue.
//!
//! # Layers
//!
//! ```text
//! JobQueue          acquire_slot / commit / trigger / wait_idle, configure_and_run
//!   └─ EngineRegisters   write_job / write_requant / soft_reset, address window
//!        └─ RegisterFile      MmioRegisters (hardware) | SimulatedEngine (in memory)
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use ita_driver::prelude::*;
//!
//! # fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let config = DriverConfig::from_env()?;
//! let regs = open_backend(BackendSelection::Auto, &config)?;
//! let mut queue = JobQueue::new(regs, &config);
//!
//! let job = Job::new(
//!     EngineConfig {
//!         addresses: JobAddresses {
//!             input: 0x1000_0000,
//!             weight: 0x1000_1000,
//!             weight_next: 0x1000_2000,
//!             bias: 0x1000_3000,
//!             output: 0x1000_4000,
//!         },
//!         tiles: TileShape::new(1, 1, 1)?,
//!         layer: LayerSelect::new(Layer::Attention, Activation::Identity),
//!         flags: JobFlags::WEIGHT_PRELOAD,
//!     },
//!     RequantParams::default(),
//! );
//! let report = queue.configure_and_run(&[job])?;
//! println!("{} context(s) in {:?}", report.contexts, report.elapsed);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod backend;
pub mod backends;
mod config;
mod error;
mod interface;
mod job;
mod queue;
pub mod wait;

pub use backend::{open_backend, BackendSelection, BackendType, RegisterFile};
pub use backends::{ContextSnapshot, MmioRegisters, SimulatedEngine};
pub use config::{
    parse_number, DriverConfig, MmioConfig, PollPolicy, DEFAULT_SIMULATED_LATENCY,
    DEFAULT_WINDOW,
};
pub use error::{ItaError, Result};
pub use interface::EngineRegisters;
pub use job::{EngineConfig, Job, JobAddresses, RequantLanes, RequantParams};
pub use queue::{JobQueue, RunReport};
pub use wait::{BoundedPoll, BusyPoll, SleepPoll, WaitCondition, WaitStrategy};

/// Silicon model, re-exported so callers need a single dependency.
pub use ita_chip as chip;

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        open_backend, BackendSelection, DriverConfig, EngineConfig, ItaError, Job,
        JobAddresses, JobQueue, RegisterFile, RequantParams, Result, RunReport,
        SimulatedEngine,
    };
    pub use ita_chip::{Activation, JobFlags, Layer, LayerSelect, MemoryWindow, Reg, TileShape};
}
