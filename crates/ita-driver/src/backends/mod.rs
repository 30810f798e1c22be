//! Register file implementations
//!
//! Two backends available:
//! - **MMIO**: volatile accesses to the mapped engine block (hardware)
//! - **Software**: in-memory engine model with a two-slot queue (tests, bring-up)

pub mod mmap;
pub mod mmio;
pub mod software;

pub use mmio::MmioRegisters;
pub use software::{ContextSnapshot, SimulatedEngine};
