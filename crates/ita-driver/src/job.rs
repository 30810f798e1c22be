//! Job descriptors: what one engine context is made of.
//!
//! A [`Job`] pairs an [`EngineConfig`] (addresses, tile shape, layer,
//! flags) with its [`RequantParams`]. Both are plain values built right
//! before they are written; once written the hardware owns the context.

use ita_chip::requant::{pack_lanes, unpack_lanes, LANES};
use ita_chip::{JobFlags, LayerSelect, Reg, TileShape};

/// The five absolute addresses of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobAddresses {
    /// Input tensor
    pub input: u32,
    /// Weights for this job
    pub weight: u32,
    /// Weights for the following job
    pub weight_next: u32,
    /// Bias vector
    pub bias: u32,
    /// Output tensor
    pub output: u32,
}

impl JobAddresses {
    /// Addresses paired with their registers, in programming order.
    #[must_use]
    pub const fn registers(&self) -> [(Reg, u32); 5] {
        [
            (Reg::AddrInput, self.input),
            (Reg::AddrWeight, self.weight),
            (Reg::AddrWeightNext, self.weight_next),
            (Reg::AddrBias, self.bias),
            (Reg::AddrOutput, self.output),
        ]
    }

    /// Every address moved by `delta` bytes.
    #[must_use]
    pub const fn offset_by(&self, delta: u32) -> Self {
        Self {
            input: self.input.wrapping_add(delta),
            weight: self.weight.wrapping_add(delta),
            weight_next: self.weight_next.wrapping_add(delta),
            bias: self.bias.wrapping_add(delta),
            output: self.output.wrapping_add(delta),
        }
    }
}

/// Configuration of one accelerator job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Absolute buffer addresses
    pub addresses: JobAddresses,
    /// Tile counts
    pub tiles: TileShape,
    /// Layer and activation
    pub layer: LayerSelect,
    /// Stream control flags
    pub flags: JobFlags,
}

/// Requantization coefficients of one job, as register words.
///
/// Each coefficient is six 8-bit lanes split over a `(1, 2)` register pair,
/// see [`ita_chip::requant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequantParams {
    /// Multiplier lanes 0..4
    pub eps1: u32,
    /// Multiplier lanes 4..6
    pub eps2: u32,
    /// Right-shift lanes 0..4
    pub shift1: u32,
    /// Right-shift lanes 4..6
    pub shift2: u32,
    /// Add lanes 0..4
    pub add1: u32,
    /// Add lanes 4..6
    pub add2: u32,
}

/// Per-lane view of [`RequantParams`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequantLanes {
    /// Multipliers
    pub mult: [u8; LANES],
    /// Right shifts
    pub shift: [u8; LANES],
    /// Additive offsets
    pub add: [u8; LANES],
}

impl RequantParams {
    /// Pack per-lane coefficients into register words.
    #[must_use]
    pub const fn from_lanes(mult: [u8; LANES], shift: [u8; LANES], add: [u8; LANES]) -> Self {
        let (eps1, eps2) = pack_lanes(mult);
        let (shift1, shift2) = pack_lanes(shift);
        let (add1, add2) = pack_lanes(add);
        Self {
            eps1,
            eps2,
            shift1,
            shift2,
            add1,
            add2,
        }
    }

    /// Unpack the register words into lanes.
    #[must_use]
    pub const fn lanes(&self) -> RequantLanes {
        RequantLanes {
            mult: unpack_lanes(self.eps1, self.eps2),
            shift: unpack_lanes(self.shift1, self.shift2),
            add: unpack_lanes(self.add1, self.add2),
        }
    }

    /// Words paired with their registers, in programming order.
    #[must_use]
    pub const fn registers(&self) -> [(Reg, u32); 6] {
        [
            (Reg::RequantEps1, self.eps1),
            (Reg::RequantEps2, self.eps2),
            (Reg::RequantShift1, self.shift1),
            (Reg::RequantShift2, self.shift2),
            (Reg::RequantAdd1, self.add1),
            (Reg::RequantAdd2, self.add2),
        ]
    }
}

/// One context: configuration plus the requantization it runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    /// Engine configuration
    pub config: EngineConfig,
    /// Requantization words, programmed before the configuration
    pub requant: RequantParams,
}

impl Job {
    /// Pair a configuration with its requantization.
    #[must_use]
    pub const fn new(config: EngineConfig, requant: RequantParams) -> Self {
        Self { config, requant }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lanes_survive_packing() {
        let rq = RequantParams::from_lanes(
            [101, 102, 103, 104, 105, 106],
            [211, 212, 213, 214, 215, 216],
            [1, 2, 3, 4, 5, 6],
        );
        assert_eq!(rq.eps1, 1_751_606_885);
        assert_eq!(rq.eps2, 27_241);
        assert_eq!(rq.shift1, 3_604_337_875);
        assert_eq!(rq.add2, 1_541);
        let lanes = rq.lanes();
        assert_eq!(lanes.mult, [101, 102, 103, 104, 105, 106]);
        assert_eq!(lanes.add, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn address_registers_in_map_order() {
        let a = JobAddresses {
            input: 0x10,
            weight: 0x20,
            weight_next: 0x30,
            bias: 0x40,
            output: 0x50,
        };
        let regs: Vec<Reg> = a.registers().iter().map(|(r, _)| *r).collect();
        assert_eq!(&regs[..], &Reg::CONTEXT[..5]);
        assert_eq!(a.offset_by(0x100).bias, 0x140);
    }
}
