//! Register map of the ITA HWPE control block.
//!
//! All registers are 32-bit, little-endian and must be accessed volatile.
//! Offsets are relative to the engine base address, except [`BUSY`] which
//! sits behind a separate base (the cluster's HWPE busy word).
//!
//! ```text
//! 0x00        CTRL_TRIGGER      W   0 = trigger/start, 1 = commit (stage only)
//! 0x04        QUEUE_FREE_COUNT  R   number of free queue slots
//! 0x14        SOFT_RESET        W   0 = full reset, 1 = reset keep config
//! 0x20..0x30  ADDR_*            W   job addresses, window-relative
//! 0x38        TILE_SHAPE        W   packed tile triple
//! 0x3C..0x50  REQUANT_*         W   requantization words
//! 0x54        LAYER_SELECT      W   packed layer + activation
//! 0x58        FLAGS             W   packed 5-bit flag set
//! (busy base) BUSY              R   0 = idle, nonzero = executing
//! ```

// ── Queue control ────────────────────────────────────────────────────────────

/// Control/trigger register. Write [`ctrl::TRIGGER`] or [`ctrl::COMMIT`].
pub const CTRL_TRIGGER: usize = 0x00;

/// Number of free job-queue slots (0..=[`QUEUE_CAPACITY`]).
pub const QUEUE_FREE_COUNT: usize = 0x04;

/// Soft reset trigger. Write [`reset::FULL`] or [`reset::KEEP_CONFIG`].
pub const SOFT_RESET: usize = 0x14;

// ── Job addresses ────────────────────────────────────────────────────────────

/// Input tensor address.
pub const ADDR_INPUT: usize = 0x20;
/// Weights for the current job.
pub const ADDR_WEIGHT: usize = 0x24;
/// Weights preloaded for the next job.
pub const ADDR_WEIGHT_NEXT: usize = 0x28;
/// Bias vector address.
pub const ADDR_BIAS: usize = 0x2C;
/// Output tensor address.
pub const ADDR_OUTPUT: usize = 0x30;

// ── Job shape and control words ──────────────────────────────────────────────

/// Packed tile triple, see [`crate::fields::pack_tiles`].
pub const TILE_SHAPE: usize = 0x38;

/// Requant multiplier lanes 0..4.
pub const REQUANT_EPS1: usize = 0x3C;
/// Requant multiplier lanes 4..6.
pub const REQUANT_EPS2: usize = 0x40;
/// Requant right-shift lanes 0..4.
pub const REQUANT_SHIFT1: usize = 0x44;
/// Requant right-shift lanes 4..6.
pub const REQUANT_SHIFT2: usize = 0x48;
/// Requant add lanes 0..4.
pub const REQUANT_ADD1: usize = 0x4C;
/// Requant add lanes 4..6.
pub const REQUANT_ADD2: usize = 0x50;

/// Packed layer and activation selector ("ctrl engine").
pub const LAYER_SELECT: usize = 0x54;

/// Packed flag set ("ctrl stream").
pub const FLAGS: usize = 0x58;

/// Size of the engine register block in bytes (last register + 4).
pub const BLOCK_SIZE: usize = FLAGS + 4;

/// Busy word, offset 0 in its own region.
pub const BUSY: usize = 0x00;

/// Size of the busy region in bytes.
pub const BUSY_BLOCK_SIZE: usize = 4;

/// Job queue depth: one executing context plus one staged.
pub const QUEUE_CAPACITY: u32 = 2;

/// No-op iterations firmware spins after a soft reset.
pub const RESET_SETTLE_CYCLES: u32 = 10;

/// Values written to [`CTRL_TRIGGER`].
pub mod ctrl {
    /// Start the queue head, or advance to the staged context.
    pub const TRIGGER: u32 = 0;
    /// Stage the programmed configuration without starting.
    pub const COMMIT: u32 = 1;
}

/// Values written to [`SOFT_RESET`].
pub mod reset {
    /// Clear execution state and all programmed registers.
    pub const FULL: u32 = 0;
    /// Clear execution state, retain programmed registers.
    pub const KEEP_CONFIG: u32 = 1;
}

/// Which mapped region a register lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Block {
    /// Engine control block.
    Engine,
    /// Separate busy-status word.
    Busy,
}

/// Every register of the engine, in map order.
///
/// Variants are named after the map entries; see [`Reg::name`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reg {
    CtrlTrigger,
    QueueFreeCount,
    SoftReset,
    AddrInput,
    AddrWeight,
    AddrWeightNext,
    AddrBias,
    AddrOutput,
    TileShape,
    RequantEps1,
    RequantEps2,
    RequantShift1,
    RequantShift2,
    RequantAdd1,
    RequantAdd2,
    LayerSelect,
    Flags,
    Busy,
}

impl Reg {
    /// All registers in map order.
    pub const ALL: [Self; 18] = [
        Self::CtrlTrigger,
        Self::QueueFreeCount,
        Self::SoftReset,
        Self::AddrInput,
        Self::AddrWeight,
        Self::AddrWeightNext,
        Self::AddrBias,
        Self::AddrOutput,
        Self::TileShape,
        Self::RequantEps1,
        Self::RequantEps2,
        Self::RequantShift1,
        Self::RequantShift2,
        Self::RequantAdd1,
        Self::RequantAdd2,
        Self::LayerSelect,
        Self::Flags,
        Self::Busy,
    ];

    /// Registers that make up one job context, as captured at commit time.
    pub const CONTEXT: [Self; 14] = [
        Self::AddrInput,
        Self::AddrWeight,
        Self::AddrWeightNext,
        Self::AddrBias,
        Self::AddrOutput,
        Self::TileShape,
        Self::RequantEps1,
        Self::RequantEps2,
        Self::RequantShift1,
        Self::RequantShift2,
        Self::RequantAdd1,
        Self::RequantAdd2,
        Self::LayerSelect,
        Self::Flags,
    ];

    /// Byte offset inside the register's [`Block`].
    #[must_use]
    pub const fn offset(self) -> usize {
        match self {
            Self::CtrlTrigger => CTRL_TRIGGER,
            Self::QueueFreeCount => QUEUE_FREE_COUNT,
            Self::SoftReset => SOFT_RESET,
            Self::AddrInput => ADDR_INPUT,
            Self::AddrWeight => ADDR_WEIGHT,
            Self::AddrWeightNext => ADDR_WEIGHT_NEXT,
            Self::AddrBias => ADDR_BIAS,
            Self::AddrOutput => ADDR_OUTPUT,
            Self::TileShape => TILE_SHAPE,
            Self::RequantEps1 => REQUANT_EPS1,
            Self::RequantEps2 => REQUANT_EPS2,
            Self::RequantShift1 => REQUANT_SHIFT1,
            Self::RequantShift2 => REQUANT_SHIFT2,
            Self::RequantAdd1 => REQUANT_ADD1,
            Self::RequantAdd2 => REQUANT_ADD2,
            Self::LayerSelect => LAYER_SELECT,
            Self::Flags => FLAGS,
            Self::Busy => BUSY,
        }
    }

    /// Region the register is mapped in.
    #[must_use]
    pub const fn block(self) -> Block {
        match self {
            Self::Busy => Block::Busy,
            _ => Block::Engine,
        }
    }

    /// Whether software reads this register (status) rather than writes it.
    #[must_use]
    pub const fn is_status(self) -> bool {
        matches!(self, Self::QueueFreeCount | Self::Busy)
    }

    /// Index into [`Reg::CONTEXT`], if the register belongs to a job context.
    #[must_use]
    pub const fn context_index(self) -> Option<usize> {
        match self {
            Self::AddrInput => Some(0),
            Self::AddrWeight => Some(1),
            Self::AddrWeightNext => Some(2),
            Self::AddrBias => Some(3),
            Self::AddrOutput => Some(4),
            Self::TileShape => Some(5),
            Self::RequantEps1 => Some(6),
            Self::RequantEps2 => Some(7),
            Self::RequantShift1 => Some(8),
            Self::RequantShift2 => Some(9),
            Self::RequantAdd1 => Some(10),
            Self::RequantAdd2 => Some(11),
            Self::LayerSelect => Some(12),
            Self::Flags => Some(13),
            _ => None,
        }
    }

    /// Upper-case register name as it appears in the map.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CtrlTrigger => "CTRL_TRIGGER",
            Self::QueueFreeCount => "QUEUE_FREE_COUNT",
            Self::SoftReset => "SOFT_RESET",
            Self::AddrInput => "ADDR_INPUT",
            Self::AddrWeight => "ADDR_WEIGHT",
            Self::AddrWeightNext => "ADDR_WEIGHT_NEXT",
            Self::AddrBias => "ADDR_BIAS",
            Self::AddrOutput => "ADDR_OUTPUT",
            Self::TileShape => "TILE_SHAPE",
            Self::RequantEps1 => "REQUANT_EPS1",
            Self::RequantEps2 => "REQUANT_EPS2",
            Self::RequantShift1 => "REQUANT_SHIFT1",
            Self::RequantShift2 => "REQUANT_SHIFT2",
            Self::RequantAdd1 => "REQUANT_ADD1",
            Self::RequantAdd2 => "REQUANT_ADD2",
            Self::LayerSelect => "LAYER_SELECT",
            Self::Flags => "FLAGS",
            Self::Busy => "BUSY",
        }
    }
}

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{:#04x}", self.name(), self.offset())
    }
}
