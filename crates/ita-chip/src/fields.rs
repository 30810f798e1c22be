//! Bitfield layouts of the packed control words.
//!
//! Three registers carry more than one field:
//!
//! ```text
//! TILE_SHAPE    [31:8] proj   [7:4] emb   [3:0] seq
//! LAYER_SELECT               [3:2] activation   [1:0] layer
//! FLAGS         [4] output_disable  [3] bias_direction  [2] bias_disable
//!               [1] weight_nextload [0] weight_preload
//! ```
//!
//! The free functions [`pack_tiles`], [`pack_layer`] and [`pack_flags`]
//! reproduce the firmware macros bit for bit and do **not** range-check:
//! an oversized value spills into the neighbouring field. The typed
//! wrappers ([`TileShape`], [`LayerSelect`], [`JobFlags`]) check every field
//! against its [`Field`] width before packing.

use bitflags::bitflags;
use thiserror::Error;

/// Errors raised when a value does not fit its field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// Value exceeds the field width.
    #[error("{field} = {value} does not fit in {width} bits")]
    OutOfRange {
        /// Field name
        field: &'static str,
        /// Offending value
        value: u32,
        /// Field width in bits
        width: u32,
    },

    /// Value fits the width but names no variant.
    #[error("{field} = {value} is not a valid encoding")]
    InvalidEncoding {
        /// Field name
        field: &'static str,
        /// Offending value
        value: u32,
    },
}

/// Position of one field inside a 32-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Field name, used in errors.
    pub name: &'static str,
    /// Bit offset of the least significant bit.
    pub offset: u32,
    /// Width in bits.
    pub width: u32,
}

impl Field {
    /// Describe a field. Panics at compile time when used in a `const` and
    /// the field does not fit a 32-bit word.
    #[must_use]
    pub const fn new(name: &'static str, offset: u32, width: u32) -> Self {
        assert!(width > 0 && offset + width <= 32, "field exceeds register");
        Self { name, offset, width }
    }

    /// Largest value the field can hold.
    #[must_use]
    pub const fn max(&self) -> u32 {
        if self.width == 32 {
            u32::MAX
        } else {
            (1 << self.width) - 1
        }
    }

    /// Mask of the field's bits inside the register.
    #[must_use]
    pub const fn mask(&self) -> u32 {
        self.max() << self.offset
    }

    /// Whether `value` fits without spilling.
    #[must_use]
    pub const fn fits(&self, value: u32) -> bool {
        value <= self.max()
    }

    /// Shift `value` into place after checking the width.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::OutOfRange`] if `value` is wider than the field.
    pub const fn place(&self, value: u32) -> Result<u32, FieldError> {
        if self.fits(value) {
            Ok(value << self.offset)
        } else {
            Err(FieldError::OutOfRange {
                field: self.name,
                value,
                width: self.width,
            })
        }
    }

    /// Extract the field from a register word.
    #[must_use]
    pub const fn extract(&self, word: u32) -> u32 {
        (word & self.mask()) >> self.offset
    }

    const fn overlaps(&self, other: &Self) -> bool {
        self.mask() & other.mask() != 0
    }
}

/// Sequence tile count.
pub const TILE_SEQ: Field = Field::new("tile.seq", 0, 4);
/// Embedding tile count.
pub const TILE_EMB: Field = Field::new("tile.emb", 4, 4);
/// Projection tile count. The firmware never bounds it; it owns the rest of
/// the word.
pub const TILE_PROJ: Field = Field::new("tile.proj", 8, 24);

/// Layer type selector.
pub const LAYER_TYPE: Field = Field::new("layer.type", 0, 2);
/// Activation selector.
pub const LAYER_ACTIVATION: Field = Field::new("layer.activation", 2, 2);

const _: () = assert!(!TILE_SEQ.overlaps(&TILE_EMB));
const _: () = assert!(!TILE_EMB.overlaps(&TILE_PROJ));
const _: () = assert!(!TILE_SEQ.overlaps(&TILE_PROJ));
const _: () = assert!(!LAYER_TYPE.overlaps(&LAYER_ACTIVATION));

/// `seq | emb << 4 | proj << 8`, unchecked.
#[must_use]
pub const fn pack_tiles(seq: u32, emb: u32, proj: u32) -> u32 {
    seq | (emb << TILE_EMB.offset) | (proj << TILE_PROJ.offset)
}

/// Split a tile word into `(seq, emb, proj)`.
#[must_use]
pub const fn unpack_tiles(word: u32) -> (u32, u32, u32) {
    (
        TILE_SEQ.extract(word),
        TILE_EMB.extract(word),
        TILE_PROJ.extract(word),
    )
}

/// `layer | activation << 2`, unchecked.
#[must_use]
pub const fn pack_layer(layer: u32, activation: u32) -> u32 {
    layer | (activation << LAYER_ACTIVATION.offset)
}

/// Flags in bit order 0..4, unchecked: callers must pass 0 or 1.
#[must_use]
pub const fn pack_flags(
    weight_preload: u32,
    weight_nextload: u32,
    bias_disable: u32,
    bias_direction: u32,
    output_disable: u32,
) -> u32 {
    weight_preload
        | (weight_nextload << 1)
        | (bias_disable << 2)
        | (bias_direction << 3)
        | (output_disable << 4)
}

// ── Typed words ──────────────────────────────────────────────────────────────

/// Tile counts of one job, range-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileShape {
    seq: u32,
    emb: u32,
    proj: u32,
}

impl TileShape {
    /// Build a tile shape.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::OutOfRange`] if any count exceeds its field.
    pub const fn new(seq: u32, emb: u32, proj: u32) -> Result<Self, FieldError> {
        if let Err(e) = TILE_SEQ.place(seq) {
            return Err(e);
        }
        if let Err(e) = TILE_EMB.place(emb) {
            return Err(e);
        }
        if let Err(e) = TILE_PROJ.place(proj) {
            return Err(e);
        }
        Ok(Self { seq, emb, proj })
    }

    /// Decode a packed word. Every 32-bit word decodes to some shape.
    #[must_use]
    pub const fn from_word(word: u32) -> Self {
        let (seq, emb, proj) = unpack_tiles(word);
        Self { seq, emb, proj }
    }

    /// Packed register value.
    #[must_use]
    pub const fn word(&self) -> u32 {
        pack_tiles(self.seq, self.emb, self.proj)
    }

    /// Sequence tiles.
    #[must_use]
    pub const fn seq(&self) -> u32 {
        self.seq
    }

    /// Embedding tiles.
    #[must_use]
    pub const fn emb(&self) -> u32 {
        self.emb
    }

    /// Projection tiles.
    #[must_use]
    pub const fn proj(&self) -> u32 {
        self.proj
    }
}

/// Layer kind executed by a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Layer {
    /// Multi-head attention.
    Attention = 0,
    /// Feed-forward block.
    Feedforward = 1,
    /// Plain linear layer.
    Linear = 2,
}

impl TryFrom<u32> for Layer {
    type Error = FieldError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Attention),
            1 => Ok(Self::Feedforward),
            2 => Ok(Self::Linear),
            _ => Err(FieldError::InvalidEncoding {
                field: LAYER_TYPE.name,
                value,
            }),
        }
    }
}

/// Activation applied to the layer output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum Activation {
    /// No activation.
    #[default]
    Identity = 0,
    /// GELU.
    Gelu = 1,
    /// ReLU.
    Relu = 2,
}

impl TryFrom<u32> for Activation {
    type Error = FieldError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Identity),
            1 => Ok(Self::Gelu),
            2 => Ok(Self::Relu),
            _ => Err(FieldError::InvalidEncoding {
                field: LAYER_ACTIVATION.name,
                value,
            }),
        }
    }
}

/// Layer plus activation, the content of `LAYER_SELECT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerSelect {
    /// Layer kind.
    pub layer: Layer,
    /// Activation.
    pub activation: Activation,
}

impl LayerSelect {
    /// Combine a layer with an activation.
    #[must_use]
    pub const fn new(layer: Layer, activation: Activation) -> Self {
        Self { layer, activation }
    }

    /// Packed register value.
    #[must_use]
    pub const fn word(&self) -> u32 {
        pack_layer(self.layer as u32, self.activation as u32)
    }
}

impl TryFrom<u32> for LayerSelect {
    type Error = FieldError;

    fn try_from(word: u32) -> Result<Self, Self::Error> {
        let unused = !(LAYER_TYPE.mask() | LAYER_ACTIVATION.mask());
        if word & unused != 0 {
            return Err(FieldError::InvalidEncoding {
                field: "layer",
                value: word,
            });
        }
        Ok(Self {
            layer: Layer::try_from(LAYER_TYPE.extract(word))?,
            activation: Activation::try_from(LAYER_ACTIVATION.extract(word))?,
        })
    }
}

bitflags! {
    /// Stream control flags, the content of `FLAGS`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct JobFlags: u32 {
        /// Load this job's weights before starting.
        const WEIGHT_PRELOAD  = 1 << 0;
        /// Prefetch the next job's weights while running.
        const WEIGHT_NEXTLOAD = 1 << 1;
        /// Skip the bias add.
        const BIAS_DISABLE    = 1 << 2;
        /// Apply bias along the other axis.
        const BIAS_DIRECTION  = 1 << 3;
        /// Suppress the output write-back.
        const OUTPUT_DISABLE  = 1 << 4;
    }
}

impl JobFlags {
    /// Build from the five booleans in register bit order.
    #[must_use]
    pub fn from_bools(
        weight_preload: bool,
        weight_nextload: bool,
        bias_disable: bool,
        bias_direction: bool,
        output_disable: bool,
    ) -> Self {
        Self::from_bits_retain(pack_flags(
            u32::from(weight_preload),
            u32::from(weight_nextload),
            u32::from(bias_disable),
            u32::from(bias_direction),
            u32::from(output_disable),
        ))
    }

    /// Decode a register word, rejecting bits above bit 4.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::InvalidEncoding`] if undefined bits are set.
    pub fn from_word(word: u32) -> Result<Self, FieldError> {
        Self::from_bits(word).ok_or(FieldError::InvalidEncoding {
            field: "flags",
            value: word,
        })
    }

    /// Packed register value.
    #[must_use]
    pub const fn word(&self) -> u32 {
        self.bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firmware_macro_values() {
        assert_eq!(pack_tiles(1, 1, 1), 0x111);
        assert_eq!(pack_layer(Layer::Attention as u32, Activation::Identity as u32), 0);
        assert_eq!(pack_layer(2, 1), 0b0110);
        assert_eq!(pack_flags(1, 1, 0, 0, 0), 0b00011);
        assert_eq!(pack_flags(0, 1, 0, 0, 0), 0b00010);
        assert_eq!(pack_flags(0, 0, 0, 0, 1), 0b10000);
    }

    #[test]
    fn tiles_round_trip_over_full_seq_emb_range() {
        for seq in 0..16 {
            for emb in 0..16 {
                for proj in [0, 1, 15, 16, 255, TILE_PROJ.max()] {
                    let shape = TileShape::new(seq, emb, proj).unwrap();
                    assert_eq!(TileShape::from_word(shape.word()), shape);
                    assert_eq!(unpack_tiles(pack_tiles(seq, emb, proj)), (seq, emb, proj));
                }
            }
        }
    }

    #[test]
    fn oversized_tile_spills_into_neighbour_unchecked() {
        // emb = 16 lands in proj's lowest bit
        assert_eq!(pack_tiles(0, 16, 0), pack_tiles(0, 0, 1));
        assert_eq!(
            TileShape::new(0, 16, 0),
            Err(FieldError::OutOfRange { field: "tile.emb", value: 16, width: 4 })
        );
        assert!(TileShape::new(16, 0, 0).is_err());
    }

    #[test]
    fn layer_round_trip_all_variants() {
        let layers = [Layer::Attention, Layer::Feedforward, Layer::Linear];
        let acts = [Activation::Identity, Activation::Gelu, Activation::Relu];
        for layer in layers {
            for activation in acts {
                let sel = LayerSelect::new(layer, activation);
                assert_eq!(LayerSelect::try_from(sel.word()), Ok(sel));
            }
        }
    }

    #[test]
    fn layer_rejects_reserved_encodings() {
        assert!(LayerSelect::try_from(0b0011).is_err());
        assert!(LayerSelect::try_from(0b1100).is_err());
        assert!(LayerSelect::try_from(0b1_0000).is_err());
    }

    #[test]
    fn flags_round_trip_all_32_combinations() {
        for word in 0..32u32 {
            let flags = JobFlags::from_word(word).unwrap();
            let bit = |n: u32| word >> n & 1 == 1;
            assert_eq!(JobFlags::from_bools(bit(0), bit(1), bit(2), bit(3), bit(4)), flags);
            assert_eq!(flags.word(), word);
        }
        assert!(JobFlags::from_word(1 << 5).is_err());
    }

    #[test]
    fn field_metadata() {
        assert_eq!(TILE_SEQ.mask(), 0x0F);
        assert_eq!(TILE_EMB.mask(), 0xF0);
        assert_eq!(TILE_PROJ.mask(), 0xFFFF_FF00);
        assert_eq!(LAYER_ACTIVATION.mask(), 0b1100);
        assert!(TILE_SEQ.fits(15));
        assert!(!TILE_SEQ.fits(16));
    }
}
