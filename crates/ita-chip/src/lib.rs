//! Silicon model of the ITA integer transformer accelerator.
//!
//! No hardware access and no `unsafe`: this crate describes the engine's
//! register block, the bit layout of its packed control words, the memory
//! window job addresses are relative to, and the lane packing of the
//! requantization registers.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`regs`] | Register offsets, command values, queue depth |
//! | [`fields`] | Tile / layer / flag bitfields, raw and checked packers |
//! | [`window`] | Memory window and address translation |
//! | [`requant`] | Six-lane requant word packing |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod fields;
pub mod regs;
pub mod requant;
pub mod window;

pub use fields::{Activation, FieldError, JobFlags, Layer, LayerSelect, TileShape};
pub use regs::{Block, Reg};
pub use window::MemoryWindow;
