//! Accelerator-addressable memory window.
//!
//! The engine sees memory through a window (the cluster TCDM). Job addresses
//! are programmed as offsets from the window base:
//!
//! ```text
//! register value = absolute address - window base     (mod 2^32)
//! ```
//!
//! Translation is a wrapping subtraction and is never clamped. An address
//! outside the window produces an offset the engine will happily follow into
//! the wrong memory; [`MemoryWindow::contains`] is how callers check first.

/// Base and size of the memory the engine can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryWindow {
    base: u32,
    size: u32,
}

impl MemoryWindow {
    /// Describe a window of `size` bytes starting at `base`.
    #[must_use]
    pub const fn new(base: u32, size: u32) -> Self {
        Self { base, size }
    }

    /// Window base address.
    #[must_use]
    pub const fn base(&self) -> u32 {
        self.base
    }

    /// Window size in bytes.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// First address past the window, saturating at the top of the space.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base as u64 + self.size as u64
    }

    /// Whether `addr` lies inside the window.
    #[must_use]
    pub const fn contains(&self, addr: u32) -> bool {
        addr >= self.base && (addr as u64) < self.end()
    }

    /// Window-relative offset of `addr`, bit-exact (`addr - base` mod 2^32).
    #[must_use]
    pub const fn relative(&self, addr: u32) -> u32 {
        addr.wrapping_sub(self.base)
    }

    /// Absolute address of a window-relative offset.
    #[must_use]
    pub const fn absolute(&self, offset: u32) -> u32 {
        self.base.wrapping_add(offset)
    }
}

impl std::fmt::Display for MemoryWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:#010x}, {:#010x})", self.base, self.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TCDM: MemoryWindow = MemoryWindow::new(0x1000_0000, 0x2_0000);

    #[test]
    fn inside_addresses_translate_to_offsets() {
        assert!(TCDM.contains(0x1000_0000));
        assert!(TCDM.contains(0x1001_FFFF));
        assert_eq!(TCDM.relative(0x1000_4100), 0x4100);
        assert_eq!(TCDM.absolute(0x4100), 0x1000_4100);
    }

    #[test]
    fn outside_addresses_wrap_instead_of_clamping() {
        assert!(!TCDM.contains(0x0FFF_FFF0));
        assert!(!TCDM.contains(0x1002_0000));
        assert_eq!(TCDM.relative(0x0FFF_FFF0), 0xFFFF_FFF0);
        assert_eq!(TCDM.relative(0x1002_0000), 0x2_0000);
    }

    #[test]
    fn window_at_top_of_space() {
        let top = MemoryWindow::new(0xFFFF_0000, 0x1_0000);
        assert!(top.contains(u32::MAX));
        assert_eq!(top.end(), 1_u64 << 32);
        assert_eq!(top.to_string(), "[0xffff0000, 0x100000000)");
    }
}
