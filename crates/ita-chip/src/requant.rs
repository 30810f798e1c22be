//! Requantization register words.
//!
//! The engine applies `out = ((acc * mult) >> shift) + add` per output step,
//! with six 8-bit lanes for each coefficient. Each coefficient occupies two
//! registers holding its lanes little-endian:
//!
//! ```text
//! EPS1   = m0 | m1 << 8 | m2 << 16 | m3 << 24      EPS2   = m4 | m5 << 8
//! SHIFT1 = s0 | s1 << 8 | s2 << 16 | s3 << 24      SHIFT2 = s4 | s5 << 8
//! ADD1   = a0 | a1 << 8 | a2 << 16 | a3 << 24      ADD2   = a4 | a5 << 8
//! ```

/// Number of requantization lanes per coefficient.
pub const LANES: usize = 6;

/// Pack six byte lanes into the `(low, high)` register pair.
#[must_use]
pub const fn pack_lanes(lanes: [u8; LANES]) -> (u32, u32) {
    let low = u32::from_le_bytes([lanes[0], lanes[1], lanes[2], lanes[3]]);
    let high = u32::from_le_bytes([lanes[4], lanes[5], 0, 0]);
    (low, high)
}

/// Recover six byte lanes from a register pair. Bits above lane 5 in `high`
/// are ignored.
#[must_use]
pub const fn unpack_lanes(low: u32, high: u32) -> [u8; LANES] {
    let l = low.to_le_bytes();
    let h = high.to_le_bytes();
    [l[0], l[1], l[2], l[3], h[0], h[1]]
}

#[cfg(test)]
mod tests {
    use super::*;

    // Words the reference firmware programs for its three contexts.
    #[test]
    fn reference_firmware_words() {
        assert_eq!(pack_lanes([101, 102, 103, 104, 105, 106]), (1_751_606_885, 27_241));
        assert_eq!(pack_lanes([211, 212, 213, 214, 215, 216]), (3_604_337_875, 55_511));
        assert_eq!(pack_lanes([1, 2, 3, 4, 5, 6]), (67_305_985, 1_541));
        assert_eq!(pack_lanes([21, 22, 23, 24, 25, 26]), (404_166_165, 6_681));
    }

    #[test]
    fn unpack_inverts_pack() {
        let lanes = [0, 255, 7, 128, 64, 1];
        let (lo, hi) = pack_lanes(lanes);
        assert_eq!(unpack_lanes(lo, hi), lanes);
        assert_eq!(unpack_lanes(lo, hi | 0xFFFF_0000), lanes);
    }
}
