//! Bit-packed fields of the KLF200 API.
//!
//! Two composite fields show up in the frames this crate handles:
//!
//! - The 16-bit node type field: actuator type in bits 15..6, subtype in
//!   bits 5..0.
//! - The functional parameter indicator pair (FPI1, FPI2) of a command
//!   request: one bit per functional parameter FP1..FP16, most significant
//!   bit first (FP1 = FPI1 bit 7, FP8 = FPI1 bit 0, FP9 = FPI2 bit 7).

/// Shift of the actuator type inside the node type field.
pub const NODE_TYPE_SHIFT: u16 = 6;

/// Mask of the subtype inside the node type field.
pub const NODE_SUBTYPE_MASK: u16 = 0x003F;

/// Bit for FP1 inside FPI1 (and FP9 inside FPI2).
pub const FPI_FIRST_BIT: u8 = 0x80;

/// Splits a node type field into `(type, subtype)`.
pub fn node_type_split(raw: u16) -> (u16, u8) {
    (raw >> NODE_TYPE_SHIFT, (raw & NODE_SUBTYPE_MASK) as u8)
}

/// Joins an actuator type and subtype into the node type field.
pub fn node_type_join(node_type: u16, subtype: u8) -> u16 {
    (node_type << NODE_TYPE_SHIFT) | (u16::from(subtype) & NODE_SUBTYPE_MASK)
}

/// Byte index and mask of functional parameter `fp` (1..=16).
///
/// Returns `None` for the main parameter (0) and out-of-range indices.
pub fn fpi_position(fp: u8) -> Option<(usize, u8)> {
    if !(1..=16).contains(&fp) {
        return None;
    }
    let n = fp - 1;
    Some(((n / 8) as usize, FPI_FIRST_BIT >> (n % 8)))
}

/// Sets the indicator bit for functional parameter `fp`.
///
/// Index 0 (main parameter) needs no indicator and leaves `fpi` unchanged.
pub fn fpi_set(fpi: &mut [u8; 2], fp: u8) {
    if let Some((byte, mask)) = fpi_position(fp) {
        fpi[byte] |= mask;
    }
}

/// Whether the indicator bit for functional parameter `fp` is set.
pub fn fpi_is_set(fpi: [u8; 2], fp: u8) -> bool {
    fpi_position(fp).is_some_and(|(byte, mask)| fpi[byte] & mask != 0)
}

/// Builds the indicator pair for a set of functional parameters.
pub fn fpi_bits(fps: impl IntoIterator<Item = u8>) -> [u8; 2] {
    let mut fpi = [0u8; 2];
    for fp in fps {
        fpi_set(&mut fpi, fp);
    }
    fpi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_split_roller_shutter() {
        // Roller shutter (type 2), subtype 1.
        assert_eq!(node_type_split(0x0081), (2, 1));
    }

    #[test]
    fn node_type_split_subtype_bits() {
        for bit in 0..6 {
            let raw = 1u16 << bit;
            assert_eq!(node_type_split(raw), (0, 1 << bit), "subtype bit {bit}");
        }
    }

    #[test]
    fn node_type_split_type_bits() {
        for bit in 6..16 {
            let raw = 1u16 << bit;
            assert_eq!(node_type_split(raw), (1 << (bit - 6), 0), "type bit {bit}");
        }
    }

    #[test]
    fn node_type_join_masks_subtype() {
        assert_eq!(node_type_join(4, 0xFF), (4 << 6) | 0x3F);
        assert_eq!(node_type_join(4, 0x01), 0x0101);
    }

    #[test]
    fn fpi_each_bit_position() {
        for fp in 1..=16u8 {
            let fpi = fpi_bits([fp]);
            let expected_byte = ((fp - 1) / 8) as usize;
            let expected_mask = 0x80u8 >> ((fp - 1) % 8);
            assert_eq!(fpi[expected_byte], expected_mask, "FP{fp}");
            assert_eq!(fpi[1 - expected_byte], 0, "FP{fp} leaked into other byte");
            assert!(fpi_is_set(fpi, fp));
            for other in (1..=16u8).filter(|&o| o != fp) {
                assert!(!fpi_is_set(fpi, other), "FP{other} set by FP{fp}");
            }
        }
    }

    #[test]
    fn fpi_main_parameter_has_no_bit() {
        assert_eq!(fpi_bits([0]), [0, 0]);
        assert_eq!(fpi_position(0), None);
        assert!(!fpi_is_set([0xFF, 0xFF], 0));
    }

    #[test]
    fn fpi_out_of_range_ignored() {
        assert_eq!(fpi_bits([17, 200]), [0, 0]);
    }

    #[test]
    fn fpi_combined() {
        assert_eq!(fpi_bits([1, 8, 9, 16]), [0x81, 0x81]);
        assert_eq!(fpi_bits([3, 3]), [0x20, 0x00]);
    }
}
