//! # Memory Layout

/// Start of the shared region. Everything below is the private region.
pub const SHARED_REGION_BASE: u64 = 0xC000_0000;

/// First virtual address handed out for "assign me one" mappings.
pub const AUTO_MAP_BASE: u64 = 0xE000_0000;

/// End (exclusive) of the auto-assign window.
pub const AUTO_MAP_END: u64 = SELF_MAP_BASE;

/// Base of the permanently reserved window that maps the table pool.
///
/// Aligned to the largest block granule so that a single section (short
/// descriptors) or block (LPAE) covers the pool.
pub const SELF_MAP_BASE: u64 = 0xFFC0_0000;

/// Size of the reserved self-map window.
pub const SELF_MAP_SIZE: u64 = 0x0020_0000;

/// One past the highest 32-bit virtual address.
pub const VIRTUAL_ADDRESS_LIMIT: u64 = 1 << 32;

/// Widest physical address the short-descriptor format can encode.
pub const SHORT_DESCRIPTOR_PHYS_BITS: u8 = 32;

/// Widest physical address the long-descriptor (LPAE) format can encode.
pub const LPAE_PHYS_BITS: u8 = 40;

const _: () = {
    assert!(SHARED_REGION_BASE < AUTO_MAP_BASE);
    assert!(AUTO_MAP_BASE < AUTO_MAP_END);
    assert!(AUTO_MAP_END <= SELF_MAP_BASE);
    assert!(SELF_MAP_BASE.is_multiple_of(0x0020_0000));
    assert!(SELF_MAP_BASE + SELF_MAP_SIZE <= VIRTUAL_ADDRESS_LIMIT);
    assert!(AUTO_MAP_BASE.is_multiple_of(4096));
};
