//! # Entry Encoder
//!
//! A [`TableFormat`] is the stateless half of a translation format: the
//! geometry of each table level plus the pure encode/decode functions for
//! table pointers and leaf descriptors. The two implementations are
//! [`ShortDescriptor`] and [`LongDescriptor`].
//!
//! Nothing here branches on the format at run time. The mapper is generic
//! over `F: TableFormat` and is instantiated once per format, so the choice
//! is made when the scheme is constructed and never again.
//!
//! ## Address split
//!
//! ```text
//! short-descriptor           | 31‒20 L1 | 19‒12 L2 | 11‒0 offset |
//! long-descriptor  | 31‒30 L1 | 29‒21 L2 | 20‒12 L3 | 11‒0 offset |
//! ```

pub mod long;
pub mod short;

use crate::Protection;
use crate::format::TranslationFormat;
use crate::handoff::Handoff;
use core::fmt;
use kernel_memory_addresses::{PageSize, PhysicalAddress, VirtualAddress};

pub use long::LongDescriptor;
pub use short::ShortDescriptor;

/// Geometry of one table level.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Level {
    /// Bit position of the lowest virtual address bit indexing this level.
    pub shift: u32,
    /// Number of slots in a table of this level.
    pub entries: usize,
    /// Table size in bytes; tables are aligned to their size.
    pub table_bytes: u64,
}

impl Level {
    /// Slot index of `va` in a table of this level.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index(&self, va: VirtualAddress) -> usize {
        ((va.as_u64() >> self.shift) as usize) & (self.entries - 1)
    }

    /// Bytes of virtual address space covered by one slot.
    #[inline]
    #[must_use]
    pub const fn span(&self) -> u64 {
        1 << self.shift
    }
}

/// Decoded view of one table slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Slot {
    /// Faults on access.
    Invalid,
    /// Points to the next-level table at this physical address.
    Table(PhysicalAddress),
    /// Large leaf (section or block) at this physical base.
    Block(PhysicalAddress),
    /// 4 KiB leaf at this physical base.
    Page(PhysicalAddress),
}

/// Geometry and descriptor encoding of one translation format.
pub trait TableFormat: 'static {
    /// Storage of one descriptor (`u32` or `u64`).
    type Raw: Copy + Default + Eq + fmt::Debug + Into<u64>;

    /// Granule of the large leaf.
    type Block: PageSize;

    const FORMAT: TranslationFormat;

    /// Table levels from the root downward.
    const LEVELS: &'static [Level];

    /// Level whose slots may hold a large leaf.
    const BLOCK_LEVEL: usize;

    /// Decode the slot `raw` found in a table of `level`.
    fn decode(level: usize, raw: Self::Raw) -> Slot;

    /// Pointer to a next-level table.
    fn table(next: PhysicalAddress) -> Self::Raw;

    /// Large leaf mapping `pa` (aligned to [`Self::Block`]).
    fn block(pa: PhysicalAddress, prot: Protection) -> Self::Raw;

    /// 4 KiB leaf mapping `pa`.
    fn page(pa: PhysicalAddress, prot: Protection) -> Self::Raw;

    /// Translation-control values for the next boot stage.
    fn handoff(roots: &[PhysicalAddress]) -> Handoff;

    /// Index of the last level (4 KiB leaves).
    #[inline]
    #[must_use]
    fn leaf_level() -> usize {
        Self::LEVELS.len() - 1
    }

    /// One past the highest encodable physical address.
    #[inline]
    #[must_use]
    fn physical_limit() -> u64 {
        1 << Self::FORMAT.physical_address_bits()
    }
}
