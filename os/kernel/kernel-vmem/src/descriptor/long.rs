//! # ARMv7 Long-Descriptor Format (LPAE)
//!
//! Three levels of 64-bit descriptors covering the 32-bit virtual address
//! space with `T0SZ = 0`:
//!
//! | Level | Entries | Table | Slot maps | Contents |
//! |:------|--------:|------:|----------:|:---------|
//! | L1 | 4 | 32 B, 32 B aligned | 1 GiB | [`TableDescriptor`] only |
//! | L2 | 512 | 4 KiB | 2 MiB | [`TableDescriptor`] or [`BlockDescriptor`] |
//! | L3 | 512 | 4 KiB | 4 KiB | [`PageDescriptor`] |
//!
//! Output addresses are 40 bits wide. Memory types are indices into MAIR0,
//! see [`MAIR0`].

use crate::descriptor::{Level, Slot, TableFormat};
use crate::format::TranslationFormat;
use crate::handoff::Handoff;
use crate::{MemoryType, Protection, Shareability};
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, Size2M};

const KIND_BLOCK: u8 = 0b01;
const KIND_TABLE_OR_PAGE: u8 = 0b11;

/// MAIR attribute index: normal memory, write-back read/write-allocate.
pub const ATTR_NORMAL: u8 = 0;
/// MAIR attribute index: Device-nGnRE.
pub const ATTR_DEVICE: u8 = 1;
/// MAIR attribute index: strongly ordered (Device-nGnRnE).
pub const ATTR_STRONGLY_ORDERED: u8 = 2;
/// MAIR attribute index: normal memory, non-cacheable.
pub const ATTR_NON_CACHEABLE: u8 = 3;

/// MAIR0 value matching the `ATTR_*` indices (`0xFF`, `0x04`, `0x00`, `0x44`).
pub const MAIR0: u32 = 0xFF
    | (0x04 << (8 * ATTR_DEVICE))
    | (0x00 << (8 * ATTR_STRONGLY_ORDERED))
    | (0x44 << (8 * ATTR_NON_CACHEABLE));

/// Pointer to a next-level table (L1 or L2 slot).
#[bitfield(u64)]
pub struct TableDescriptor {
    #[bits(2, default = KIND_TABLE_OR_PAGE)]
    kind: u8,
    #[bits(10)]
    __ignored_low: u16,
    /// Next-level table address bits 39..12.
    #[bits(28)]
    next_39_12: u32,
    #[bits(12)]
    __res0: u16,
    #[bits(7)]
    __ignored_high: u8,
    /// PXNTable (bit 59).
    pub pxn_table: bool,
    /// XNTable (bit 60).
    pub xn_table: bool,
    /// APTable (bits 61..62).
    #[bits(2)]
    pub ap_table: u8,
    /// NSTable (bit 63).
    pub ns_table: bool,
}

impl TableDescriptor {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn to(table: PhysicalAddress) -> Self {
        Self::new().with_next_39_12((table.as_u64() >> 12) as u32)
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new((self.next_39_12() as u64) << 12)
    }
}

/// L2 **block** descriptor: maps 2 MiB.
#[bitfield(u64)]
pub struct BlockDescriptor {
    #[bits(2, default = KIND_BLOCK)]
    kind: u8,
    /// Index into MAIR (bits 2..4).
    #[bits(3)]
    pub attr_index: u8,
    /// Non-secure (bit 5).
    pub ns: bool,
    /// AP\[2:1\] (bits 6..7).
    #[bits(2)]
    pub ap: u8,
    /// Shareability (bits 8..9).
    #[bits(2)]
    pub sh: u8,
    /// Access flag (bit 10); set so the first access does not fault.
    #[bits(default = true)]
    pub af: bool,
    /// Not global (bit 11).
    pub ng: bool,
    #[bits(9)]
    __res0_low: u16,
    /// Output address bits 39..21.
    #[bits(19)]
    output_39_21: u32,
    #[bits(12)]
    __res0_high: u16,
    /// Contiguous hint (bit 52).
    pub contiguous: bool,
    /// Privileged execute-never (bit 53).
    pub pxn: bool,
    /// Execute-never (bit 54).
    pub xn: bool,
    /// Reserved for software use (bits 55..58).
    #[bits(4)]
    pub software: u8,
    #[bits(5)]
    __ignored: u8,
}

impl BlockDescriptor {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn leaf(pa: PhysicalAddress, prot: Protection) -> Self {
        let xn = !prot.executable();
        Self::new()
            .with_attr_index(attr_index(prot.memory))
            .with_ap(prot.access_permissions())
            .with_sh(sh_bits(prot.shareability))
            .with_pxn(xn)
            .with_xn(xn)
            .with_output_39_21((pa.as_u64() >> 21) as u32)
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new((self.output_39_21() as u64) << 21)
    }
}

/// L3 **page** descriptor: maps 4 KiB.
#[bitfield(u64)]
pub struct PageDescriptor {
    #[bits(2, default = KIND_TABLE_OR_PAGE)]
    kind: u8,
    #[bits(3)]
    pub attr_index: u8,
    pub ns: bool,
    #[bits(2)]
    pub ap: u8,
    #[bits(2)]
    pub sh: u8,
    #[bits(default = true)]
    pub af: bool,
    pub ng: bool,
    /// Output address bits 39..12.
    #[bits(28)]
    output_39_12: u32,
    #[bits(12)]
    __res0: u16,
    pub contiguous: bool,
    pub pxn: bool,
    pub xn: bool,
    #[bits(4)]
    pub software: u8,
    #[bits(5)]
    __ignored: u8,
}

impl PageDescriptor {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn leaf(pa: PhysicalAddress, prot: Protection) -> Self {
        let xn = !prot.executable();
        Self::new()
            .with_attr_index(attr_index(prot.memory))
            .with_ap(prot.access_permissions())
            .with_sh(sh_bits(prot.shareability))
            .with_pxn(xn)
            .with_xn(xn)
            .with_output_39_12((pa.as_u64() >> 12) as u32)
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new((self.output_39_12() as u64) << 12)
    }
}

const fn attr_index(memory: MemoryType) -> u8 {
    match memory {
        MemoryType::Normal => ATTR_NORMAL,
        MemoryType::Device => ATTR_DEVICE,
        MemoryType::StronglyOrdered => ATTR_STRONGLY_ORDERED,
        MemoryType::NonCacheable => ATTR_NON_CACHEABLE,
    }
}

const fn sh_bits(shareability: Shareability) -> u8 {
    match shareability {
        Shareability::NonShareable => 0b00,
        Shareability::OuterShareable => 0b10,
        Shareability::InnerShareable => 0b11,
    }
}

/// The long-descriptor [`TableFormat`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LongDescriptor;

impl TableFormat for LongDescriptor {
    type Raw = u64;
    type Block = Size2M;

    const FORMAT: TranslationFormat = TranslationFormat::ExtendedLpae;

    const LEVELS: &'static [Level] = &[
        Level {
            shift: 30,
            entries: 4,
            table_bytes: 32,
        },
        Level {
            shift: 21,
            entries: 512,
            table_bytes: 4096,
        },
        Level {
            shift: 12,
            entries: 512,
            table_bytes: 4096,
        },
    ];

    const BLOCK_LEVEL: usize = 1;

    fn decode(level: usize, raw: u64) -> Slot {
        let kind = TableDescriptor::from_bits(raw).kind();
        match (level, kind) {
            (0 | 1, KIND_TABLE_OR_PAGE) => Slot::Table(TableDescriptor::from_bits(raw).base()),
            (1, KIND_BLOCK) => Slot::Block(BlockDescriptor::from_bits(raw).base()),
            (2, KIND_TABLE_OR_PAGE) => Slot::Page(PageDescriptor::from_bits(raw).base()),
            // 1 GiB blocks and the reserved L3 encoding are never written.
            _ => Slot::Invalid,
        }
    }

    fn table(next: PhysicalAddress) -> u64 {
        TableDescriptor::to(next).into_bits()
    }

    fn block(pa: PhysicalAddress, prot: Protection) -> u64 {
        BlockDescriptor::leaf(pa, prot).into_bits()
    }

    fn page(pa: PhysicalAddress, prot: Protection) -> u64 {
        PageDescriptor::leaf(pa, prot).into_bits()
    }

    fn handoff(roots: &[PhysicalAddress]) -> Handoff {
        Handoff::long_descriptor(roots)
    }
}
