//! # ARMv7 Short-Descriptor Format
//!
//! Two levels of 32-bit descriptors:
//!
//! | Level | Entries | Table | Slot maps | Leaf |
//! |:------|--------:|------:|----------:|:-----|
//! | L1 | 4096 | 16 KiB, 16 KiB aligned | 1 MiB | [`Section`] or [`PageTablePointer`] |
//! | L2 | 256 | 1 KiB, 1 KiB aligned | 4 KiB | [`SmallPage`] |
//!
//! Memory types use TEX/C/B with TEX remap disabled; every descriptor is in
//! domain 0, which the hand-off programs as a client domain so the AP bits
//! are enforced.

use crate::descriptor::{Level, Slot, TableFormat};
use crate::format::TranslationFormat;
use crate::handoff::Handoff;
use crate::{MemoryType, Protection};
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, Size1M};

/// L1 slot kind bits \[1:0\].
const KIND_FAULT: u8 = 0b00;
const KIND_PAGE_TABLE: u8 = 0b01;
const KIND_SECTION: u8 = 0b10;

/// L1 **section** descriptor: maps 1 MiB.
#[bitfield(u32)]
pub struct Section {
    /// Descriptor type (bits 0..1): `0b10`.
    #[bits(2, default = KIND_SECTION)]
    kind: u8,
    /// Bufferable (bit 2).
    pub b: bool,
    /// Cacheable (bit 3).
    pub c: bool,
    /// Execute-never (bit 4).
    pub xn: bool,
    /// Domain (bits 5..8).
    #[bits(4)]
    pub domain: u8,
    /// Implementation defined (bit 9).
    #[bits(1)]
    __imp: u8,
    /// Access permissions AP\[1:0\] (bits 10..11).
    #[bits(2)]
    pub ap: u8,
    /// Type extension (bits 12..14).
    #[bits(3)]
    pub tex: u8,
    /// AP\[2\] (bit 15): read-only.
    pub ap2: bool,
    /// Shareable (bit 16).
    pub s: bool,
    /// Not global (bit 17).
    pub ng: bool,
    /// Supersection (bit 18): always 0 here.
    supersection: bool,
    /// Non-secure (bit 19).
    pub ns: bool,
    /// Section base address bits 31..20.
    #[bits(12)]
    base_31_20: u16,
}

impl Section {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn leaf(pa: PhysicalAddress, prot: Protection) -> Self {
        let (tex, c, b) = tex_c_b(prot.memory);
        let (ap2, ap) = ap_bits(prot);
        Self::new()
            .with_b(b)
            .with_c(c)
            .with_tex(tex)
            .with_xn(!prot.executable())
            .with_ap(ap)
            .with_ap2(ap2)
            .with_s(prot.shareability.is_shared())
            .with_base_31_20((pa.as_u64() >> 20) as u16)
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new((self.base_31_20() as u64) << 20)
    }
}

/// L1 descriptor pointing to an L2 page table.
#[bitfield(u32)]
pub struct PageTablePointer {
    /// Descriptor type (bits 0..1): `0b01`.
    #[bits(2, default = KIND_PAGE_TABLE)]
    kind: u8,
    /// Privileged execute-never (bit 2).
    pub pxn: bool,
    /// Non-secure (bit 3).
    pub ns: bool,
    #[bits(1)]
    __sbz: u8,
    /// Domain (bits 5..8).
    #[bits(4)]
    pub domain: u8,
    #[bits(1)]
    __imp: u8,
    /// Page table base address bits 31..10.
    #[bits(22)]
    base_31_10: u32,
}

impl PageTablePointer {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn to(table: PhysicalAddress) -> Self {
        Self::new().with_base_31_10((table.as_u64() >> 10) as u32)
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new((self.base_31_10() as u64) << 10)
    }
}

/// L2 **small page** descriptor: maps 4 KiB.
#[bitfield(u32)]
pub struct SmallPage {
    /// Execute-never (bit 0).
    pub xn: bool,
    /// Small page marker (bit 1): `1`.
    #[bits(default = true)]
    small: bool,
    /// Bufferable (bit 2).
    pub b: bool,
    /// Cacheable (bit 3).
    pub c: bool,
    /// Access permissions AP\[1:0\] (bits 4..5).
    #[bits(2)]
    pub ap: u8,
    /// Type extension (bits 6..8).
    #[bits(3)]
    pub tex: u8,
    /// AP\[2\] (bit 9).
    pub ap2: bool,
    /// Shareable (bit 10).
    pub s: bool,
    /// Not global (bit 11).
    pub ng: bool,
    /// Page base address bits 31..12.
    #[bits(20)]
    base_31_12: u32,
}

impl SmallPage {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn leaf(pa: PhysicalAddress, prot: Protection) -> Self {
        let (tex, c, b) = tex_c_b(prot.memory);
        let (ap2, ap) = ap_bits(prot);
        Self::new()
            .with_xn(!prot.executable())
            .with_b(b)
            .with_c(c)
            .with_tex(tex)
            .with_ap(ap)
            .with_ap2(ap2)
            .with_s(prot.shareability.is_shared())
            .with_base_31_12((pa.as_u64() >> 12) as u32)
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new((self.base_31_12() as u64) << 12)
    }
}

/// TEX\[2:0\], C, B with TEX remap disabled.
const fn tex_c_b(memory: MemoryType) -> (u8, bool, bool) {
    match memory {
        MemoryType::Normal => (0b001, true, true),
        MemoryType::NonCacheable => (0b001, false, false),
        MemoryType::Device => (0b000, false, true),
        MemoryType::StronglyOrdered => (0b000, false, false),
    }
}

/// AP\[2\] and AP\[1:0\]: `x01` privileged only, `x11` all levels.
const fn ap_bits(prot: Protection) -> (bool, u8) {
    let ap = if prot.user() { 0b11 } else { 0b01 };
    (!prot.writable(), ap)
}

/// The short-descriptor [`TableFormat`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ShortDescriptor;

impl TableFormat for ShortDescriptor {
    type Raw = u32;
    type Block = Size1M;

    const FORMAT: TranslationFormat = TranslationFormat::ShortDescriptor;

    const LEVELS: &'static [Level] = &[
        Level {
            shift: 20,
            entries: 4096,
            table_bytes: 16 * 1024,
        },
        Level {
            shift: 12,
            entries: 256,
            table_bytes: 1024,
        },
    ];

    const BLOCK_LEVEL: usize = 0;

    fn decode(level: usize, raw: u32) -> Slot {
        if level == 0 {
            let section = Section::from_bits(raw);
            match section.kind() {
                KIND_FAULT => Slot::Invalid,
                KIND_PAGE_TABLE => Slot::Table(PageTablePointer::from_bits(raw).base()),
                KIND_SECTION if !section.supersection() => Slot::Block(section.base()),
                // Supersections and the reserved encoding are never written.
                _ => Slot::Invalid,
            }
        } else {
            let page = SmallPage::from_bits(raw);
            if page.small() {
                Slot::Page(page.base())
            } else {
                Slot::Invalid
            }
        }
    }

    fn table(next: PhysicalAddress) -> u32 {
        debug_assert!(next.as_u64() < 1 << 32);
        PageTablePointer::to(next).into_bits()
    }

    fn block(pa: PhysicalAddress, prot: Protection) -> u32 {
        debug_assert!(pa.as_u64() < 1 << 32);
        Section::leaf(pa, prot).into_bits()
    }

    fn page(pa: PhysicalAddress, prot: Protection) -> u32 {
        debug_assert!(pa.as_u64() < 1 << 32);
        SmallPage::leaf(pa, prot).into_bits()
    }

    fn handoff(roots: &[PhysicalAddress]) -> Handoff {
        Handoff::short_descriptor(roots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Access, Shareability};

    #[test]
    fn kernel_data_section() {
        // TEX=001 C=1 B=1, XN, AP=01, S, base 0x801.
        let raw = ShortDescriptor::block(PhysicalAddress::new(0x8010_0000), Protection::RW);
        assert_eq!(raw, 0x8011_141E);
    }

    #[test]
    fn device_section() {
        // TEX=000 C=0 B=1, XN, AP=01, S.
        let raw = ShortDescriptor::block(PhysicalAddress::new(0x3F20_0000), Protection::DEVICE);
        assert_eq!(raw, 0x3F21_0416);
    }

    #[test]
    fn small_page_permissions() {
        let rx = ShortDescriptor::page(PhysicalAddress::new(0x1000_0000), Protection::RX);
        let page = SmallPage::from_bits(rx);
        assert!(!page.xn());
        assert!(page.ap2());
        assert_eq!(page.ap(), 0b01);
        assert_eq!(page.tex(), 0b001);
        assert!(page.c() && page.b());

        let user_rw = ShortDescriptor::page(
            PhysicalAddress::new(0x1000_1000),
            Protection::RW.with_user(),
        );
        let page = SmallPage::from_bits(user_rw);
        assert!(page.xn());
        assert!(!page.ap2());
        assert_eq!(page.ap(), 0b11);
        assert_eq!(user_rw & 0xFFFF_F000, 0x1000_1000);
    }

    #[test]
    fn non_shareable_strongly_ordered() {
        let prot = Protection {
            access: Access::READ,
            memory: MemoryType::StronglyOrdered,
            shareability: Shareability::NonShareable,
        };
        let page = SmallPage::from_bits(ShortDescriptor::page(PhysicalAddress::new(0x4000), prot));
        assert_eq!(page.tex(), 0);
        assert!(!page.c() && !page.b() && !page.s());
    }

    #[test]
    fn decodes_what_it_encodes() {
        let pa = PhysicalAddress::new(0x8000_0400);
        assert_eq!(
            ShortDescriptor::decode(0, ShortDescriptor::table(pa)),
            Slot::Table(pa)
        );
        let pa = PhysicalAddress::new(0x8020_0000);
        assert_eq!(
            ShortDescriptor::decode(0, ShortDescriptor::block(pa, Protection::RWX)),
            Slot::Block(pa)
        );
        let pa = PhysicalAddress::new(0x8020_3000);
        assert_eq!(
            ShortDescriptor::decode(1, ShortDescriptor::page(pa, Protection::RO)),
            Slot::Page(pa)
        );
        assert_eq!(ShortDescriptor::decode(0, 0), Slot::Invalid);
        assert_eq!(ShortDescriptor::decode(1, 0), Slot::Invalid);
    }

    #[test]
    fn supersections_are_not_leaves() {
        assert_eq!(ShortDescriptor::decode(0, 0x0004_0002), Slot::Invalid);
    }

    #[test]
    fn index_split() {
        let va = kernel_memory_addresses::VirtualAddress::new(0xC012_3456);
        assert_eq!(ShortDescriptor::LEVELS[0].index(va), 0xC01);
        assert_eq!(ShortDescriptor::LEVELS[1].index(va), 0x23);
    }
}
