//! # Hand-off
//!
//! What the next boot stage needs to switch on translation: each core's
//! root table and the translation-control register values matching the
//! format the tables were built in. Programming TTBR/TTBCR/MAIR/DACR is the
//! caller's job.

use crate::descriptor::long::MAIR0;
use crate::format::TranslationFormat;
use alloc::boxed::Box;
use kernel_memory_addresses::PhysicalAddress;

/// TTBCR.EAE (bit 31): use the long-descriptor format.
pub const TTBCR_EAE: u32 = 1 << 31;

/// TTBCR for LPAE: `T0SZ = 0`, table walks inner/outer write-back
/// write-allocate cacheable (`IRGN0 = ORGN0 = 0b01`), inner shareable
/// (`SH0 = 0b11`).
pub const TTBCR_LPAE: u32 = TTBCR_EAE | (0b01 << 8) | (0b01 << 10) | (0b11 << 12);

/// DACR with domain 0 as *client* (permissions checked); all others no access.
pub const DACR_CLIENT_DOMAIN0: u32 = 0b01;

/// Per-core roots plus translation-control values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Handoff {
    pub format: TranslationFormat,
    /// Physical address of each core's first-level table, by core index.
    pub roots: Box<[PhysicalAddress]>,
    pub ttbcr: u32,
    pub mair0: u32,
    pub mair1: u32,
    pub dacr: u32,
}

impl Handoff {
    /// `TTBCR.N = 0`: TTBR0 covers the whole 4 GiB space.
    #[must_use]
    pub fn short_descriptor(roots: &[PhysicalAddress]) -> Self {
        Self {
            format: TranslationFormat::ShortDescriptor,
            roots: roots.into(),
            ttbcr: 0,
            mair0: 0,
            mair1: 0,
            dacr: DACR_CLIENT_DOMAIN0,
        }
    }

    #[must_use]
    pub fn long_descriptor(roots: &[PhysicalAddress]) -> Self {
        Self {
            format: TranslationFormat::ExtendedLpae,
            roots: roots.into(),
            ttbcr: TTBCR_LPAE,
            mair0: MAIR0,
            mair1: 0,
            dacr: 0,
        }
    }

    /// Root table of `core`.
    #[must_use]
    pub fn root(&self, core: usize) -> Option<PhysicalAddress> {
        self.roots.get(core).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lpae_sets_eae_and_mair() {
        let h = Handoff::long_descriptor(&[PhysicalAddress::new(0x8000_0000)]);
        assert_eq!(h.ttbcr, 0x8000_3500);
        assert_ne!(h.ttbcr & TTBCR_EAE, 0);
        assert_eq!(h.mair0, 0x4400_04FF);
        assert_eq!(h.root(0), Some(PhysicalAddress::new(0x8000_0000)));
        assert_eq!(h.root(1), None);
    }

    #[test]
    fn short_descriptor_uses_client_domain() {
        let roots = [
            PhysicalAddress::new(0x8000_0000),
            PhysicalAddress::new(0x8000_4000),
        ];
        let h = Handoff::short_descriptor(&roots);
        assert_eq!(h.ttbcr & TTBCR_EAE, 0);
        assert_eq!(h.dacr, 1);
        assert_eq!(&*h.roots, &roots);
    }
}
