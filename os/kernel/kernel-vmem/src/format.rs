//! # Format Selector
//!
//! Picks the translation-table encoding once, from the processor's physical
//! addressing capability. Everything downstream is instantiated for the
//! chosen [`TranslationFormat`] and never consults the probe again.

use crate::MmuError;
use core::fmt;
use kernel_info::memory::{LPAE_PHYS_BITS, SHORT_DESCRIPTOR_PHYS_BITS};

/// The two supported translation-table encodings.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TranslationFormat {
    /// ARMv7 short-descriptor: 32-bit descriptors, two levels,
    /// 1 MiB sections and 4 KiB small pages.
    ShortDescriptor,
    /// ARMv7 long-descriptor (LPAE): 64-bit descriptors, three levels,
    /// 2 MiB blocks and 4 KiB pages.
    ExtendedLpae,
}

impl TranslationFormat {
    /// Map a probed physical address width onto a format.
    ///
    /// # Errors
    /// [`MmuError::UnsupportedAddressing`] for any width other than 32 or 40.
    pub const fn from_physical_bits(bits: u8) -> Result<Self, MmuError> {
        match bits {
            SHORT_DESCRIPTOR_PHYS_BITS => Ok(Self::ShortDescriptor),
            LPAE_PHYS_BITS => Ok(Self::ExtendedLpae),
            _ => Err(MmuError::UnsupportedAddressing { bits }),
        }
    }

    /// Run the probe and select the format.
    ///
    /// # Errors
    /// See [`from_physical_bits`](Self::from_physical_bits).
    pub fn select<P: AddressingProbe + ?Sized>(probe: &P) -> Result<Self, MmuError> {
        let bits = probe.physical_address_bits();
        let format = Self::from_physical_bits(bits)?;
        log::info!("{bits}-bit physical addressing, using {format}");
        Ok(format)
    }

    #[inline]
    #[must_use]
    pub const fn physical_address_bits(self) -> u8 {
        match self {
            Self::ShortDescriptor => SHORT_DESCRIPTOR_PHYS_BITS,
            Self::ExtendedLpae => LPAE_PHYS_BITS,
        }
    }

    /// Depth of the table hierarchy.
    #[inline]
    #[must_use]
    pub const fn levels(self) -> usize {
        match self {
            Self::ShortDescriptor => 2,
            Self::ExtendedLpae => 3,
        }
    }

    /// Size of a large leaf (section or block) in bytes.
    #[inline]
    #[must_use]
    pub const fn block_size(self) -> u64 {
        match self {
            Self::ShortDescriptor => 0x10_0000,
            Self::ExtendedLpae => 0x20_0000,
        }
    }
}

impl fmt::Display for TranslationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortDescriptor => f.write_str("short-descriptor"),
            Self::ExtendedLpae => f.write_str("long-descriptor (LPAE)"),
        }
    }
}

/// Hardware capability probe consumed by the format selector.
pub trait AddressingProbe {
    /// Number of physical address bits the MMU can output.
    fn physical_address_bits(&self) -> u8;
}

/// Probe backed by the `ID_MMFR0` register (Memory Model Feature Register 0).
///
/// The VMSA support field (bits \[3:0\]) reads `3` or `4` on VMSAv7 cores
/// and `5` or higher once the Large Physical Address Extension is present.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IdMmfr0Probe(pub u32);

impl IdMmfr0Probe {
    /// Read `ID_MMFR0` from CP15.
    #[cfg(target_arch = "arm")]
    #[must_use]
    pub fn read() -> Self {
        let value: u32;
        // SAFETY: ID_MMFR0 is a read-only identification register, readable
        // at PL1 with no side effects.
        unsafe {
            core::arch::asm!(
            "mrc p15, 0, {0}, c0, c1, 4",
            out(reg) value,
            options(nomem, nostack, preserves_flags)
            );
        }
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn vmsa(self) -> u8 {
        (self.0 & 0xF) as u8
    }
}

impl AddressingProbe for IdMmfr0Probe {
    fn physical_address_bits(&self) -> u8 {
        match self.vmsa() {
            5.. => LPAE_PHYS_BITS,
            3 | 4 => SHORT_DESCRIPTOR_PHYS_BITS,
            // No usable VMSA.
            _ => 0,
        }
    }
}
