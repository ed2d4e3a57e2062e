//! Format selection and the boot-time entry point.

use crate::config::VmemConfig;
use crate::descriptor::{LongDescriptor, ShortDescriptor};
use crate::format::{AddressingProbe, TranslationFormat};
use crate::handoff::Handoff;
use crate::scheme::{Scheme, TranslationScheme};
use crate::segments::{ElfSegmentMapper, SegmentBuffer};
use crate::{FrameAlloc, MmuError, PhysMapper};
use alloc::boxed::Box;
use core::ops::{Deref, DerefMut};

/// The translation scheme chosen for this boot.
///
/// Holds exactly one of the two [`Scheme`] instantiations behind a trait
/// object; it derefs to [`TranslationScheme`].
///
/// ```rust
/// # use kernel_vmem::*;
/// # struct Ram(std::cell::UnsafeCell<Vec<u64>>);
/// # impl PhysMapper for Ram {
/// #     fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
/// #         unsafe { (*self.0.get()).as_mut_ptr().cast::<u8>().add((pa.as_u64() - 0x8000_0000) as usize) }
/// #     }
/// # }
/// # struct Bump(u64);
/// # impl FrameAlloc for Bump {
/// #     fn alloc(&mut self, size: u64, _align: u64) -> Option<PhysicalAddress> {
/// #         let pa = self.0; self.0 += size; Some(PhysicalAddress::new(pa))
/// #     }
/// # }
/// # let ram = Ram(std::cell::UnsafeCell::new(vec![0u64; 0x20_0000 / 8]));
/// let mut vmem = BootVmem::new(&IdMmfr0Probe(0x1020_1105), &ram, &mut Bump(0x8000_0000), &VmemConfig::new(2))
///     .or_halt(&HaltLoop);
/// vmem.block_map(VirtualAddress::new(0x8000_0000), PhysicalAddress::new(0x8000_0000), 0x20_0000, Protection::RWX)
///     .or_halt(&HaltLoop);
/// assert_eq!(vmem.translate(1, VirtualAddress::new(0x8000_1234)), Some(PhysicalAddress::new(0x8000_1234)));
/// # struct HaltLoop;
/// # impl FatalReporter for HaltLoop { fn halt(&self, e: &MmuError) -> ! { panic!("{e}") } }
/// ```
pub struct BootVmem<'m> {
    scheme: Box<dyn TranslationScheme + 'm>,
    segments: SegmentBuffer,
}

impl<'m> BootVmem<'m> {
    /// Probe the addressing width, then build the per-core roots and the
    /// self-map in the matching format.
    ///
    /// # Errors
    /// [`MmuError::UnsupportedAddressing`], [`MmuError::InvalidCoreCount`] or
    /// allocator exhaustion.
    pub fn new<P, M, A>(
        probe: &P,
        mapper: M,
        alloc: &mut A,
        config: &VmemConfig,
    ) -> Result<Self, MmuError>
    where
        P: AddressingProbe + ?Sized,
        M: PhysMapper + 'm,
        A: FrameAlloc + ?Sized,
    {
        let format = TranslationFormat::select(probe)?;
        Self::with_format(format, mapper, alloc, config)
    }

    /// Build the tables in a known format.
    ///
    /// # Errors
    /// See [`new`](Self::new).
    pub fn with_format<M, A>(
        format: TranslationFormat,
        mapper: M,
        alloc: &mut A,
        config: &VmemConfig,
    ) -> Result<Self, MmuError>
    where
        M: PhysMapper + 'm,
        A: FrameAlloc + ?Sized,
    {
        let scheme: Box<dyn TranslationScheme + 'm> = match format {
            TranslationFormat::ShortDescriptor => Box::new(
                Scheme::<ShortDescriptor, M>::new(mapper, alloc, config)?,
            ),
            TranslationFormat::ExtendedLpae => {
                Box::new(Scheme::<LongDescriptor, M>::new(mapper, alloc, config)?)
            }
        };
        Ok(Self {
            scheme,
            segments: SegmentBuffer::new(),
        })
    }

    /// The boot image's segment mapper.
    ///
    /// Pending segments and the fallback decision persist across calls, so
    /// other mappings may be made between two pushes.
    pub fn segments(&mut self) -> ElfSegmentMapper<'_, dyn TranslationScheme + 'm> {
        ElfSegmentMapper::new(&mut *self.scheme, &mut self.segments)
    }

    /// End of the boot-time mapping phase.
    #[must_use]
    pub fn into_handoff(self) -> Handoff {
        let handoff = self.scheme.handoff();
        log::info!(
            "handing off {} roots ({})",
            handoff.roots.len(),
            handoff.format
        );
        handoff
    }
}

impl<'m> Deref for BootVmem<'m> {
    type Target = dyn TranslationScheme + 'm;

    fn deref(&self) -> &Self::Target {
        &*self.scheme
    }
}

impl DerefMut for BootVmem<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.scheme
    }
}
