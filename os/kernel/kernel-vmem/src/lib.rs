//! # Boot-Time Virtual Memory (ARMv7)
//!
//! Builds the hardware translation tables for every core before the kernel
//! switches on the MMU.
//!
//! ## What you get
//! - A [format selector](format) that picks the short-descriptor or the
//!   long-descriptor (LPAE) encoding from the processor's addressing width.
//! - [Entry encoders](descriptor) for both formats, as `bitfield-struct`
//!   descriptor types.
//! - A [table allocator](table_alloc) carving all tables from one pool that is
//!   self-mapped at [`SELF_MAP_BASE`](kernel_info::memory::SELF_MAP_BASE).
//! - The [`TranslationScheme`] interface (map, per-core map, block map/unmap,
//!   reverse translation) with one implementation per format.
//! - An [`ElfSegmentMapper`] coalescing contiguous boot-image segments into
//!   large leaves.
//! - The [`Handoff`] record for the next boot stage.
//!
//! ## ARMv7 Virtual Address → Physical Address Walk
//!
//! ```text
//!   short-descriptor                 long-descriptor (LPAE)
//!
//!   TTBR ─► L1 (4096 × u32)          TTBR ─► L1 (4 × u64)
//!             │                                │
//!             ├─► section (1 MiB)              └─► L2 (512 × u64)
//!             │                                      │
//!             └─► L2 (256 × u32)                     ├─► block (2 MiB)
//!                   │                                │
//!                   └─► small page (4 KiB)           └─► L3 (512 × u64)
//!                                                          │
//!                                                          └─► page (4 KiB)
//! ```
//!
//! Every core gets its own root table and its own lower tables. Mappings in
//! the shared region are written to every core's hierarchy before the call
//! returns; [`TranslationScheme::map_on_core`] writes one core's private
//! region only.
//!
//! ## Errors
//!
//! Nothing here is recoverable. Operations return [`MmuError`] and the boot
//! sequence ends in a [`FatalReporter`] via [`OrHalt`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

extern crate alloc;

mod boot;
mod config;
pub mod descriptor;
mod error;
pub mod format;
mod handoff;
mod protection;
mod scheme;
mod segments;
pub mod table_alloc;
mod walk;

pub use crate::boot::BootVmem;
pub use crate::config::{VmemConfig, VmemLayout};
pub use crate::descriptor::{LongDescriptor, ShortDescriptor, Slot, TableFormat};
pub use crate::error::{FatalReporter, MmuError, OrHalt};
pub use crate::format::{AddressingProbe, IdMmfr0Probe, TranslationFormat};
pub use crate::handoff::Handoff;
pub use crate::protection::{Access, MemoryType, Protection, Shareability};
pub use crate::scheme::{Scheme, TranslationScheme};
pub use crate::segments::{
    ElfSegmentMapper, MAX_PENDING_SEGMENTS, Segment, SegmentBuffer, SegmentMode, SegmentOutcome,
    SegmentState,
};
pub use crate::walk::{Granule, LeafEntry};
pub use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// Re-export constants as info module.
pub use kernel_info::memory as info;

/// Granule of every non-block leaf.
pub const PAGE_SIZE: u64 = 4096;

/// The early physical allocator tables are obtained from.
///
/// Bump-style; nothing handed out is ever returned.
pub trait FrameAlloc {
    /// Allocate `size` bytes of **zero-filled** physical memory aligned to
    /// `align` (a power of two). `None` when exhausted.
    fn alloc(&mut self, size: u64, align: u64) -> Option<PhysicalAddress>;
}

/// Converts physical addresses to pointers usable by the table builder.
///
/// Before the MMU is on this is usually the identity; host tests back it
/// with a heap buffer.
pub trait PhysMapper {
    /// Pointer through which the byte at `pa` can be read and written.
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8;
}

impl<M: PhysMapper + ?Sized> PhysMapper for &M {
    #[inline]
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        (**self).phys_to_ptr(pa)
    }
}

/// Align `x` up to the nearest multiple of `a`, or `None` on overflow.
///
/// `a` must be a non-zero power of two.
///
/// ```rust
/// # use kernel_vmem::checked_align_up;
/// assert_eq!(checked_align_up(1, 4096), Some(4096));
/// assert_eq!(checked_align_up(4096, 4096), Some(4096));
/// assert_eq!(checked_align_up(u64::MAX, 4096), None);
/// ```
#[inline(always)]
#[must_use]
pub const fn checked_align_up(x: u64, a: u64) -> Option<u64> {
    match x.checked_add(a - 1) {
        Some(v) => Some(v & !(a - 1)),
        None => None,
    }
}
