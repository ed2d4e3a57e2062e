//! # Errors and Fatal Reporting
//!
//! Every table-building operation returns [`MmuError`]. At this boot stage no
//! error is recoverable; the surrounding boot sequence hands the error to a
//! [`FatalReporter`], usually through [`OrHalt::or_halt`].

use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// Failure of a translation-table operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MmuError {
    #[error("unsupported physical addressing: {bits} bits")]
    UnsupportedAddressing { bits: u8 },
    #[error("core count must be at least one")]
    InvalidCoreCount,
    #[error("address {addr:#x} is not aligned to the {granule:#x} byte granule")]
    Misaligned { addr: u64, granule: u64 },
    #[error("physical address {addr} exceeds the descriptor limit {limit:#x}")]
    PhysicalOutOfRange { addr: PhysicalAddress, limit: u64 },
    #[error("virtual range {addr} + {len:#x} leaves the 32-bit address space")]
    VirtualOutOfRange { addr: VirtualAddress, len: u64 },
    #[error("virtual address {addr} lies in the reserved self-map window")]
    ReservedWindow { addr: VirtualAddress },
    #[error("virtual address {addr} lies in the shared region")]
    SharedRegion { addr: VirtualAddress },
    #[error("auto-assign window exhausted ({len:#x} bytes requested)")]
    AutoWindowExhausted { len: u64 },
    #[error("physical allocator exhausted ({size:#x} bytes, align {align:#x})")]
    AllocatorExhausted { size: u64, align: u64 },
    #[error("table pool exhausted ({size:#x} bytes requested)")]
    TablePoolExhausted { size: u64 },
    #[error("a large leaf already maps {addr}")]
    BlockConflict { addr: VirtualAddress },
    #[error("a next-level table already covers {addr}")]
    TableConflict { addr: VirtualAddress },
    #[error("core {core} out of range ({cores} cores)")]
    NoSuchCore { core: usize, cores: usize },
    #[error("segment mapper already finalized")]
    SegmentSealed,
    #[error("coalesced segment at {addr} does not translate back")]
    SegmentVerification { addr: VirtualAddress },
}

/// The external fatal-error reporter: prints a diagnostic and never returns.
pub trait FatalReporter {
    fn halt(&self, err: &MmuError) -> !;
}

/// Turn any [`MmuError`] into a terminal diagnostic.
pub trait OrHalt<T> {
    fn or_halt<R: FatalReporter + ?Sized>(self, reporter: &R) -> T;
}

impl<T> OrHalt<T> for Result<T, MmuError> {
    #[inline]
    fn or_halt<R: FatalReporter + ?Sized>(self, reporter: &R) -> T {
        match self {
            Ok(v) => v,
            Err(e) => {
                log::error!("fatal: {e}");
                reporter.halt(&e)
            }
        }
    }
}
