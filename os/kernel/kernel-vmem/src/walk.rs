//! Table walking shared by the allocator, the mapper and the reverse
//! translator.
//!
//! All table addresses passed in here come from the table pool; the
//! [`PhysMapper`] is trusted to make them readable and writable.

use crate::descriptor::{Slot, TableFormat};
use crate::table_alloc::TableAllocator;
use crate::{MmuError, PhysMapper};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// Granularity of a leaf found by the reverse translator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Granule {
    /// 4 KiB page.
    Page,
    /// 1 MiB section or 2 MiB block.
    Block,
}

/// A leaf descriptor found by walking one core's hierarchy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LeafEntry {
    pub granule: Granule,
    /// Bytes mapped by the leaf.
    pub size: u64,
    /// Raw descriptor, zero-extended to 64 bits.
    pub raw: u64,
    /// Physical base of the leaf.
    pub base: PhysicalAddress,
}

impl LeafEntry {
    /// Physical address backing `va` through this leaf.
    #[inline]
    #[must_use]
    pub fn resolve(&self, va: VirtualAddress) -> PhysicalAddress {
        self.base + (va.as_u64() & (self.size - 1))
    }
}

#[inline]
#[allow(clippy::cast_ptr_alignment)]
pub(crate) fn read_slot<F: TableFormat, M: PhysMapper + ?Sized>(
    mapper: &M,
    table: PhysicalAddress,
    index: usize,
) -> F::Raw {
    // SAFETY: `table` is a pool table with more than `index` slots.
    unsafe {
        mapper
            .phys_to_ptr(table)
            .cast::<F::Raw>()
            .add(index)
            .read_volatile()
    }
}

#[inline]
#[allow(clippy::cast_ptr_alignment)]
pub(crate) fn write_slot<F: TableFormat, M: PhysMapper + ?Sized>(
    mapper: &M,
    table: PhysicalAddress,
    index: usize,
    raw: F::Raw,
) {
    // SAFETY: see `read_slot`.
    unsafe {
        mapper
            .phys_to_ptr(table)
            .cast::<F::Raw>()
            .add(index)
            .write_volatile(raw);
    }
}

/// Walk from `root` down to the table of `target` level covering `va`,
/// allocating and linking missing tables on the way. Existing links are
/// reused, never replaced.
///
/// # Errors
/// - [`MmuError::BlockConflict`] if a large leaf sits on the path.
/// - Pool exhaustion from [`TableAllocator::allocate_lower_table`].
pub(crate) fn ensure_table<F: TableFormat, M: PhysMapper + ?Sized>(
    tables: &mut TableAllocator<F>,
    mapper: &M,
    root: PhysicalAddress,
    va: VirtualAddress,
    target: usize,
) -> Result<PhysicalAddress, MmuError> {
    let mut table = root;
    for level in 0..target {
        let index = F::LEVELS[level].index(va);
        table = match F::decode(level, read_slot::<F, M>(mapper, table, index)) {
            Slot::Table(next) => next,
            Slot::Invalid => {
                let next = tables.allocate_lower_table(mapper, level + 1)?;
                write_slot::<F, M>(mapper, table, index, F::table(next));
                log::trace!("L{} table {next} for {va}", level + 2);
                next
            }
            Slot::Block(_) | Slot::Page(_) => return Err(MmuError::BlockConflict { addr: va }),
        };
    }
    Ok(table)
}

/// Like [`ensure_table`] but never allocates; `None` if the path is missing
/// or ends in a leaf.
pub(crate) fn find_table<F: TableFormat, M: PhysMapper + ?Sized>(
    mapper: &M,
    root: PhysicalAddress,
    va: VirtualAddress,
    target: usize,
) -> Option<PhysicalAddress> {
    let mut table = root;
    for level in 0..target {
        let index = F::LEVELS[level].index(va);
        match F::decode(level, read_slot::<F, M>(mapper, table, index)) {
            Slot::Table(next) => table = next,
            _ => return None,
        }
    }
    Some(table)
}

/// Find the leaf mapping `va`, without modifying anything.
pub(crate) fn find_leaf<F: TableFormat, M: PhysMapper + ?Sized>(
    mapper: &M,
    root: PhysicalAddress,
    va: VirtualAddress,
) -> Option<LeafEntry> {
    let mut table = root;
    for (level, geometry) in F::LEVELS.iter().enumerate() {
        let raw = read_slot::<F, M>(mapper, table, geometry.index(va));
        let (granule, base) = match F::decode(level, raw) {
            Slot::Invalid => return None,
            Slot::Table(next) => {
                table = next;
                continue;
            }
            Slot::Block(base) => (Granule::Block, base),
            Slot::Page(base) => (Granule::Page, base),
        };
        return Some(LeafEntry {
            granule,
            size: geometry.span(),
            raw: raw.into(),
            base,
        });
    }
    None
}
