//! # Mapper, Block Mapper and Reverse Translator
//!
//! [`TranslationScheme`] is the capability interface the boot sequence
//! talks to. [`Scheme`] implements it once per [`TableFormat`]; the caller
//! picks the instantiation once (see [`BootVmem`](crate::BootVmem)) and
//! keeps it behind a `dyn TranslationScheme`.
//!
//! ## Replication
//!
//! Each core owns an independent hierarchy. Shared mappings are written into
//! every core's tables, one core after the other, before the call returns.
//! Missing lower tables are allocated per core on demand; an existing link
//! is always reused.
//!
//! ## TLB maintenance
//!
//! None. Tables are built before translation is enabled.

use crate::config::{VmemConfig, VmemLayout};
use crate::descriptor::{Slot, TableFormat};
use crate::format::TranslationFormat;
use crate::handoff::Handoff;
use crate::table_alloc::TableAllocator;
use crate::walk::{LeafEntry, ensure_table, find_leaf, find_table, read_slot, write_slot};
use crate::{FrameAlloc, MmuError, PAGE_SIZE, PhysMapper, Protection, checked_align_up};
use alloc::boxed::Box;
use core::marker::PhantomData;
use kernel_memory_addresses::{PageSize, PhysicalAddress, Size4K, VirtualAddress};

/// The mapping services of one translation format.
pub trait TranslationScheme {
    fn format(&self) -> TranslationFormat;

    /// Number of per-core hierarchies.
    fn cores(&self) -> usize;

    /// Size of a large leaf (section or block).
    fn block_size(&self) -> u64 {
        self.format().block_size()
    }

    /// Map `len` bytes at `pa` with 4 KiB pages on every core.
    ///
    /// `pa` and `va` need not be page aligned: both are aligned down and the
    /// returned address carries the sub-page offset of `pa`. With `va = None`
    /// the next free window of the auto-assign region is used.
    ///
    /// # Errors
    /// Range, window, conflict and pool errors; see [`MmuError`].
    fn map(
        &mut self,
        va: Option<VirtualAddress>,
        pa: PhysicalAddress,
        len: u64,
        prot: Protection,
    ) -> Result<VirtualAddress, MmuError>;

    /// Like [`map`](Self::map) but for one core's private region only.
    ///
    /// # Errors
    /// As [`map`](Self::map), plus [`MmuError::NoSuchCore`] and
    /// [`MmuError::SharedRegion`].
    fn map_on_core(
        &mut self,
        core: usize,
        va: VirtualAddress,
        pa: PhysicalAddress,
        len: u64,
        prot: Protection,
    ) -> Result<VirtualAddress, MmuError>;

    /// Install large leaves for `[va, va + len)` on every core.
    ///
    /// # Errors
    /// [`MmuError::Misaligned`] unless `va`, `pa` and `len` are multiples of
    /// [`block_size`](Self::block_size); [`MmuError::TableConflict`] if a
    /// slot already points to a lower table.
    fn block_map(
        &mut self,
        va: VirtualAddress,
        pa: PhysicalAddress,
        len: u64,
        prot: Protection,
    ) -> Result<VirtualAddress, MmuError>;

    /// Clear the large leaves covering `[va, va + len)` on every core. Empty
    /// slots are left alone.
    ///
    /// # Errors
    /// [`MmuError::Misaligned`], [`MmuError::ReservedWindow`],
    /// [`MmuError::TableConflict`].
    fn block_unmap(&mut self, va: VirtualAddress, len: u64) -> Result<(), MmuError>;

    /// Whether every large-leaf slot covering `[va, va + len)` is empty on
    /// every core: neither a block nor a link to a lower table.
    fn block_slots_free(&self, va: VirtualAddress, len: u64) -> bool;

    /// Physical address backing `va` in `core`'s hierarchy.
    fn translate(&self, core: usize, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.leaf(core, va).map(|leaf| leaf.resolve(va))
    }

    /// The leaf descriptor mapping `va` in `core`'s hierarchy.
    fn leaf(&self, core: usize, va: VirtualAddress) -> Option<LeafEntry>;

    /// Physical address of `core`'s first-level table.
    fn root_table(&self, core: usize) -> Option<PhysicalAddress>;

    /// Tables handed out so far, roots included.
    fn tables_allocated(&self) -> usize;

    /// Where a table is reachable through the self-map.
    fn table_virtual_address(&self, pa: PhysicalAddress) -> Option<VirtualAddress>;

    fn handoff(&self) -> Handoff;
}

/// [`TranslationScheme`] for the table format `F`.
pub struct Scheme<F: TableFormat, M: PhysMapper> {
    mapper: M,
    tables: TableAllocator<F>,
    roots: Box<[PhysicalAddress]>,
    layout: VmemLayout,
    /// Next free address of the auto-assign window.
    auto_next: u64,
    _format: PhantomData<F>,
}

/// A page-granular request after alignment.
#[derive(Copy, Clone, Debug)]
struct PageRun {
    pa: PhysicalAddress,
    offset: u64,
    span: u64,
}

impl<F: TableFormat, M: PhysMapper> Scheme<F, M> {
    /// Allocate the per-core roots and install the self-map.
    ///
    /// # Errors
    /// [`MmuError::InvalidCoreCount`] or allocator exhaustion.
    pub fn new<A: FrameAlloc + ?Sized>(
        mapper: M,
        alloc: &mut A,
        config: &VmemConfig,
    ) -> Result<Self, MmuError> {
        config.validate()?;
        let layout = config.layout;
        let self_map = VirtualAddress::try_from_u64(layout.self_map_base).ok_or(
            MmuError::VirtualOutOfRange {
                addr: VirtualAddress::zero(),
                len: layout.self_map_base,
            },
        )?;
        if !self_map.is_aligned::<F::Block>() {
            return Err(MmuError::Misaligned {
                addr: layout.self_map_base,
                granule: F::Block::SIZE,
            });
        }

        let mut tables = TableAllocator::new(self_map);
        let roots = tables.allocate_root_tables(alloc, &mapper, config.cores)?;
        log::info!("{} tables for {} cores", F::FORMAT, roots.len());

        Ok(Self {
            mapper,
            tables,
            roots,
            layout,
            auto_next: layout.auto_base,
            _format: PhantomData,
        })
    }

    #[must_use]
    pub const fn layout(&self) -> &VmemLayout {
        &self.layout
    }

    /// Align a `(pa, len)` request to pages and check the physical range.
    fn page_run(pa: PhysicalAddress, len: u64) -> Result<PageRun, MmuError> {
        let (page, offset) = pa.split::<Size4K>();
        let offset = offset.as_u64();
        let span = if len == 0 {
            0
        } else {
            offset
                .checked_add(len)
                .and_then(|end| checked_align_up(end, PAGE_SIZE))
                .ok_or(MmuError::PhysicalOutOfRange {
                    addr: pa,
                    limit: F::physical_limit(),
                })?
        };
        let run = PageRun {
            pa: page.base(),
            offset,
            span,
        };
        Self::check_physical(run.pa, span)?;
        Ok(run)
    }

    fn check_physical(pa: PhysicalAddress, len: u64) -> Result<(), MmuError> {
        let limit = F::physical_limit();
        match pa.as_u64().checked_add(len) {
            Some(end) if end <= limit && pa.as_u64() < limit => Ok(()),
            _ => Err(MmuError::PhysicalOutOfRange { addr: pa, limit }),
        }
    }

    fn check_virtual(&self, va: VirtualAddress, len: u64) -> Result<(), MmuError> {
        match va.as_u64().checked_add(len) {
            Some(end) if end <= VirtualAddress::LIMIT => {}
            _ => return Err(MmuError::VirtualOutOfRange { addr: va, len }),
        }
        if self.layout.touches_self_map(va.as_u64(), len) {
            return Err(MmuError::ReservedWindow { addr: va });
        }
        Ok(())
    }

    fn check_block_aligned(addr: u64) -> Result<(), MmuError> {
        if addr % F::Block::SIZE == 0 {
            Ok(())
        } else {
            Err(MmuError::Misaligned {
                addr,
                granule: F::Block::SIZE,
            })
        }
    }

    /// Bump the auto-assign cursor by `span` bytes.
    fn assign(&mut self, span: u64) -> Result<VirtualAddress, MmuError> {
        let start = self.auto_next;
        let end = start
            .checked_add(span)
            .filter(|&end| end <= self.layout.auto_end)
            .ok_or(MmuError::AutoWindowExhausted { len: span })?;
        let va = VirtualAddress::try_from_u64(start)
            .ok_or(MmuError::AutoWindowExhausted { len: span })?;
        self.auto_next = end;
        Ok(va)
    }

    fn core_root(&self, core: usize) -> Result<PhysicalAddress, MmuError> {
        self.roots.get(core).copied().ok_or(MmuError::NoSuchCore {
            core,
            cores: self.roots.len(),
        })
    }

    /// Write the 4 KiB leaves of one run into one core's hierarchy.
    fn map_pages(
        &mut self,
        root: PhysicalAddress,
        va: VirtualAddress,
        pa: PhysicalAddress,
        span: u64,
        prot: Protection,
    ) -> Result<(), MmuError> {
        let leaf_level = F::leaf_level();
        let geometry = F::LEVELS[leaf_level];
        let mut offset = 0;
        while offset < span {
            let page_va = va
                .checked_add(offset)
                .ok_or(MmuError::VirtualOutOfRange { addr: va, len: span })?;
            let table = ensure_table(&mut self.tables, &self.mapper, root, page_va, leaf_level)?;
            write_slot::<F, M>(
                &self.mapper,
                table,
                geometry.index(page_va),
                F::page(pa + offset, prot),
            );
            offset += PAGE_SIZE;
        }
        Ok(())
    }

    /// Addresses of the large-leaf slots covering `[va, va + len)`.
    fn blocks(va: VirtualAddress, len: u64) -> impl Iterator<Item = (VirtualAddress, u64)> {
        (0..len / F::Block::SIZE).filter_map(move |i| {
            let offset = i * F::Block::SIZE;
            va.checked_add(offset).map(|va| (va, offset))
        })
    }

    /// Fail with [`MmuError::TableConflict`] if any block slot in the range
    /// links a lower table on any core.
    fn check_block_slots(&self, va: VirtualAddress, len: u64) -> Result<(), MmuError> {
        let geometry = F::LEVELS[F::BLOCK_LEVEL];
        for &root in &self.roots {
            for (block_va, _) in Self::blocks(va, len) {
                let Some(table) = find_table::<F, M>(&self.mapper, root, block_va, F::BLOCK_LEVEL)
                else {
                    continue;
                };
                let raw = read_slot::<F, M>(&self.mapper, table, geometry.index(block_va));
                if let Slot::Table(_) = F::decode(F::BLOCK_LEVEL, raw) {
                    return Err(MmuError::TableConflict { addr: block_va });
                }
            }
        }
        Ok(())
    }
}

impl<F: TableFormat, M: PhysMapper> TranslationScheme for Scheme<F, M> {
    fn format(&self) -> TranslationFormat {
        F::FORMAT
    }

    fn cores(&self) -> usize {
        self.roots.len()
    }

    fn block_size(&self) -> u64 {
        F::Block::SIZE
    }

    fn map(
        &mut self,
        va: Option<VirtualAddress>,
        pa: PhysicalAddress,
        len: u64,
        prot: Protection,
    ) -> Result<VirtualAddress, MmuError> {
        let run = Self::page_run(pa, len)?;
        let base = match va {
            Some(va) => va.page::<Size4K>().base(),
            None => self.assign(run.span)?,
        };
        self.check_virtual(base, run.span)?;

        log::debug!(
            "map {base} -> {} ({:#x} bytes, {} cores)",
            run.pa,
            run.span,
            self.roots.len()
        );
        for core in 0..self.roots.len() {
            let root = self.roots[core];
            self.map_pages(root, base, run.pa, run.span, prot)?;
        }

        base.checked_add(run.offset)
            .ok_or(MmuError::VirtualOutOfRange { addr: base, len })
    }

    fn map_on_core(
        &mut self,
        core: usize,
        va: VirtualAddress,
        pa: PhysicalAddress,
        len: u64,
        prot: Protection,
    ) -> Result<VirtualAddress, MmuError> {
        let root = self.core_root(core)?;
        let run = Self::page_run(pa, len)?;
        let base = va.page::<Size4K>().base();
        self.check_virtual(base, run.span)?;
        if base.as_u64() + run.span > self.layout.shared_base {
            return Err(MmuError::SharedRegion { addr: base });
        }

        log::debug!(
            "map {base} -> {} ({:#x} bytes, core {core})",
            run.pa,
            run.span
        );
        self.map_pages(root, base, run.pa, run.span, prot)?;

        base.checked_add(run.offset)
            .ok_or(MmuError::VirtualOutOfRange { addr: base, len })
    }

    fn block_map(
        &mut self,
        va: VirtualAddress,
        pa: PhysicalAddress,
        len: u64,
        prot: Protection,
    ) -> Result<VirtualAddress, MmuError> {
        Self::check_block_aligned(va.as_u64())?;
        Self::check_block_aligned(pa.as_u64())?;
        Self::check_block_aligned(va.as_u64().saturating_add(len))?;
        Self::check_physical(pa, len)?;
        self.check_virtual(va, len)?;
        self.check_block_slots(va, len)?;

        log::debug!(
            "block map {va} -> {pa} ({} x {}, {} cores)",
            len / F::Block::SIZE,
            F::Block::as_str(),
            self.roots.len()
        );
        let geometry = F::LEVELS[F::BLOCK_LEVEL];
        for core in 0..self.roots.len() {
            let root = self.roots[core];
            for (block_va, offset) in Self::blocks(va, len) {
                let table =
                    ensure_table(&mut self.tables, &self.mapper, root, block_va, F::BLOCK_LEVEL)?;
                write_slot::<F, M>(
                    &self.mapper,
                    table,
                    geometry.index(block_va),
                    F::block(pa + offset, prot),
                );
            }
        }
        Ok(va)
    }

    fn block_unmap(&mut self, va: VirtualAddress, len: u64) -> Result<(), MmuError> {
        Self::check_block_aligned(va.as_u64())?;
        Self::check_block_aligned(va.as_u64().saturating_add(len))?;
        self.check_virtual(va, len)?;
        self.check_block_slots(va, len)?;

        log::debug!("block unmap {va} ({} x {})", len / F::Block::SIZE, F::Block::as_str());
        let geometry = F::LEVELS[F::BLOCK_LEVEL];
        for &root in &self.roots {
            for (block_va, _) in Self::blocks(va, len) {
                let Some(table) = find_table::<F, M>(&self.mapper, root, block_va, F::BLOCK_LEVEL)
                else {
                    continue;
                };
                let index = geometry.index(block_va);
                let raw = read_slot::<F, M>(&self.mapper, table, index);
                if let Slot::Block(_) = F::decode(F::BLOCK_LEVEL, raw) {
                    write_slot::<F, M>(&self.mapper, table, index, F::Raw::default());
                }
            }
        }
        Ok(())
    }

    fn block_slots_free(&self, va: VirtualAddress, len: u64) -> bool {
        let geometry = F::LEVELS[F::BLOCK_LEVEL];
        self.roots.iter().all(|&root| {
            Self::blocks(va, len).all(|(block_va, _)| {
                find_table::<F, M>(&self.mapper, root, block_va, F::BLOCK_LEVEL).is_none_or(
                    |table| {
                        let raw = read_slot::<F, M>(&self.mapper, table, geometry.index(block_va));
                        matches!(F::decode(F::BLOCK_LEVEL, raw), Slot::Invalid)
                    },
                )
            })
        })
    }

    fn leaf(&self, core: usize, va: VirtualAddress) -> Option<LeafEntry> {
        let root = *self.roots.get(core)?;
        find_leaf::<F, M>(&self.mapper, root, va)
    }

    fn root_table(&self, core: usize) -> Option<PhysicalAddress> {
        self.roots.get(core).copied()
    }

    fn tables_allocated(&self) -> usize {
        self.tables.tables_allocated()
    }

    fn table_virtual_address(&self, pa: PhysicalAddress) -> Option<VirtualAddress> {
        self.tables.table_virtual_address(pa)
    }

    fn handoff(&self) -> Handoff {
        F::handoff(&self.roots)
    }
}
