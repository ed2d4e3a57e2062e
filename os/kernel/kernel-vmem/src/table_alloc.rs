//! # Table Allocator
//!
//! All translation tables come from one **pool**: a single large-leaf
//! granule (1 MiB for short descriptors, 2 MiB for LPAE) obtained from the
//! external [`FrameAlloc`] on the first call to
//! [`allocate_root_tables`](TableAllocator::allocate_root_tables).
//!
//! ## Design notes
//!
//! - **Bump only**: tables are carved front to back, each aligned to its own
//!   size, and never freed. Ownership of the pool passes to the next boot
//!   stage with the [`Handoff`](crate::Handoff).
//! - **Self-map**: because the pool is exactly one granule and granule
//!   aligned, a single large leaf at the layout's self-map base makes every
//!   table reachable by virtual address once translation is enabled. It is
//!   written into each root right after the roots are carved and the mapper
//!   refuses to touch that window afterwards.
//! - Tables are zeroed on hand-out, so a fresh table holds only fault
//!   entries.

use crate::descriptor::TableFormat;
use crate::walk::{ensure_table, write_slot};
use crate::{FrameAlloc, MmuError, PhysMapper, Protection};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::marker::PhantomData;
use kernel_memory_addresses::{PageSize, PhysicalAddress, VirtualAddress};

/// The physical block all tables are carved from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TablePool {
    base: PhysicalAddress,
    size: u64,
    used: u64,
}

impl TablePool {
    /// Reserve a pool of `size` bytes aligned to `size`.
    ///
    /// # Errors
    /// [`MmuError::AllocatorExhausted`] if the allocator has nothing left.
    pub fn reserve<A: FrameAlloc + ?Sized>(alloc: &mut A, size: u64) -> Result<Self, MmuError> {
        let base = alloc
            .alloc(size, size)
            .ok_or(MmuError::AllocatorExhausted { size, align: size })?;
        debug_assert!(base.as_addr().is_aligned_to(size));
        Ok(Self {
            base,
            size,
            used: 0,
        })
    }

    /// Carve `bytes` aligned to `bytes`.
    ///
    /// # Errors
    /// [`MmuError::TablePoolExhausted`] once the pool is full.
    pub fn carve(&mut self, bytes: u64) -> Result<PhysicalAddress, MmuError> {
        let start = crate::checked_align_up(self.used, bytes)
            .filter(|start| start + bytes <= self.size)
            .ok_or(MmuError::TablePoolExhausted { size: bytes })?;
        self.used = start + bytes;
        Ok(self.base + start)
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Bytes handed out so far, including alignment padding.
    #[inline]
    #[must_use]
    pub const fn used(&self) -> u64 {
        self.used
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, pa: PhysicalAddress) -> bool {
        pa >= self.base && pa.as_u64() - self.base.as_u64() < self.size
    }
}

/// Hands out root and lower-level tables for format `F`.
pub struct TableAllocator<F: TableFormat> {
    pool: Option<TablePool>,
    self_map_base: VirtualAddress,
    tables: usize,
    _format: PhantomData<F>,
}

impl<F: TableFormat> TableAllocator<F> {
    /// An allocator that has not reserved its pool yet.
    #[must_use]
    pub const fn new(self_map_base: VirtualAddress) -> Self {
        Self {
            pool: None,
            self_map_base,
            tables: 0,
            _format: PhantomData,
        }
    }

    /// Carve one first-level table per core and self-map the pool in each.
    ///
    /// The first call reserves the pool from `alloc`.
    ///
    /// # Errors
    /// - [`MmuError::InvalidCoreCount`] for zero cores.
    /// - [`MmuError::AllocatorExhausted`] / [`MmuError::TablePoolExhausted`].
    pub fn allocate_root_tables<A, M>(
        &mut self,
        alloc: &mut A,
        mapper: &M,
        core_count: usize,
    ) -> Result<Box<[PhysicalAddress]>, MmuError>
    where
        A: FrameAlloc + ?Sized,
        M: PhysMapper + ?Sized,
    {
        if core_count == 0 {
            return Err(MmuError::InvalidCoreCount);
        }

        let pool = match self.pool {
            Some(pool) => pool,
            None => {
                let pool = TablePool::reserve(alloc, F::Block::SIZE)?;
                log::info!(
                    "{} table pool at {} ({} bytes)",
                    F::FORMAT,
                    pool.base(),
                    pool.size()
                );
                self.pool = Some(pool);
                pool
            }
        };

        let mut roots = Vec::with_capacity(core_count);
        for _ in 0..core_count {
            roots.push(self.allocate_table(mapper, 0)?);
        }

        let window = self.self_map_base;
        let index = F::LEVELS[F::BLOCK_LEVEL].index(window);
        for (core, &root) in roots.iter().enumerate() {
            let table = ensure_table(self, mapper, root, window, F::BLOCK_LEVEL)?;
            write_slot::<F, M>(mapper, table, index, F::block(pool.base(), Protection::RW));
            log::debug!("core {core}: root {root}, pool self-mapped at {window}");
        }

        Ok(roots.into_boxed_slice())
    }

    /// One zeroed table for `level` (1 or 2).
    ///
    /// # Errors
    /// [`MmuError::TablePoolExhausted`] once the pool is full (or before it
    /// was reserved).
    pub fn allocate_lower_table<M: PhysMapper + ?Sized>(
        &mut self,
        mapper: &M,
        level: usize,
    ) -> Result<PhysicalAddress, MmuError> {
        debug_assert!(level > 0 && level < F::LEVELS.len());
        self.allocate_table(mapper, level)
    }

    fn allocate_table<M: PhysMapper + ?Sized>(
        &mut self,
        mapper: &M,
        level: usize,
    ) -> Result<PhysicalAddress, MmuError> {
        let bytes = F::LEVELS[level].table_bytes;
        let pool = self
            .pool
            .as_mut()
            .ok_or(MmuError::TablePoolExhausted { size: bytes })?;
        let pa = pool.carve(bytes)?;
        // SAFETY: `pa..pa + bytes` lies inside the pool and belongs to no other table.
        #[allow(clippy::cast_possible_truncation)]
        unsafe {
            mapper.phys_to_ptr(pa).write_bytes(0, bytes as usize);
        }
        self.tables += 1;
        Ok(pa)
    }

    /// Virtual address of a pool table through the self-map.
    #[must_use]
    pub fn table_virtual_address(&self, pa: PhysicalAddress) -> Option<VirtualAddress> {
        let pool = self.pool.as_ref().filter(|pool| pool.contains(pa))?;
        self.self_map_base
            .checked_add(pa.as_u64() - pool.base().as_u64())
    }

    /// Number of tables handed out, roots included.
    #[inline]
    #[must_use]
    pub const fn tables_allocated(&self) -> usize {
        self.tables
    }

    #[inline]
    #[must_use]
    pub const fn pool(&self) -> Option<&TablePool> {
        self.pool.as_ref()
    }
}
