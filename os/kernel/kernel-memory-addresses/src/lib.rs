//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses and page bases used by the
//! boot-time translation-table builder.
//!
//! ## Overview
//!
//! This crate defines a minimal set of types that prevent mixing virtual and
//! physical addresses at compile time while remaining zero-cost wrappers around
//! `u64` values.
//!
//! | Concept | Generic | Description |
//! |----------|----------|-------------|
//! | [`MemoryAddress`] | – | A raw address, either physical or virtual. |
//! | [`MemoryPage<S>`] | [`S: PageSize`](PageSize) | A page-aligned base address of a page of size `S`. |
//! | [`MemoryAddressOffset<S>`] | [`S: PageSize`](PageSize) | An offset within a page of size `S`. |
//!
//! These are then wrapped to distinguish between virtual and physical spaces:
//!
//! | Wrapper | Meaning |
//! |----------|----------|
//! | [`VirtualAddress`] / [`VirtualPage<S>`] | 32-bit virtual (translated) addresses. |
//! | [`PhysicalAddress`] / [`PhysicalPage<S>`] | Physical memory or device registers, up to 40 bits. |
//!
//! ## Page Sizes
//!
//! The three granules used by the ARM translation formats are available as
//! marker types implementing [`PageSize`]:
//!
//! - [`Size4K`]: 4 KiB small pages (both formats)
//! - [`Size1M`]: 1 MiB sections (short-descriptor format)
//! - [`Size2M`]: 2 MiB blocks (long-descriptor / LPAE format)
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0xC000_1234);
//! let (page, off) = va.split::<Size4K>();
//! assert_eq!(page.base().as_u32(), 0xC000_1000);
//! assert_eq!(page.join(off), va);
//!
//! let pa = PhysicalAddress::new(0x0000_0001_2000_0042);
//! let (pp, po) = pa.split::<Size2M>();
//! assert_eq!(pp.join(po), pa);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod memory_address;
mod memory_address_offset;
mod memory_page;
mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use crate::memory_address::MemoryAddress;
pub use crate::memory_address_offset::MemoryAddressOffset;
pub use crate::memory_page::MemoryPage;
pub use crate::page_size::{PageSize, Size1M, Size2M, Size4K};
pub use crate::physical_address::PhysicalAddress;
pub use crate::physical_page::PhysicalPage;
pub use crate::virtual_address::VirtualAddress;
pub use crate::virtual_page::VirtualPage;
