use crate::{MemoryAddress, MemoryAddressOffset, PageSize, VirtualPage};
use core::fmt;

/// Virtual memory address in the 32-bit ARM address space.
///
/// A thin wrapper around [`MemoryAddress`] that denotes **virtual** addresses.
/// Construction takes a `u32`, so every value is inside the 4 GiB space both
/// translation formats cover. Arithmetic that would leave it is `checked_*`.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0xC010_1234);
/// let (vp, off) = va.split::<Size4K>();
/// assert_eq!(vp.base().as_u32(), 0xC010_1000);
/// assert_eq!(vp.join(off), va);
/// assert!(VirtualAddress::new(0xFFFF_F000).checked_add(0x1000).is_none());
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(pub(crate) MemoryAddress);

impl VirtualAddress {
    /// One past the highest virtual address.
    pub const LIMIT: u64 = 1 << 32;

    #[inline]
    #[must_use]
    pub const fn new(v: u32) -> Self {
        Self(MemoryAddress::new(v as u64))
    }

    /// Construct from a `u64`, or `None` if it is outside the 32-bit space.
    #[inline]
    #[must_use]
    pub const fn try_from_u64(v: u64) -> Option<Self> {
        if v < Self::LIMIT {
            Some(Self(MemoryAddress::new(v)))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.as_u64()
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn as_u32(self) -> u32 {
        self.0.as_u64() as u32
    }

    #[inline]
    #[must_use]
    pub const fn as_addr(self) -> MemoryAddress {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn page<S: PageSize>(self) -> VirtualPage<S> {
        VirtualPage::<S>(self.0.page::<S>())
    }

    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> MemoryAddressOffset<S> {
        self.0.offset::<S>()
    }

    #[inline]
    #[must_use]
    pub const fn split<S: PageSize>(self) -> (VirtualPage<S>, MemoryAddressOffset<S>) {
        (self.page::<S>(), self.offset::<S>())
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned<S: PageSize>(self) -> bool {
        self.0.is_aligned::<S>()
    }

    /// Add `rhs`, staying inside the 32-bit space.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u64) -> Option<Self> {
        match self.0.as_u64().checked_add(rhs) {
            Some(v) => Self::try_from_u64(v),
            None => None,
        }
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:08X})", self.as_u64())
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.as_u64())
    }
}

impl From<u32> for VirtualAddress {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

impl<S> From<VirtualPage<S>> for VirtualAddress
where
    S: PageSize,
{
    fn from(value: VirtualPage<S>) -> Self {
        value.base()
    }
}
