//! # Protection and Memory Type
//!
//! Format-independent description of what a leaf mapping permits and how
//! the memory behind it is accessed. The descriptor encoders translate a
//! [`Protection`] into AP/XN/TEX/C/B bits (short descriptors) or
//! AP/XN/PXN/AttrIndx/SH bits (long descriptors).

bitflags::bitflags! {
    /// Access rights of a mapping.
    ///
    /// Privileged code can always read a mapping; `USER` additionally grants
    /// unprivileged access with the same read/write rights.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct Access: u8 {
        const READ    = 1 << 0;
        const WRITE   = 1 << 1;
        const EXECUTE = 1 << 2;
        /// Unprivileged (PL0) code may access the mapping.
        const USER    = 1 << 3;
    }
}

/// Memory type of a leaf mapping.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum MemoryType {
    /// Normal memory, inner/outer write-back, write-allocate.
    #[default]
    Normal,
    /// Normal memory, inner/outer non-cacheable.
    NonCacheable,
    /// Device memory (peripheral registers).
    Device,
    /// Strongly-ordered memory.
    StronglyOrdered,
}

/// Shareability domain of a leaf mapping.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Shareability {
    NonShareable,
    OuterShareable,
    #[default]
    InnerShareable,
}

impl Shareability {
    #[inline]
    #[must_use]
    pub const fn is_shared(self) -> bool {
        !matches!(self, Self::NonShareable)
    }
}

/// Protection and type descriptor of a mapping request.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Protection {
    pub access: Access,
    pub memory: MemoryType,
    pub shareability: Shareability,
}

impl Protection {
    /// Kernel data.
    pub const RW: Self = Self::normal(Access::READ.union(Access::WRITE));

    /// Early boot code and data (the boot image runs from one window).
    pub const RWX: Self = Self::normal(
        Access::READ
            .union(Access::WRITE)
            .union(Access::EXECUTE),
    );

    /// Read-only data.
    pub const RO: Self = Self::normal(Access::READ);

    /// Kernel text.
    pub const RX: Self = Self::normal(Access::READ.union(Access::EXECUTE));

    /// Peripheral registers.
    pub const DEVICE: Self = Self {
        access: Access::READ.union(Access::WRITE),
        memory: MemoryType::Device,
        shareability: Shareability::OuterShareable,
    };

    #[inline]
    #[must_use]
    pub const fn normal(access: Access) -> Self {
        Self {
            access,
            memory: MemoryType::Normal,
            shareability: Shareability::InnerShareable,
        }
    }

    #[inline]
    #[must_use]
    pub const fn with_memory(mut self, memory: MemoryType) -> Self {
        self.memory = memory;
        self
    }

    #[inline]
    #[must_use]
    pub const fn with_shareability(mut self, shareability: Shareability) -> Self {
        self.shareability = shareability;
        self
    }

    #[inline]
    #[must_use]
    pub const fn with_user(mut self) -> Self {
        self.access = self.access.union(Access::USER);
        self
    }

    #[inline]
    #[must_use]
    pub const fn writable(self) -> bool {
        self.access.contains(Access::WRITE)
    }

    #[inline]
    #[must_use]
    pub const fn executable(self) -> bool {
        self.access.contains(Access::EXECUTE)
    }

    #[inline]
    #[must_use]
    pub const fn user(self) -> bool {
        self.access.contains(Access::USER)
    }

    /// AP\[2:1\] in the simplified access permission model:
    /// `0b00` privileged RW, `0b01` RW at any level,
    /// `0b10` privileged RO, `0b11` RO at any level.
    #[inline]
    #[must_use]
    pub const fn access_permissions(self) -> u8 {
        let read_only = if self.writable() { 0 } else { 0b10 };
        let user = if self.user() { 0b01 } else { 0 };
        read_only | user
    }
}

impl Default for Protection {
    fn default() -> Self {
        Self::RW
    }
}
