use crate::MmuError;
use kernel_info::memory::{
    AUTO_MAP_BASE, AUTO_MAP_END, SELF_MAP_BASE, SELF_MAP_SIZE, SHARED_REGION_BASE,
};

/// Virtual address space split used by the mapper.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VmemLayout {
    /// Start of the shared region; `map_on_core` stays below it.
    pub shared_base: u64,
    /// Auto-assign window `[auto_base, auto_end)`.
    pub auto_base: u64,
    pub auto_end: u64,
    /// Reserved self-map window `[self_map_base, self_map_base + self_map_size)`.
    pub self_map_base: u64,
    pub self_map_size: u64,
}

impl VmemLayout {
    pub const DEFAULT: Self = Self {
        shared_base: SHARED_REGION_BASE,
        auto_base: AUTO_MAP_BASE,
        auto_end: AUTO_MAP_END,
        self_map_base: SELF_MAP_BASE,
        self_map_size: SELF_MAP_SIZE,
    };

    #[inline]
    #[must_use]
    pub const fn self_map_end(&self) -> u64 {
        self.self_map_base + self.self_map_size
    }

    /// Whether `[va, va + len)` overlaps the self-map window.
    #[inline]
    #[must_use]
    pub const fn touches_self_map(&self, va: u64, len: u64) -> bool {
        len != 0 && va < self.self_map_end() && va + len > self.self_map_base
    }
}

impl Default for VmemLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Runtime configuration of the table builder.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VmemConfig {
    /// Number of cores; one table hierarchy each.
    pub cores: usize,
    pub layout: VmemLayout,
}

impl VmemConfig {
    #[must_use]
    pub const fn new(cores: usize) -> Self {
        Self {
            cores,
            layout: VmemLayout::DEFAULT,
        }
    }

    #[must_use]
    pub const fn with_layout(mut self, layout: VmemLayout) -> Self {
        self.layout = layout;
        self
    }

    /// # Errors
    /// [`MmuError::InvalidCoreCount`] for zero cores.
    pub const fn validate(&self) -> Result<(), MmuError> {
        if self.cores == 0 {
            return Err(MmuError::InvalidCoreCount);
        }
        Ok(())
    }
}
