#![allow(dead_code)]

use kernel_vmem::{
    AddressingProbe, BootVmem, FrameAlloc, PhysMapper, PhysicalAddress, TranslationFormat,
    VmemConfig,
};
use kernel_qemu::QemuLogger;
use std::cell::UnsafeCell;
use std::sync::Once;

/// Physical address of the first byte of simulated RAM.
pub const RAM_BASE: u64 = 0x8000_0000;

/// Simulated physical RAM: `PA = RAM_BASE + offset` into a host buffer.
pub struct SimRam {
    words: UnsafeCell<Box<[u64]>>,
    base: u64,
    bytes: u64,
}

impl SimRam {
    pub fn new(bytes: u64) -> Self {
        Self::at(RAM_BASE, bytes)
    }

    pub fn at(base: u64, bytes: u64) -> Self {
        let words = vec![0u64; usize::try_from(bytes / 8).unwrap()].into_boxed_slice();
        Self {
            words: UnsafeCell::new(words),
            base,
            bytes,
        }
    }

    /// Bump allocator over this RAM.
    pub fn allocator(&self) -> SimAlloc {
        SimAlloc {
            next: self.base,
            end: self.base + self.bytes,
            allocations: 0,
        }
    }

    pub fn read_u32(&self, pa: PhysicalAddress) -> u32 {
        // SAFETY: `phys_to_ptr` asserts the address is inside the buffer.
        unsafe { self.phys_to_ptr(pa).cast::<u32>().read() }
    }

    pub fn read_u64(&self, pa: PhysicalAddress) -> u64 {
        // SAFETY: as above.
        unsafe { self.phys_to_ptr(pa).cast::<u64>().read() }
    }

    /// Snapshot of `entries` 32-bit slots starting at `pa`.
    pub fn snapshot_u32(&self, pa: PhysicalAddress, entries: usize) -> Vec<u32> {
        (0..entries as u64)
            .map(|i| self.read_u32(pa + i * 4))
            .collect()
    }
}

impl PhysMapper for SimRam {
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        let offset = pa.as_u64() - self.base;
        assert!(offset < self.bytes, "{pa} outside simulated RAM");
        // SAFETY: `offset` is within the buffer.
        unsafe {
            (*self.words.get())
                .as_mut_ptr()
                .cast::<u8>()
                .add(usize::try_from(offset).unwrap())
        }
    }
}

/// Bump allocator handing out aligned blocks of [`SimRam`].
pub struct SimAlloc {
    next: u64,
    end: u64,
    pub allocations: usize,
}

impl FrameAlloc for SimAlloc {
    fn alloc(&mut self, size: u64, align: u64) -> Option<PhysicalAddress> {
        let start = self.next.next_multiple_of(align);
        if start + size > self.end {
            return None;
        }
        self.next = start + size;
        self.allocations += 1;
        Some(PhysicalAddress::new(start))
    }
}

/// Capability probe reporting a fixed width.
pub struct Probe(pub u8);

impl AddressingProbe for Probe {
    fn physical_address_bits(&self) -> u8 {
        self.0
    }
}

pub fn probe_for(format: TranslationFormat) -> Probe {
    Probe(format.physical_address_bits())
}

/// Route the crate's log output through the semihosting logger once per test binary.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = QemuLogger::new(log::LevelFilter::Trace).init();
    });
}

/// Boot a scheme of `format` for `cores` cores over `ram`.
pub fn boot(ram: &SimRam, format: TranslationFormat, cores: usize) -> BootVmem<'_> {
    init_logging();
    let mut alloc = ram.allocator();
    BootVmem::new(&probe_for(format), ram, &mut alloc, &VmemConfig::new(cores)).unwrap()
}

pub const FORMATS: [TranslationFormat; 2] = [
    TranslationFormat::ShortDescriptor,
    TranslationFormat::ExtendedLpae,
];
