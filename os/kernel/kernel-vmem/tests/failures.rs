mod common;

use common::{Probe, SimRam, boot};
use kernel_vmem::{
    BootVmem, FatalReporter, IdMmfr0Probe, MmuError, OrHalt, PhysicalAddress, Protection,
    TranslationFormat, VirtualAddress, VmemConfig, VmemLayout,
};

const MIB: u64 = 0x10_0000;

fn va(v: u32) -> VirtualAddress {
    VirtualAddress::new(v)
}

fn pa(p: u64) -> PhysicalAddress {
    PhysicalAddress::new(p)
}

struct PanicReporter;

impl FatalReporter for PanicReporter {
    fn halt(&self, err: &MmuError) -> ! {
        panic!("boot halted: {err}");
    }
}

#[test]
fn unknown_addressing_width_is_fatal() {
    let ram = SimRam::new(4 * MIB);
    let mut alloc = ram.allocator();
    let result = BootVmem::new(&Probe(36), &ram, &mut alloc, &VmemConfig::new(1));
    assert!(matches!(
        result,
        Err(MmuError::UnsupportedAddressing { bits: 36 })
    ));
    assert!(matches!(
        BootVmem::new(&IdMmfr0Probe(0x2), &ram, &mut alloc, &VmemConfig::new(1)),
        Err(MmuError::UnsupportedAddressing { bits: 0 })
    ));
    // Nothing was allocated.
    assert_eq!(alloc.allocations, 0);
}

#[test]
fn id_mmfr0_selects_lpae() {
    let ram = SimRam::new(4 * MIB);
    let mut alloc = ram.allocator();
    let vmem = BootVmem::new(&IdMmfr0Probe(0x1020_1105), &ram, &mut alloc, &VmemConfig::new(1))
        .unwrap();
    assert_eq!(vmem.format(), TranslationFormat::ExtendedLpae);
    assert_eq!(alloc.allocations, 1);
}

#[test]
fn zero_cores_rejected() {
    let ram = SimRam::new(4 * MIB);
    let mut alloc = ram.allocator();
    assert!(matches!(
        BootVmem::new(&Probe(32), &ram, &mut alloc, &VmemConfig::new(0)),
        Err(MmuError::InvalidCoreCount)
    ));
}

#[test]
fn allocator_exhaustion_is_fatal() {
    // Not enough RAM for a 2 MiB pool.
    let ram = SimRam::new(MIB);
    let mut alloc = ram.allocator();
    assert!(matches!(
        BootVmem::new(&Probe(40), &ram, &mut alloc, &VmemConfig::new(1)),
        Err(MmuError::AllocatorExhausted {
            size: 0x20_0000,
            align: 0x20_0000
        })
    ));
}

#[test]
#[should_panic(expected = "boot halted: table pool exhausted")]
fn table_pool_exhaustion_halts() {
    let ram = SimRam::new(4 * MIB);
    let mut vmem = boot(&ram, TranslationFormat::ShortDescriptor, 1);
    // Every 1 MiB slot needs its own 1 KiB page table.
    for slot in 0..0xC00u32 {
        vmem.map(
            Some(va(slot << 20)),
            pa(u64::from(slot) << 20),
            0x1000,
            Protection::RW,
        )
        .or_halt(&PanicReporter);
    }
}

#[test]
fn block_alignment_is_enforced() {
    for format in common::FORMATS {
        let ram = SimRam::new(4 * MIB);
        let mut vmem = boot(&ram, format, 1);
        let block = vmem.block_size();
        assert_eq!(
            vmem.block_map(va(0x8000_1000), pa(0x8000_0000), block, Protection::RWX),
            Err(MmuError::Misaligned {
                addr: 0x8000_1000,
                granule: block
            })
        );
        assert_eq!(
            vmem.block_map(va(0x8000_0000), pa(0x8008_0000), block, Protection::RWX),
            Err(MmuError::Misaligned {
                addr: 0x8008_0000,
                granule: block
            })
        );
        assert_eq!(
            vmem.block_map(va(0x8000_0000), pa(0x8000_0000), 0x1000, Protection::RWX),
            Err(MmuError::Misaligned {
                addr: 0x8000_1000,
                granule: block
            })
        );
        assert_eq!(
            vmem.block_unmap(va(0x8000_8000), block),
            Err(MmuError::Misaligned {
                addr: 0x8000_8000,
                granule: block
            })
        );
        assert_eq!(vmem.translate(0, va(0x8000_0000)), None);
    }
}

#[test]
fn physical_limit_depends_on_format() {
    let ram = SimRam::new(4 * MIB);
    let mut short = boot(&ram, TranslationFormat::ShortDescriptor, 1);
    assert_eq!(
        short.map(None, pa(0x1_0000_0000), 0x1000, Protection::RW),
        Err(MmuError::PhysicalOutOfRange {
            addr: pa(0x1_0000_0000),
            limit: 1 << 32
        })
    );
    assert_eq!(
        short.map(None, pa(0xFFFF_F000), 0x2000, Protection::RW),
        Err(MmuError::PhysicalOutOfRange {
            addr: pa(0xFFFF_F000),
            limit: 1 << 32
        })
    );
    assert_eq!(
        short.block_map(va(0x4000_0000), pa(0x1_0000_0000), MIB, Protection::RW),
        Err(MmuError::PhysicalOutOfRange {
            addr: pa(0x1_0000_0000),
            limit: 1 << 32
        })
    );

    let ram = SimRam::new(4 * MIB);
    let mut lpae = boot(&ram, TranslationFormat::ExtendedLpae, 1);
    let v = lpae
        .map(None, pa(0x1_0000_0000), 0x1000, Protection::RW)
        .unwrap();
    assert_eq!(lpae.translate(0, v), Some(pa(0x1_0000_0000)));
    assert!(matches!(
        lpae.map(None, pa(1 << 40), 0x1000, Protection::RW),
        Err(MmuError::PhysicalOutOfRange { .. })
    ));
}

#[test]
fn virtual_range_must_fit_32_bits() {
    let ram = SimRam::new(4 * MIB);
    let mut vmem = boot(&ram, TranslationFormat::ShortDescriptor, 1);
    assert_eq!(
        vmem.map(Some(va(0xFFFF_F000)), pa(0x1000), 0x2000, Protection::RW),
        Err(MmuError::VirtualOutOfRange {
            addr: va(0xFFFF_F000),
            len: 0x2000
        })
    );
}

#[test]
fn pages_never_replace_blocks_and_blocks_never_replace_tables() {
    for format in common::FORMATS {
        let ram = SimRam::new(4 * MIB);
        let mut vmem = boot(&ram, format, 2);
        let block = vmem.block_size();
        vmem.block_map(va(0x8000_0000), pa(0x8000_0000), block, Protection::RWX)
            .unwrap();
        assert_eq!(
            vmem.map(Some(va(0x8000_3000)), pa(0x1000), 0x1000, Protection::RW),
            Err(MmuError::BlockConflict {
                addr: va(0x8000_3000)
            })
        );

        vmem.map(Some(va(0x9000_0000)), pa(0x1000), 0x1000, Protection::RW)
            .unwrap();
        assert_eq!(
            vmem.block_map(va(0x9000_0000), pa(0x9000_0000), block, Protection::RW),
            Err(MmuError::TableConflict {
                addr: va(0x9000_0000)
            })
        );
        assert_eq!(
            vmem.block_unmap(va(0x9000_0000), block),
            Err(MmuError::TableConflict {
                addr: va(0x9000_0000)
            })
        );
        // Both mappings are intact on every core.
        for core in 0..2 {
            assert_eq!(vmem.translate(core, va(0x8000_3000)), Some(pa(0x8000_3000)));
            assert_eq!(vmem.translate(core, va(0x9000_0000)), Some(pa(0x1000)));
        }
    }
}

#[test]
fn auto_window_exhaustion() {
    let layout = VmemLayout {
        auto_base: 0xE000_0000,
        auto_end: 0xE000_4000,
        ..VmemLayout::DEFAULT
    };
    let ram = SimRam::new(4 * MIB);
    let mut alloc = ram.allocator();
    let mut vmem = BootVmem::new(
        &Probe(32),
        &ram,
        &mut alloc,
        &VmemConfig::new(1).with_layout(layout),
    )
    .unwrap();
    vmem.map(None, pa(0x1000_0000), 0x3000, Protection::RW)
        .unwrap();
    assert_eq!(
        vmem.map(None, pa(0x1000_0000), 0x2000, Protection::RW),
        Err(MmuError::AutoWindowExhausted { len: 0x2000 })
    );
    let last = vmem
        .map(None, pa(0x2000_0000), 0x1000, Protection::RW)
        .unwrap();
    assert_eq!(last, va(0xE000_3000));
}

#[test]
fn segments_are_sealed_after_finalize() {
    let ram = SimRam::new(4 * MIB);
    let mut vmem = boot(&ram, TranslationFormat::ExtendedLpae, 1);
    let mut segments = vmem.segments();
    segments.finalize().unwrap();
    assert_eq!(
        segments.push(kernel_vmem::Segment::new(
            va(0xC000_0000),
            pa(0x8000_0000),
            0x1000,
            Protection::RX
        )),
        Err(MmuError::SegmentSealed)
    );
}
