mod common;

use common::{FORMATS, SimRam, boot};
use kernel_vmem::info::SELF_MAP_BASE;
use kernel_vmem::{
    LongDescriptor, MmuError, PhysicalAddress, Protection, ShortDescriptor, TableFormat,
    TranslationFormat, VirtualAddress,
};

const MIB: u64 = 0x10_0000;

fn va(v: u32) -> VirtualAddress {
    VirtualAddress::new(v)
}

fn pa(p: u64) -> PhysicalAddress {
    PhysicalAddress::new(p)
}

#[test]
fn mapped_range_translates_on_every_core() {
    for format in FORMATS {
        let ram = SimRam::new(4 * MIB);
        let mut vmem = boot(&ram, format, 4);
        let base = va(0xC080_0000);
        let len = 0x7_3456;
        vmem.map(Some(base), pa(0x9012_3000), len, Protection::RW)
            .unwrap();

        for core in 0..4 {
            let mut o = 0;
            while o < len {
                let v = base.checked_add(o).unwrap();
                assert_eq!(vmem.translate(core, v), Some(pa(0x9012_3000 + o)), "{format}");
                let inner = v.checked_add(0x123).unwrap();
                assert_eq!(vmem.translate(core, inner), Some(pa(0x9012_3123 + o)));
                o += 0x1000;
            }
            // Rounded up to whole pages, nothing beyond.
            assert_eq!(vmem.translate(core, base.checked_add(0x7_4000).unwrap()), None);
        }
    }
}

#[test]
fn sub_page_offset_is_carried_into_the_result() {
    for format in FORMATS {
        let ram = SimRam::new(4 * MIB);
        let mut vmem = boot(&ram, format, 1);
        let v = vmem
            .map(None, pa(0x1C09_0040), 0x20, Protection::DEVICE)
            .unwrap();
        assert_eq!(v.as_u64() & 0xFFF, 0x40);
        assert_eq!(vmem.translate(0, v), Some(pa(0x1C09_0040)));

        // An explicit, unaligned VA is aligned down before the offset is added.
        let v = vmem
            .map(Some(va(0xC000_0ABC)), pa(0x1C0A_0010), 0x10, Protection::DEVICE)
            .unwrap();
        assert_eq!(v, va(0xC000_0010));

        // A short range straddling a page boundary needs both pages.
        let v = vmem
            .map_on_core(0, va(0x0001_0F00), pa(0x1C0B_0FF8), 0x10, Protection::DEVICE)
            .unwrap();
        assert_eq!(v, va(0x0001_0FF8));
        assert_eq!(
            vmem.translate(0, va(0x0001_1004)),
            Some(pa(0x1C0B_1004))
        );
        assert_eq!(vmem.translate(0, va(0x0001_2000)), None);
    }
}

#[test]
fn map_is_idempotent() {
    for format in FORMATS {
        let ram = SimRam::new(4 * MIB);
        let mut vmem = boot(&ram, format, 2);
        let base = va(0xC040_0000);
        vmem.map(Some(base), pa(0x8100_0000), 0x30_0000, Protection::RWX)
            .unwrap();
        let tables = vmem.tables_allocated();
        let before: Vec<_> = (0..0x300)
            .map(|i| vmem.leaf(1, base.checked_add(i * 0x1000).unwrap()))
            .collect();

        vmem.map(Some(base), pa(0x8100_0000), 0x30_0000, Protection::RWX)
            .unwrap();
        assert_eq!(vmem.tables_allocated(), tables, "{format}");
        let after: Vec<_> = (0..0x300)
            .map(|i| vmem.leaf(1, base.checked_add(i * 0x1000).unwrap()))
            .collect();
        assert_eq!(before, after);
    }
}

#[test]
fn replicas_are_bit_identical() {
    let ram = SimRam::new(4 * MIB);
    let mut vmem = boot(&ram, TranslationFormat::ShortDescriptor, 3);
    let v = vmem
        .map(Some(va(0xD000_0000)), pa(0x4000_0000), 0x3000, Protection::RO)
        .unwrap();
    vmem.block_map(va(0x4000_0000), pa(0x4000_0000), 2 * MIB, Protection::RWX)
        .unwrap();

    let expected = u64::from(ShortDescriptor::page(pa(0x4000_1000), Protection::RO));
    let section = u64::from(ShortDescriptor::block(pa(0x4010_0000), Protection::RWX));
    for core in 0..3 {
        let leaf = vmem.leaf(core, v.checked_add(0x1000).unwrap()).unwrap();
        assert_eq!(leaf.raw, expected);
        let leaf = vmem.leaf(core, va(0x4010_0000)).unwrap();
        assert_eq!(leaf.raw, section);
    }

    let ram = SimRam::new(4 * MIB);
    let mut vmem = boot(&ram, TranslationFormat::ExtendedLpae, 3);
    vmem.map(Some(va(0xD000_0000)), pa(0xF_0000_0000), 0x1000, Protection::RW)
        .unwrap();
    let expected = LongDescriptor::page(pa(0xF_0000_0000), Protection::RW);
    for core in 0..3 {
        assert_eq!(vmem.leaf(core, va(0xD000_0000)).unwrap().raw, expected);
    }
}

#[test]
fn block_unmap_clears_exactly_the_mapped_slots() {
    let ram = SimRam::new(4 * MIB);
    let mut vmem = boot(&ram, TranslationFormat::ShortDescriptor, 2);
    vmem.block_map(va(0x3FF0_0000), pa(0x3FF0_0000), MIB, Protection::RW)
        .unwrap();
    vmem.block_map(va(0x4030_0000), pa(0x4030_0000), MIB, Protection::RW)
        .unwrap();

    let roots: Vec<_> = (0..2).map(|c| vmem.root_table(c).unwrap()).collect();
    let before: Vec<_> = roots.iter().map(|&r| ram.snapshot_u32(r, 4096)).collect();

    vmem.block_map(va(0x4000_0000), pa(0x9000_0000), 3 * MIB, Protection::RW)
        .unwrap();
    for core in 0..2 {
        let changed = ram
            .snapshot_u32(roots[core], 4096)
            .iter()
            .zip(&before[core])
            .filter(|(a, b)| a != b)
            .count();
        assert_eq!(changed, 3);
    }

    vmem.block_unmap(va(0x4000_0000), 3 * MIB).unwrap();
    for core in 0..2 {
        assert_eq!(ram.snapshot_u32(roots[core], 4096), before[core]);
        assert_eq!(vmem.translate(core, va(0x4010_0000)), None);
        assert_eq!(vmem.translate(core, va(0x3FF0_0000)), Some(pa(0x3FF0_0000)));
        assert_eq!(vmem.translate(core, va(0x4030_0000)), Some(pa(0x4030_0000)));
    }

    // Unmapping empty slots is a no-op.
    vmem.block_unmap(va(0x4000_0000), 3 * MIB).unwrap();
}

#[test]
fn lpae_block_unmap_leaves_neighbours() {
    let ram = SimRam::new(4 * MIB);
    let mut vmem = boot(&ram, TranslationFormat::ExtendedLpae, 2);
    vmem.block_map(va(0x4000_0000), pa(0x4000_0000), 8 * MIB, Protection::RW)
        .unwrap();
    vmem.block_unmap(va(0x4020_0000), 4 * MIB).unwrap();
    for core in 0..2 {
        assert!(vmem.translate(core, va(0x4000_0000)).is_some());
        assert!(vmem.translate(core, va(0x4020_0000)).is_none());
        assert!(vmem.translate(core, va(0x4040_0000)).is_none());
        assert!(vmem.translate(core, va(0x4060_0000)).is_some());
    }
}

#[test]
fn self_map_survives_unrelated_operations() {
    for format in FORMATS {
        let ram = SimRam::new(4 * MIB);
        let mut vmem = boot(&ram, format, 2);
        let window = va(u32::try_from(SELF_MAP_BASE).unwrap());
        let before: Vec<_> = (0..2).map(|c| vmem.leaf(c, window)).collect();
        assert!(before.iter().all(Option::is_some));

        vmem.map(None, pa(0x1000_0000), 0x5000, Protection::RW).unwrap();
        vmem.block_map(va(0xC000_0000), pa(0x8000_0000), 4 * MIB, Protection::RWX)
            .unwrap();
        vmem.block_unmap(va(0xC000_0000), 4 * MIB).unwrap();
        vmem.map_on_core(1, va(0x0010_0000), pa(0x0010_0000), 0x1000, Protection::RX)
            .unwrap();

        let after: Vec<_> = (0..2).map(|c| vmem.leaf(c, window)).collect();
        assert_eq!(before, after, "{format}");

        // Reserved: neither mapped over nor unmapped.
        let block = vmem.block_size();
        assert_eq!(
            vmem.block_unmap(window, block),
            Err(MmuError::ReservedWindow { addr: window })
        );
        assert_eq!(
            vmem.map(Some(window), pa(0x1000), 0x1000, Protection::RW),
            Err(MmuError::ReservedWindow { addr: window })
        );
        assert_eq!(
            vmem.map(Some(va(0xFFBF_F000)), pa(0x1000), 0x2000, Protection::RW),
            Err(MmuError::ReservedWindow {
                addr: va(0xFFBF_F000)
            })
        );
        assert_eq!(vmem.leaf(0, window), before[0]);
    }
}

#[test]
fn tables_are_reachable_through_the_self_map() {
    for format in FORMATS {
        let ram = SimRam::new(4 * MIB);
        let mut vmem = boot(&ram, format, 2);
        vmem.map(Some(va(0x0040_0000)), pa(0x0040_0000), 0x1000, Protection::RX)
            .unwrap();
        for core in 0..2 {
            let root = vmem.root_table(core).unwrap();
            let root_va = vmem.table_virtual_address(root).unwrap();
            assert!(root_va.as_u64() >= SELF_MAP_BASE);
            assert_eq!(vmem.translate(core, root_va), Some(root));
        }
        assert_eq!(vmem.table_virtual_address(pa(0x1000)), None);
    }
}

#[test]
fn lazily_allocated_tables_are_counted() {
    let ram = SimRam::new(4 * MIB);
    let mut vmem = boot(&ram, TranslationFormat::ShortDescriptor, 2);
    // Two roots; the self-map is a section in each.
    assert_eq!(vmem.tables_allocated(), 2);
    vmem.map(Some(va(0xC000_0000)), pa(0x8000_0000), 0x1000, Protection::RW)
        .unwrap();
    assert_eq!(vmem.tables_allocated(), 4);
    vmem.map(Some(va(0xC000_1000)), pa(0x8000_1000), 0x1000, Protection::RW)
        .unwrap();
    assert_eq!(vmem.tables_allocated(), 4);

    let ram = SimRam::new(4 * MIB);
    let mut vmem = boot(&ram, TranslationFormat::ExtendedLpae, 2);
    // Two roots plus an L2 table each for the self-map block.
    assert_eq!(vmem.tables_allocated(), 4);
    // Same 1 GiB slot as the self-map: only L3 tables are new.
    vmem.map(Some(va(0xC000_0000)), pa(0x8000_0000), 0x1000, Protection::RW)
        .unwrap();
    assert_eq!(vmem.tables_allocated(), 6);
}

#[test]
fn map_on_core_is_private_to_one_core() {
    for format in FORMATS {
        let ram = SimRam::new(4 * MIB);
        let mut vmem = boot(&ram, format, 3);
        let v = vmem
            .map_on_core(2, va(0x0000_8000), pa(0x8FF0_0000), 0x1000, Protection::RX)
            .unwrap();
        assert_eq!(v, va(0x0000_8000));
        assert_eq!(vmem.translate(2, v), Some(pa(0x8FF0_0000)));
        assert_eq!(vmem.translate(0, v), None);
        assert_eq!(vmem.translate(1, v), None);

        assert_eq!(
            vmem.map_on_core(0, va(0xBFFF_F000), pa(0x1000), 0x2000, Protection::RW),
            Err(MmuError::SharedRegion {
                addr: va(0xBFFF_F000)
            })
        );
        assert_eq!(
            vmem.map_on_core(3, va(0x1000), pa(0x1000), 0x1000, Protection::RW),
            Err(MmuError::NoSuchCore { core: 3, cores: 3 })
        );
        assert_eq!(vmem.translate(3, v), None);
    }
}

#[test]
fn auto_assign_is_a_bump_cursor() {
    let ram = SimRam::new(4 * MIB);
    let mut vmem = boot(&ram, TranslationFormat::ExtendedLpae, 1);
    let a = vmem.map(None, pa(0x1000_0000), 0x1800, Protection::RW).unwrap();
    // Zero length maps nothing and does not advance the cursor.
    let z = vmem.map(None, pa(0x2000_0000), 0, Protection::RW).unwrap();
    let b = vmem.map(None, pa(0x3000_0000), 0x1000, Protection::RW).unwrap();
    assert_eq!(z.as_u64(), a.as_u64() + 0x2000);
    assert_eq!(b, z);
    assert_eq!(vmem.translate(0, z), Some(pa(0x3000_0000)));
}
