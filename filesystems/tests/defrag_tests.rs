// End-to-end defragmentation runs against synthetic 1 MB images.

use std::io::Write;

use fatdefrag_core::test_utils::MemoryDevice;
use fatdefrag_core::FileDevice;
use fatdefrag_filesystems::fat32::{analyze, chain_stats, directory, Catalog, DefragEngine, Fat32Volume};
use fatdefrag_filesystems::test_helpers::ImageBuilder;

fn run_defrag<D: fatdefrag_core::SectorDevice>(volume: &mut Fat32Volume<D>) -> Catalog {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut catalog = Catalog::new();
    let report = analyze(volume, &mut catalog).unwrap();
    {
        let mut engine = DefragEngine::new(volume, &mut catalog, report.used_clusters);
        engine.defragment_table().unwrap();
    }
    catalog
}

#[test]
fn scattered_files_become_contiguous() {
    let mut img = ImageBuilder::new();
    img.chain(&[10, 25, 11]);
    img.dir_entry(2, 0, b"FILE1   BIN", 0x20, 10);
    img.fill_cluster(10, 0xA1);
    img.fill_cluster(25, 0xA2);
    img.fill_cluster(11, 0xA3);
    img.chain(&[40, 30]);
    img.dir_entry(2, 1, b"FILE2   BIN", 0x20, 40);
    img.fill_cluster(40, 0xB1);
    img.fill_cluster(30, 0xB2);

    let mut volume = Fat32Volume::mount(img.build()).unwrap();
    let before = {
        let mut catalog = Catalog::new();
        analyze(&mut volume, &mut catalog).unwrap()
    };
    assert!(before.fragmentation_percent > 0.0);

    run_defrag(&mut volume);

    // Both files packed at the low end, right after the root directory.
    let root = volume.read_cluster(2).unwrap();
    assert_eq!(directory::entry_at(&root, 0).start_cluster(), 3);
    assert_eq!(directory::entry_at(&root, 1).start_cluster(), 6);
    for (cluster, marker) in [(3, 0xA1), (4, 0xA2), (5, 0xA3), (6, 0xB1), (7, 0xB2)] {
        assert_eq!(volume.read_cluster(cluster).unwrap()[0], marker);
    }

    let mut catalog = Catalog::new();
    let after = analyze(&mut volume, &mut catalog).unwrap();
    assert_eq!(after.fragmentation_percent, 0.0);
    assert_eq!(after.used_clusters, before.used_clusters);
}

#[test]
fn chain_lengths_and_used_total_conserved() {
    let mut img = ImageBuilder::new();
    img.chain(&[100, 50, 200, 51]);
    img.dir_entry(2, 0, b"ALPHA   DAT", 0x20, 100);
    img.chain(&[300]);
    img.dir_entry(2, 1, b"BETA    DAT", 0x20, 300);
    img.chain(&[150, 149, 148]);
    img.dir_entry(2, 2, b"GAMMA   DAT", 0x20, 150);

    let mut volume = Fat32Volume::mount(img.build()).unwrap();
    let mut catalog_before = Catalog::new();
    let before = analyze(&mut volume, &mut catalog_before).unwrap();
    let lengths_before: Vec<u32> = catalog_before.iter().map(|e| e.cluster_count).collect();

    run_defrag(&mut volume);

    let mut catalog_after = Catalog::new();
    let after = analyze(&mut volume, &mut catalog_after).unwrap();
    let lengths_after: Vec<u32> = catalog_after.iter().map(|e| e.cluster_count).collect();

    assert_eq!(lengths_before, lengths_after);
    assert_eq!(before.used_clusters, after.used_clusters);
    assert_eq!(after.fragmentation_percent, 0.0);
}

#[test]
fn subdirectory_tree_stays_consistent() {
    let mut img = ImageBuilder::new();
    img.chain(&[50]);
    img.dir_entry(2, 0, b"SUB        ", 0x10, 50);
    img.chain(&[60, 80]);
    img.dir_entry(50, 0, b"NESTED  BIN", 0x20, 60);
    img.fill_cluster(60, 0xC1);
    img.fill_cluster(80, 0xC2);

    let mut volume = Fat32Volume::mount(img.build()).unwrap();
    run_defrag(&mut volume);

    // Catalog order is subtree first, so the nested file packs before its
    // parent directory: nested at 3-4, SUB's own cluster at 5.
    let root = volume.read_cluster(2).unwrap();
    let sub_start = directory::entry_at(&root, 0).start_cluster();
    assert_eq!(sub_start, 5);

    let sub = volume.read_cluster(sub_start).unwrap();
    let nested_start = directory::entry_at(&sub, 0).start_cluster();
    assert_eq!(nested_start, 3);

    let stats = chain_stats(&mut volume, nested_start).unwrap();
    assert_eq!(stats.clusters, 2);
    assert_eq!(stats.fragments, 0);
    assert_eq!(volume.read_cluster(3).unwrap()[0], 0xC1);
    assert_eq!(volume.read_cluster(4).unwrap()[0], 0xC2);
}

#[test]
fn relocated_root_directory_updates_boot_sector() {
    let mut img = ImageBuilder::new();
    // root lives at cluster 9 instead of 2
    img.set_fat(2, 0);
    img.set_fat(9, 0x0FFF_FFF8);
    img.dir_entry(9, 0, b"FILE    BIN", 0x20, 30);
    img.chain(&[30]);
    img.fill_cluster(30, 0xD1);
    let mut bytes = img.into_bytes();
    bytes[0x2C..0x30].copy_from_slice(&9u32.to_le_bytes());

    let mut volume = Fat32Volume::mount(MemoryDevice::from_bytes(bytes)).unwrap();
    assert_eq!(volume.root_cluster(), 9);
    run_defrag(&mut volume);

    // Root relocated down to cluster 2 and the change survives a remount.
    assert_eq!(volume.root_cluster(), 2);
    let device = volume.unmount();
    let mut volume = Fat32Volume::mount(device).unwrap();
    assert_eq!(volume.root_cluster(), 2);

    let root = volume.read_cluster(2).unwrap();
    let file_start = directory::entry_at(&root, 0).start_cluster();
    assert_eq!(volume.read_cluster(file_start).unwrap()[0], 0xD1);

    let mut catalog = Catalog::new();
    let report = analyze(&mut volume, &mut catalog).unwrap();
    assert_eq!(report.fragmentation_percent, 0.0);
}

#[test]
fn swaps_are_involutions_on_image_bytes() {
    let mut img = ImageBuilder::new();
    img.chain(&[10, 25, 11]);
    img.dir_entry(2, 0, b"FILE    BIN", 0x20, 10);
    img.fill_cluster(25, 0xEE);
    let original = img.into_bytes();

    // plain exchange
    let mut volume = Fat32Volume::mount(MemoryDevice::from_bytes(original.clone())).unwrap();
    let mut catalog = Catalog::new();
    let report = analyze(&mut volume, &mut catalog).unwrap();
    {
        let mut engine = DefragEngine::new(&mut volume, &mut catalog, report.used_clusters);
        engine.swap_clusters(25, 20).unwrap();
        engine.swap_clusters(20, 25).unwrap();
    }
    assert_eq!(volume.unmount().bytes(), &original[..]);

    // exchange between directly linked clusters
    let mut volume = Fat32Volume::mount(MemoryDevice::from_bytes(original.clone())).unwrap();
    let mut catalog = Catalog::new();
    let report = analyze(&mut volume, &mut catalog).unwrap();
    {
        let mut engine = DefragEngine::new(&mut volume, &mut catalog, report.used_clusters);
        engine.swap_clusters(25, 11).unwrap();
        engine.swap_clusters(11, 25).unwrap();
    }
    assert_eq!(volume.unmount().bytes(), &original[..]);
}

#[test]
fn file_backed_image_roundtrip() {
    let mut img = ImageBuilder::new();
    img.chain(&[10, 25, 11]);
    img.dir_entry(2, 0, b"FILE    BIN", 0x20, 10);
    img.fill_cluster(10, 0xA1);
    img.fill_cluster(25, 0xA2);
    img.fill_cluster(11, 0xA3);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&img.into_bytes()).unwrap();
    file.flush().unwrap();
    let path = file.path().to_str().unwrap().to_string();

    {
        let device = FileDevice::open(&path).unwrap();
        let mut volume = Fat32Volume::mount(device).unwrap();
        run_defrag(&mut volume);
    }

    // reopen: changes were written through to the file
    let device = FileDevice::open(&path).unwrap();
    let mut volume = Fat32Volume::mount(device).unwrap();
    let mut catalog = Catalog::new();
    let report = analyze(&mut volume, &mut catalog).unwrap();
    assert_eq!(report.fragmentation_percent, 0.0);
    for (cluster, marker) in [(3u32, 0xA1u8), (4, 0xA2), (5, 0xA3)] {
        assert_eq!(volume.read_cluster(cluster).unwrap()[0], marker);
    }
}
