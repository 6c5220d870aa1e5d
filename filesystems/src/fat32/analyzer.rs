// Analysis engine: one full walk of the directory tree that fills the
// catalog and measures fragmentation per entry and for the whole volume.

use fatdefrag_core::{DefragError, SectorDevice};
use log::{debug, info};

use super::catalog::{Catalog, ROOT_SENTINEL};
use super::constants::is_end_of_chain;
use super::directory;
use super::volume::Fat32Volume;

#[derive(Debug, Clone, Copy)]
pub struct AnalysisReport {
    /// Average of per-entry fragmentation percentages.
    pub fragmentation_percent: f64,
    /// Total clusters allocated to cataloged chains; drives progress
    /// reporting during defragmentation.
    pub used_clusters: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainStats {
    pub clusters: u32,
    /// Transitions where the successor is not `current + 1`.
    pub fragments: u32,
}

impl ChainStats {
    pub fn percent(&self) -> f64 {
        if self.clusters == 0 {
            0.0
        } else {
            100.0 * self.fragments as f64 / self.clusters as f64
        }
    }
}

/// Walk the chain from `start`, counting clusters and non-contiguous
/// transitions. The walk ends at an end-of-chain marker or at any value
/// that is not a valid cluster pointer (free, reserved, bad, out of
/// range) — terminators, not errors, on already-imperfect images.
pub fn chain_stats<D: SectorDevice>(
    volume: &mut Fat32Volume<D>,
    start: u32,
) -> Result<ChainStats, DefragError> {
    let mut stats = ChainStats {
        clusters: 0,
        fragments: 0,
    };
    let mut current = start;
    loop {
        stats.clusters += 1;
        // A chain longer than the volume means the FAT has a cycle.
        if stats.clusters > volume.cluster_count() {
            debug!("chain from {:#x} exceeds cluster count, stopping", start);
            break;
        }
        let next = volume.next_cluster(current)?;
        if is_end_of_chain(next) || !volume.is_valid_cluster(next) {
            break;
        }
        if next != current + 1 {
            stats.fragments += 1;
        }
        current = next;
    }
    Ok(stats)
}

enum Work {
    /// Scan a directory's cluster chain for significant records.
    Scan(u32),
    /// Catalog one discovered record and measure its fragmentation.
    Record {
        start_cluster: u32,
        entry_cluster: u32,
        entry_index: u16,
    },
}

/// Analyze the volume: build the catalog (root first) and compute the
/// volume-wide fragmentation percentage.
pub fn analyze<D: SectorDevice>(
    volume: &mut Fat32Volume<D>,
    catalog: &mut Catalog,
) -> Result<AnalysisReport, DefragError> {
    info!("Analyzing volume...");

    let root = volume.root_cluster();
    let mut used_clusters = 0u64;
    let mut fragmentation_sum = 0.0f64;

    // Synthetic root row; the boot sector is its referencing "entry".
    let root_index = catalog.append(root, ROOT_SENTINEL, 0)?;
    fragmentation_sum += measure_entry(volume, catalog, root_index, &mut used_clusters)?;

    // Depth-first with an explicit stack; a subdirectory's subtree is
    // cataloged before the subdirectory's own record, matching the
    // recursive formulation this replaces.
    let mut stack = vec![Work::Scan(root)];
    while let Some(work) = stack.pop() {
        match work {
            Work::Record {
                start_cluster,
                entry_cluster,
                entry_index,
            } => {
                // Start clusters outside [2, cluster_count] are expected
                // on imperfect images; skip the record.
                if !volume.is_valid_cluster(start_cluster) {
                    debug!(
                        "skipping record at {:#x}[{}]: start cluster {:#x} out of range",
                        entry_cluster, entry_index, start_cluster
                    );
                    continue;
                }
                let index = catalog.append(start_cluster, entry_cluster, entry_index)?;
                fragmentation_sum += measure_entry(volume, catalog, index, &mut used_clusters)?;
            }
            Work::Scan(dir_start) => {
                if !volume.is_valid_cluster(dir_start) {
                    continue;
                }
                scan_directory(volume, dir_start, &mut stack)?;
            }
        }
    }

    let fragmentation_percent = if catalog.is_empty() {
        0.0
    } else {
        fragmentation_sum / catalog.len() as f64
    };
    info!(
        "Analysis done: {} entries, {} used clusters, {:.2}% fragmented",
        catalog.len(),
        used_clusters,
        fragmentation_percent
    );
    Ok(AnalysisReport {
        fragmentation_percent,
        used_clusters,
    })
}

/// Fill `cluster_count` for one catalog row and return its fragmentation
/// percentage.
fn measure_entry<D: SectorDevice>(
    volume: &mut Fat32Volume<D>,
    catalog: &mut Catalog,
    index: usize,
    used_clusters: &mut u64,
) -> Result<f64, DefragError> {
    let start = catalog.get(index).start_cluster;
    let stats = chain_stats(volume, start)?;
    catalog.set_cluster_count(index, stats.clusters);
    *used_clusters += stats.clusters as u64;
    debug!(
        "entry {} (start {:#x}): {} clusters, {} fragments ({:.2}%)",
        index,
        start,
        stats.clusters,
        stats.fragments,
        stats.percent()
    );
    Ok(stats.percent())
}

/// Walk one directory's cluster chain and queue work for every
/// significant record found. The scan of the whole directory stops at the
/// first end-of-listing marker.
fn scan_directory<D: SectorDevice>(
    volume: &mut Fat32Volume<D>,
    dir_start: u32,
    stack: &mut Vec<Work>,
) -> Result<(), DefragError> {
    let mut pending: Vec<Work> = Vec::new();
    let mut cluster = dir_start;

    'chain: loop {
        let buf = volume.read_cluster(cluster)?;
        for (index, entry) in directory::entries(&buf).enumerate() {
            if entry.is_end_marker() {
                break 'chain;
            }
            if !entry.is_significant() {
                continue;
            }
            let start = entry.start_cluster();
            if start == 0 {
                continue;
            }
            // Recurse into subdirectories, guarding against the one cycle
            // shape a self-referencing record can produce.
            if entry.is_directory() && start != dir_start {
                pending.push(Work::Scan(start));
            }
            pending.push(Work::Record {
                start_cluster: start,
                entry_cluster: cluster,
                entry_index: index as u16,
            });
        }
        let next = volume.next_cluster(cluster)?;
        if is_end_of_chain(next) || !volume.is_valid_cluster(next) {
            break;
        }
        cluster = next;
    }

    // Reverse so pops come off in discovery order.
    while let Some(work) = pending.pop() {
        stack.push(work);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fat32::constants::FAT32_EOC_MIN;
    use crate::test_helpers::ImageBuilder;

    #[test]
    fn contiguous_chain_has_zero_fragmentation() {
        let mut img = ImageBuilder::new();
        img.chain(&[10, 11, 12]);
        let mut vol = Fat32Volume::mount(img.build()).unwrap();
        let stats = chain_stats(&mut vol, 10).unwrap();
        assert_eq!(stats, ChainStats { clusters: 3, fragments: 0 });
        assert_eq!(stats.percent(), 0.0);
    }

    #[test]
    fn scattered_chain_counts_fragments() {
        let mut img = ImageBuilder::new();
        img.chain(&[10, 25, 11]);
        let mut vol = Fat32Volume::mount(img.build()).unwrap();
        let stats = chain_stats(&mut vol, 10).unwrap();
        assert_eq!(stats.clusters, 3);
        assert_eq!(stats.fragments, 2);
    }

    #[test]
    fn analyze_catalogs_tree_in_order() {
        let mut img = ImageBuilder::new();
        // root (cluster 2) holds a subdirectory at 5 and a file at 10;
        // the subdirectory holds a file at 20.
        img.dir_entry(2, 0, b"SUB        ", 0x10, 5);
        img.dir_entry(2, 1, b"ROOTFILEBIN", 0x20, 10);
        img.set_fat(5, FAT32_EOC_MIN);
        img.dir_entry(5, 0, b"NESTED  BIN", 0x20, 20);
        img.chain(&[10, 11]);
        img.set_fat(20, FAT32_EOC_MIN);

        let mut vol = Fat32Volume::mount(img.build()).unwrap();
        let mut catalog = Catalog::new();
        let report = analyze(&mut vol, &mut catalog).unwrap();

        // root, then the subdirectory's subtree before the subdirectory
        // itself, then the remaining root record
        let starts: Vec<u32> = catalog.iter().map(|e| e.start_cluster).collect();
        assert_eq!(starts, vec![2, 20, 5, 10]);
        assert!(catalog.get(0).is_root());
        assert_eq!(catalog.get(3).cluster_count, 2);
        assert_eq!(report.used_clusters, 1 + 1 + 1 + 2);
        assert_eq!(report.fragmentation_percent, 0.0);
    }

    #[test]
    fn analyze_skips_dot_and_erased_records() {
        let img = {
            let mut img = ImageBuilder::new();
            img.dir_entry(2, 0, b".          ", 0x10, 2);
            img.dir_entry(2, 1, b"..         ", 0x10, 0);
            img.dir_entry(2, 2, b"GONE    BIN", 0x20, 30);
            let mut bytes = img.into_bytes();
            // erase the third record
            bytes[ImageBuilder::cluster_offset(2) + 2 * 32] = 0xE5;
            fatdefrag_core::test_utils::MemoryDevice::from_bytes(bytes)
        };
        let mut vol = Fat32Volume::mount(img).unwrap();
        let mut catalog = Catalog::new();
        analyze(&mut vol, &mut catalog).unwrap();
        // only the synthetic root survives the filter
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn analyze_skips_reserved_start_cluster() {
        let mut img = ImageBuilder::new();
        // a subdirectory record pointing below the data region
        img.dir_entry(2, 0, b"LOSTDIR    ", 0x10, 1);
        let mut vol = Fat32Volume::mount(img.build()).unwrap();
        let mut catalog = Catalog::new();
        analyze(&mut vol, &mut catalog).unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn analyze_skips_out_of_range_start() {
        let mut img = ImageBuilder::new();
        img.dir_entry(2, 0, b"BROKEN  BIN", 0x20, 0x000F_0000);
        let mut vol = Fat32Volume::mount(img.build()).unwrap();
        let mut catalog = Catalog::new();
        analyze(&mut vol, &mut catalog).unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn self_referencing_subdirectory_does_not_loop() {
        let mut img = ImageBuilder::new();
        img.dir_entry(2, 0, b"LOOP       ", 0x10, 2);
        let mut vol = Fat32Volume::mount(img.build()).unwrap();
        let mut catalog = Catalog::new();
        analyze(&mut vol, &mut catalog).unwrap();
        // cataloged once as a record, plus the synthetic root
        assert_eq!(catalog.len(), 2);
    }
}
