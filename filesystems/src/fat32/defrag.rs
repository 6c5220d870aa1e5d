// Defragmentation engine: compacts every cataloged chain through atomic
// two-cluster swaps that keep the FAT, directory entries, boot sector and
// catalog consistent after each swap.
//
// Precondition: the FAT is valid and acyclic. Parent discovery assumes a
// cluster that is not a start cluster has exactly one FAT entry pointing at
// it; on a cross-referenced FAT that assumption can deepen the damage.

use fatdefrag_core::{DefragError, SectorDevice};
use log::{debug, info, log_enabled, Level};

use super::catalog::Catalog;
use super::constants::{is_end_of_chain, FAT32_BAD};
use super::directory;
use super::volume::Fat32Volume;

/// Progress sink: (clusters processed, total used clusters).
pub type ProgressCallback<'a> = Box<dyn FnMut(u64, u64) + 'a>;

pub struct DefragEngine<'a, D: SectorDevice> {
    volume: &'a mut Fat32Volume<D>,
    catalog: &'a mut Catalog,
    /// Used-cluster total from analysis; denominator for progress.
    used_clusters: u64,
    clusters_processed: u64,
    progress: Option<ProgressCallback<'a>>,
}

impl<'a, D: SectorDevice> DefragEngine<'a, D> {
    pub fn new(
        volume: &'a mut Fat32Volume<D>,
        catalog: &'a mut Catalog,
        used_clusters: u64,
    ) -> Self {
        DefragEngine {
            volume,
            catalog,
            used_clusters,
            clusters_processed: 0,
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback<'a>) -> Self {
        self.progress = Some(callback);
        self
    }

    fn report_progress(&mut self) {
        if let Some(cb) = self.progress.as_mut() {
            cb(self.clusters_processed, self.used_clusters);
        }
    }

    /// Defragment every cataloged chain in table order: relocate the start
    /// cluster toward the low end of the volume, then compact the rest of
    /// the chain behind it.
    pub fn defragment_table(&mut self) -> Result<(), DefragError> {
        info!("Defragmenting volume...");
        let mut search_from = 1u32;

        for index in 0..self.catalog.len() {
            if log_enabled!(Level::Debug) {
                self.dump_chain(index, "before")?;
            }

            // compact_chain's return supersedes the optimize cursor, so
            // only the last cluster visited carries over.
            self.optimize_start_cluster(index, search_from + 1)?;
            self.clusters_processed += 1;

            let start = self.catalog.get(index).start_cluster;
            search_from = self.compact_chain(start)?;

            if log_enabled!(Level::Debug) {
                self.dump_chain(index, "after")?;
            }
            self.report_progress();
        }
        info!(
            "Defragmentation done: {} entries, {} clusters processed",
            self.catalog.len(),
            self.clusters_processed
        );
        Ok(())
    }

    /// Find the lowest usable cluster at or after `search_from` and, if it
    /// is lower than the entry's current start cluster, swap the start
    /// cluster down to it. Returns the search position for the next entry;
    /// the cursor only advances when a swap happened.
    pub fn optimize_start_cluster(
        &mut self,
        table_index: usize,
        search_from: u32,
    ) -> Result<u32, DefragError> {
        let start = self.catalog.get(table_index).start_cluster;
        if start == search_from {
            return Ok(search_from);
        }
        let candidate = match self.find_first_usable(search_from)? {
            Some((cluster, _value)) => cluster,
            None => return Ok(search_from),
        };
        if start > candidate {
            debug!(
                "relocating start cluster {:#x} -> {:#x}",
                start, candidate
            );
            self.swap_clusters(start, candidate)?;
            Ok(candidate)
        } else {
            Ok(search_from)
        }
    }

    /// Walk the chain from `start` and pull every non-contiguous successor
    /// down to the lowest usable cluster after its predecessor. Returns the
    /// last cluster visited, which becomes the next search cursor.
    pub fn compact_chain(&mut self, start: u32) -> Result<u32, DefragError> {
        let mut current = start;
        loop {
            let mut next = self.volume.next_cluster(current)?;
            self.clusters_processed += 1;

            // End-of-chain, free, reserved, bad, or out-of-range values all
            // terminate the chain; none of them is an error here.
            if is_end_of_chain(next) || !self.volume.is_valid_cluster(next) {
                return Ok(current);
            }

            if current + 1 != next {
                let candidate = match self.find_first_usable(current + 1)? {
                    Some((cluster, _value)) => cluster,
                    None => return Ok(next),
                };
                debug!(
                    "compacting chain link {:#x}->{:#x} toward {:#x}",
                    current, next, candidate
                );
                if next > candidate {
                    self.swap_clusters(next, candidate)?;
                    next = candidate;
                }
            }
            current = next;
            self.report_progress();
        }
    }

    /// Swap two clusters everywhere they appear: directory entries or the
    /// boot sector (for start clusters), FAT links from their parents, the
    /// FAT values themselves, the catalog, and the payload bytes.
    ///
    /// The step order is load-bearing: parent discovery reads FAT state
    /// that the later FAT writes destroy.
    pub fn swap_clusters(&mut self, cluster1: u32, cluster2: u32) -> Result<(), DefragError> {
        if cluster1 == cluster2 {
            return Ok(());
        }
        debug!("swapping {:#x} <-> {:#x}", cluster1, cluster2);

        // 1. Rewrite whatever references each start cluster: the boot
        //    sector for the root, a directory record otherwise.
        let starting1 = self.catalog.find_by_start_cluster(cluster1);
        let starting2 = self.catalog.find_by_start_cluster(cluster2);
        if let Some(index) = starting1 {
            self.rewrite_start_reference(index, cluster1, cluster2)?;
        }
        if let Some(index) = starting2 {
            self.rewrite_start_reference(index, cluster2, cluster1)?;
        }

        // 2. Relink parents. Only non-start clusters need a parent fix-up:
        //    a start cluster has no FAT entry pointing at it, by
        //    construction (the "half condition" — valid FAT assumed).
        let value1 = self.volume.read_fat_entry(cluster1)?;
        let value2 = self.volume.read_fat_entry(cluster2)?;
        debug!("  fat[{:#x}]={:#x}, fat[{:#x}]={:#x}", cluster1, value1, cluster2, value2);

        let parent1 = if starting1.is_none() {
            self.find_parent(cluster1)?
        } else {
            None
        };
        let parent2 = if starting2.is_none() {
            self.find_parent(cluster2)?
        } else {
            None
        };
        if let Some(parent) = parent1 {
            debug!("  parent of {:#x} is {:#x}", cluster1, parent);
            self.volume.write_fat_entry(parent, cluster2)?;
        }
        if let Some(parent) = parent2 {
            debug!("  parent of {:#x} is {:#x}", cluster2, parent);
            self.volume.write_fat_entry(parent, cluster1)?;
        }

        // 3. Exchange the FAT values. When one cluster linked directly to
        //    the other, a plain exchange would leave the moved cluster
        //    pointing at itself, so the link is redirected instead.
        if value1 == cluster2 {
            self.volume.write_fat_entry(cluster1, value2)?;
            self.volume.write_fat_entry(cluster2, cluster1)?;
        } else if value2 == cluster1 {
            self.volume.write_fat_entry(cluster1, cluster2)?;
            self.volume.write_fat_entry(cluster2, value1)?;
        } else {
            self.volume.write_fat_entry(cluster1, value2)?;
            self.volume.write_fat_entry(cluster2, value1)?;
        }

        // 4. Keep the catalog in step: swapped start clusters, and any
        //    directory cluster that itself moved.
        if let Some(index) = starting1 {
            self.catalog.get_mut(index).start_cluster = cluster2;
        }
        if let Some(index) = starting2 {
            self.catalog.get_mut(index).start_cluster = cluster1;
        }
        for entry in self.catalog.iter_mut() {
            if entry.entry_cluster == cluster1 {
                entry.entry_cluster = cluster2;
            } else if entry.entry_cluster == cluster2 {
                entry.entry_cluster = cluster1;
            }
        }

        // 5. Exchange the payload bytes.
        let payload1 = self.volume.read_cluster(cluster1)?;
        let payload2 = self.volume.read_cluster(cluster2)?;
        self.volume.write_cluster(cluster1, &payload2)?;
        self.volume.write_cluster(cluster2, &payload1)?;

        Ok(())
    }

    /// Point the reference to a relocated start cluster at its new home.
    fn rewrite_start_reference(
        &mut self,
        catalog_index: usize,
        old_cluster: u32,
        new_cluster: u32,
    ) -> Result<(), DefragError> {
        let entry = *self.catalog.get(catalog_index);
        if entry.is_root() {
            debug!("  {:#x} is the root cluster, updating boot sector", old_cluster);
            self.volume.set_root_cluster(new_cluster)
        } else {
            debug!(
                "  {:#x} is a start cluster; rewriting record {} in directory cluster {:#x}",
                old_cluster, entry.entry_index, entry.entry_cluster
            );
            let mut buf = self.volume.read_cluster(entry.entry_cluster)?;
            directory::set_entry_start_cluster(&mut buf, entry.entry_index as usize, new_cluster);
            self.volume.write_cluster(entry.entry_cluster, &buf)
        }
    }

    /// Scan the whole FAT for the cluster whose entry points at `cluster`.
    /// O(n) by design; simplicity over speed for bounded volumes.
    pub fn find_parent(&mut self, cluster: u32) -> Result<Option<u32>, DefragError> {
        if cluster == 0 {
            return Ok(None);
        }
        for candidate in 2..=self.volume.cluster_count() {
            if self.volume.read_fat_entry(candidate)? == cluster {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Lowest cluster at or after `begin` whose FAT entry is not the bad
    /// marker, together with that entry's value.
    pub fn find_first_usable(&mut self, begin: u32) -> Result<Option<(u32, u32)>, DefragError> {
        for cluster in begin..=self.volume.cluster_count() {
            let value = self.volume.read_fat_entry(cluster)?;
            if value != FAT32_BAD {
                return Ok(Some((cluster, value)));
            }
        }
        debug!("no usable cluster at or after {:#x}", begin);
        Ok(None)
    }

    fn dump_chain(&mut self, table_index: usize, label: &str) -> Result<(), DefragError> {
        let mut chain = Vec::new();
        let mut current = self.catalog.get(table_index).start_cluster;
        loop {
            chain.push(current);
            if chain.len() > self.volume.cluster_count() as usize {
                break;
            }
            let next = self.volume.next_cluster(current)?;
            if is_end_of_chain(next) || !self.volume.is_valid_cluster(next) {
                break;
            }
            current = next;
        }
        debug!("chain for entry {} ({}): {:x?}", table_index, label, chain);
        Ok(())
    }
}
