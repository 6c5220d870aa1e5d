// The catalog: one row per allocated file or directory discovered during
// analysis. This is the ground truth the defragmentation pass reads and
// rewrites as clusters move.

use fatdefrag_core::DefragError;

/// Default capacity, matching the historical tool's fixed table.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// `entry_cluster == 0` marks the synthetic root row: the root directory's
/// start cluster is referenced by the boot sector, not a directory entry.
pub const ROOT_SENTINEL: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    /// First cluster of this file/directory's chain.
    pub start_cluster: u32,
    /// Directory cluster holding the record that references this chain,
    /// or `ROOT_SENTINEL` for the volume root.
    pub entry_cluster: u32,
    /// Record index within that directory cluster.
    pub entry_index: u16,
    /// Chain length; zero until the analysis fragmentation pass fills it.
    pub cluster_count: u32,
}

impl CatalogEntry {
    pub fn is_root(&self) -> bool {
        self.entry_cluster == ROOT_SENTINEL
    }
}

pub struct Catalog {
    entries: Vec<CatalogEntry>,
    capacity: usize,
}

impl Catalog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Catalog {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a row; `cluster_count` starts at zero.
    pub fn append(
        &mut self,
        start_cluster: u32,
        entry_cluster: u32,
        entry_index: u16,
    ) -> Result<usize, DefragError> {
        if self.entries.len() >= self.capacity {
            return Err(DefragError::CatalogFull(self.capacity));
        }
        self.entries.push(CatalogEntry {
            start_cluster,
            entry_cluster,
            entry_index,
            cluster_count: 0,
        });
        Ok(self.entries.len() - 1)
    }

    /// Linear scan for the row whose chain starts at `cluster`.
    /// O(n), but n is bounded and lookups are rare next to FAT traffic.
    pub fn find_by_start_cluster(&self, cluster: u32) -> Option<usize> {
        self.entries.iter().position(|e| e.start_cluster == cluster)
    }

    pub fn set_cluster_count(&mut self, index: usize, count: u32) {
        self.entries[index].cluster_count = count;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> &CatalogEntry {
        &self.entries[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut CatalogEntry {
        &mut self.entries[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CatalogEntry> {
        self.entries.iter_mut()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_lookup() {
        let mut cat = Catalog::new();
        let root = cat.append(2, ROOT_SENTINEL, 0).unwrap();
        let file = cat.append(10, 2, 3).unwrap();
        assert_eq!(root, 0);
        assert_eq!(file, 1);
        assert!(cat.get(0).is_root());
        assert!(!cat.get(1).is_root());
        assert_eq!(cat.find_by_start_cluster(10), Some(1));
        assert_eq!(cat.find_by_start_cluster(99), None);
    }

    #[test]
    fn cluster_count_starts_unset() {
        let mut cat = Catalog::new();
        let i = cat.append(10, 2, 0).unwrap();
        assert_eq!(cat.get(i).cluster_count, 0);
        cat.set_cluster_count(i, 7);
        assert_eq!(cat.get(i).cluster_count, 7);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut cat = Catalog::with_capacity(2);
        cat.append(2, 0, 0).unwrap();
        cat.append(3, 2, 0).unwrap();
        assert!(matches!(
            cat.append(4, 2, 1),
            Err(DefragError::CatalogFull(2))
        ));
    }
}
