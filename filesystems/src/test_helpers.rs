// Helpers for building synthetic FAT32 images in tests.
// Exposed as a normal module so the integration suite can use it too.

use byteorder::{ByteOrder, LittleEndian};
use fatdefrag_core::test_utils::MemoryDevice;

use crate::fat32::constants::*;

pub const BYTES_PER_SECTOR: u32 = 512;
pub const SECTORS_PER_CLUSTER: u32 = 1;
pub const RESERVED_SECTORS: u32 = 32;
pub const FAT_SIZE_SECTORS: u32 = 16;
pub const NUM_FATS: u32 = 2;
pub const DATA_START_SECTOR: u32 = RESERVED_SECTORS + NUM_FATS * FAT_SIZE_SECTORS;

/// Builds a small FAT32 image in memory: 512-byte sectors, one sector per
/// cluster, two mirrored FATs. The default 2048 sectors give a 1 MB image
/// with the root directory at cluster 2.
pub struct ImageBuilder {
    bytes: Vec<u8>,
    total_sectors: u32,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::with_total_sectors(2048)
    }

    pub fn with_total_sectors(total_sectors: u32) -> Self {
        let mut bytes = vec![0u8; (total_sectors * BYTES_PER_SECTOR) as usize];

        bytes[BPB_BYTES_PER_SEC..BPB_BYTES_PER_SEC + 2]
            .copy_from_slice(&(BYTES_PER_SECTOR as u16).to_le_bytes());
        bytes[BPB_SEC_PER_CLUS] = SECTORS_PER_CLUSTER as u8;
        bytes[BPB_RSVD_SEC_CNT..BPB_RSVD_SEC_CNT + 2]
            .copy_from_slice(&(RESERVED_SECTORS as u16).to_le_bytes());
        bytes[BPB_NUM_FATS] = NUM_FATS as u8;
        bytes[BPB_TOT_SEC32..BPB_TOT_SEC32 + 4].copy_from_slice(&total_sectors.to_le_bytes());
        bytes[BPB_FAT_SZ32..BPB_FAT_SZ32 + 4].copy_from_slice(&FAT_SIZE_SECTORS.to_le_bytes());
        bytes[BPB_ROOT_CLUS..BPB_ROOT_CLUS + 4].copy_from_slice(&2u32.to_le_bytes());
        bytes[BS32_FIL_SYS_TYPE..BS32_FIL_SYS_TYPE + 8].copy_from_slice(b"FAT32   ");
        bytes[BOOT_SIGNATURE_OFFSET] = 0x55;
        bytes[BOOT_SIGNATURE_OFFSET + 1] = 0xAA;

        let mut builder = ImageBuilder {
            bytes,
            total_sectors,
        };
        // media descriptor / reserved entries, root directory chain
        builder.set_fat(0, 0x0FFF_FFF8);
        builder.set_fat(1, 0x0FFF_FFFF);
        builder.set_fat(2, FAT32_EOC_MIN);
        builder
    }

    pub fn cluster_offset(cluster: u32) -> usize {
        ((DATA_START_SECTOR + (cluster - 2) * SECTORS_PER_CLUSTER) * BYTES_PER_SECTOR) as usize
    }

    /// Set one FAT entry in both copies.
    pub fn set_fat(&mut self, cluster: u32, value: u32) {
        for copy in 0..NUM_FATS {
            let off = ((RESERVED_SECTORS + copy * FAT_SIZE_SECTORS) * BYTES_PER_SECTOR) as usize
                + cluster as usize * 4;
            LittleEndian::write_u32(&mut self.bytes[off..off + 4], value);
        }
    }

    pub fn fat(&self, cluster: u32) -> u32 {
        let off = (RESERVED_SECTORS * BYTES_PER_SECTOR) as usize + cluster as usize * 4;
        LittleEndian::read_u32(&self.bytes[off..off + 4]) & FAT32_ENTRY_MASK
    }

    /// Link `clusters` into a chain terminated by end-of-chain.
    pub fn chain(&mut self, clusters: &[u32]) {
        for pair in clusters.windows(2) {
            self.set_fat(pair[0], pair[1]);
        }
        if let Some(&last) = clusters.last() {
            self.set_fat(last, FAT32_EOC_MIN);
        }
    }

    /// Write a 32-byte directory record into `dir_cluster` at `index`.
    pub fn dir_entry(
        &mut self,
        dir_cluster: u32,
        index: usize,
        name: &[u8; 11],
        attributes: u8,
        start_cluster: u32,
    ) {
        let base = Self::cluster_offset(dir_cluster) + index * DIR_ENTRY_SIZE;
        self.bytes[base..base + 11].copy_from_slice(name);
        self.bytes[base + 11] = attributes;
        LittleEndian::write_u16(
            &mut self.bytes[base + 20..base + 22],
            (start_cluster >> 16) as u16,
        );
        LittleEndian::write_u16(
            &mut self.bytes[base + 26..base + 28],
            (start_cluster & 0xFFFF) as u16,
        );
    }

    /// Fill a cluster's payload with a marker byte.
    pub fn fill_cluster(&mut self, cluster: u32, marker: u8) {
        let base = Self::cluster_offset(cluster);
        let len = (SECTORS_PER_CLUSTER * BYTES_PER_SECTOR) as usize;
        self.bytes[base..base + len].fill(marker);
    }

    pub fn total_sectors(&self) -> u32 {
        self.total_sectors
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn build(self) -> MemoryDevice {
        MemoryDevice::from_bytes(self.bytes)
    }
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}
