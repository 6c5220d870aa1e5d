// Mounted FAT32 volume: the context object every operation works against.
// Owns the backing device, the parsed boot sector, the derived geometry and
// a one-sector FAT cache. Replaces what older FAT tools keep as file-scope
// globals; constructed at mount, torn down by drop at unmount.

use byteorder::{ByteOrder, LittleEndian};
use fatdefrag_core::{DefragError, SectorDevice};
use log::{debug, info};

use super::boot_sector::{derive_geometry, parse_boot_sector, Fat32BootSector, VolumeGeometry};
use super::constants::*;

pub struct Fat32Volume<D: SectorDevice> {
    device: D,
    boot_sector: Fat32BootSector,
    /// Raw sector 0, kept so a root-cluster update rewrites the sector
    /// in place instead of re-serializing the whole structure.
    boot_bytes: Vec<u8>,
    geometry: VolumeGeometry,
    /// Single-sector FAT cache: raw bytes of `fat_cache_sector`.
    fat_cache: Vec<u8>,
    fat_cache_sector: Option<u64>,
}

impl<D: SectorDevice> Fat32Volume<D> {
    /// Mount the volume: read and validate the boot sector, derive the
    /// geometry, and set up the FAT cache. Fails unless the image is FAT32.
    pub fn mount(mut device: D) -> Result<Self, DefragError> {
        let mut boot_bytes = vec![0u8; 512];
        device.read_sectors(0, 1, 512, &mut boot_bytes)?;

        let boot_sector = parse_boot_sector(&boot_bytes)?;
        let geometry = derive_geometry(&boot_sector)?;
        let fat_cache = vec![0u8; geometry.bytes_per_sector as usize];

        info!(
            "Mounted FAT32 volume: {} clusters of {} bytes, root at cluster {}",
            geometry.cluster_count,
            geometry.bytes_per_cluster(),
            geometry.root_cluster
        );

        Ok(Fat32Volume {
            device,
            boot_sector,
            boot_bytes,
            geometry,
            fat_cache,
            fat_cache_sector: None,
        })
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    pub fn boot_sector(&self) -> &Fat32BootSector {
        &self.boot_sector
    }

    pub fn root_cluster(&self) -> u32 {
        self.geometry.root_cluster
    }

    pub fn cluster_count(&self) -> u32 {
        self.geometry.cluster_count
    }

    /// True when `cluster` can belong to a chain on this volume.
    pub fn is_valid_cluster(&self, cluster: u32) -> bool {
        (2..=self.geometry.cluster_count).contains(&cluster)
    }

    /// Point the boot sector at a new root cluster and persist sector 0.
    pub fn set_root_cluster(&mut self, cluster: u32) -> Result<(), DefragError> {
        debug!("Updating boot sector root cluster to {:#x}", cluster);
        self.geometry.root_cluster = cluster;
        self.boot_sector.root_cluster = cluster;
        LittleEndian::write_u32(
            &mut self.boot_bytes[BPB_ROOT_CLUS..BPB_ROOT_CLUS + 4],
            cluster,
        );
        self.device.write_sectors(0, 1, 512, &self.boot_bytes)
    }

    /// FAT sector holding `cluster`'s entry, as an absolute LBA.
    fn fat_sector_for(&self, cluster: u32) -> Result<u64, DefragError> {
        let geo = &self.geometry;
        let sector = geo.fat_start_sector + (cluster as u64 * 4) / geo.bytes_per_sector as u64;
        if sector >= geo.fat_start_sector + geo.fat_size_sectors {
            return Err(DefragError::FatOutOfRange(sector));
        }
        Ok(sector)
    }

    fn load_fat_sector(&mut self, sector: u64) -> Result<(), DefragError> {
        if self.fat_cache_sector != Some(sector) {
            self.device
                .read_sectors(sector, 1, self.geometry.bytes_per_sector, &mut self.fat_cache)?;
            self.fat_cache_sector = Some(sector);
        }
        Ok(())
    }

    /// Read the 28-bit FAT entry for `cluster`.
    pub fn read_fat_entry(&mut self, cluster: u32) -> Result<u32, DefragError> {
        let sector = self.fat_sector_for(cluster)?;
        self.load_fat_sector(sector)?;
        let index = (cluster % self.geometry.entries_per_fat_sector) as usize;
        let raw = LittleEndian::read_u32(&self.fat_cache[index * 4..index * 4 + 4]);
        Ok(raw & FAT32_ENTRY_MASK)
    }

    /// Write the 28-bit FAT entry for `cluster`, preserving the reserved
    /// top nibble. Mirrors the write to the second FAT copy when the
    /// volume has mirroring enabled.
    pub fn write_fat_entry(&mut self, cluster: u32, value: u32) -> Result<(), DefragError> {
        let sector = self.fat_sector_for(cluster)?;
        self.load_fat_sector(sector)?;
        let index = (cluster % self.geometry.entries_per_fat_sector) as usize;
        let raw = LittleEndian::read_u32(&self.fat_cache[index * 4..index * 4 + 4]);
        let updated = (raw & FAT32_RESERVED_MASK) | (value & FAT32_ENTRY_MASK);
        LittleEndian::write_u32(&mut self.fat_cache[index * 4..index * 4 + 4], updated);

        let bps = self.geometry.bytes_per_sector;
        self.device.write_sectors(sector, 1, bps, &self.fat_cache)?;
        if self.geometry.mirroring {
            let mirror = sector + self.geometry.fat_size_sectors;
            self.device.write_sectors(mirror, 1, bps, &self.fat_cache)?;
        }
        Ok(())
    }

    /// Follow the chain one step: the FAT value of `cluster`.
    pub fn next_cluster(&mut self, cluster: u32) -> Result<u32, DefragError> {
        self.read_fat_entry(cluster)
    }

    /// Read one data cluster's payload.
    pub fn read_cluster(&mut self, cluster: u32) -> Result<Vec<u8>, DefragError> {
        if !self.is_valid_cluster(cluster) {
            return Err(DefragError::ClusterOutOfRange(
                cluster,
                self.geometry.cluster_count,
            ));
        }
        let geo = &self.geometry;
        let lba = geo.cluster_to_sector(cluster);
        let mut buf = vec![0u8; geo.bytes_per_cluster()];
        let (spc, bps) = (geo.sectors_per_cluster, geo.bytes_per_sector);
        self.device.read_sectors(lba, spc, bps, &mut buf)?;
        Ok(buf)
    }

    /// Write one data cluster's payload.
    pub fn write_cluster(&mut self, cluster: u32, buf: &[u8]) -> Result<(), DefragError> {
        if !self.is_valid_cluster(cluster) {
            return Err(DefragError::ClusterOutOfRange(
                cluster,
                self.geometry.cluster_count,
            ));
        }
        let geo = &self.geometry;
        if buf.len() != geo.bytes_per_cluster() {
            return Err(DefragError::InvalidInput(format!(
                "cluster buffer is {} bytes, expected {}",
                buf.len(),
                geo.bytes_per_cluster()
            )));
        }
        let lba = geo.cluster_to_sector(cluster);
        let (spc, bps) = (geo.sectors_per_cluster, geo.bytes_per_sector);
        self.device.write_sectors(lba, spc, bps, buf)
    }

    /// Unmount, handing back the device.
    pub fn unmount(self) -> D {
        self.device
    }
}
