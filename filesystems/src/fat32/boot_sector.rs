// FAT32 boot sector parsing and volume geometry derivation.

use fatdefrag_core::DefragError;
use log::debug;
use static_assertions::const_assert_eq;

use super::constants::*;

#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct Fat32BootSector {
    pub jmp_boot: [u8; 3],
    pub oem_name: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entry_count: u16, // 0 for FAT32
    pub total_sectors_16: u16, // 0 for FAT32
    pub media: u8,
    pub fat_size_16: u16, // 0 for FAT32
    pub sectors_per_track: u16,
    pub num_heads: u16,
    pub hidden_sectors: u32,
    pub total_sectors_32: u32,
    // FAT32 specific
    pub fat_size_32: u32,
    pub ext_flags: u16,
    pub fs_version: u16,
    pub root_cluster: u32,
    pub fs_info: u16,
    pub backup_boot_sector: u16,
    pub reserved: [u8; 12],
    pub drive_number: u8,
    pub reserved1: u8,
    pub boot_signature: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],
}

const_assert_eq!(std::mem::size_of::<Fat32BootSector>(), 90);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
}

impl std::fmt::Display for FatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FatType::Fat12 => write!(f, "FAT12"),
            FatType::Fat16 => write!(f, "FAT16"),
            FatType::Fat32 => write!(f, "FAT32"),
        }
    }
}

/// Everything the engines need to translate clusters to sectors.
/// Derived once at mount; immutable except for `root_cluster`, which moves
/// when the root directory's start cluster is relocated.
#[derive(Debug, Clone)]
pub struct VolumeGeometry {
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    /// First sector of the FAT copy in use (active copy if not mirrored).
    pub fat_start_sector: u64,
    pub fat_size_sectors: u64,
    pub num_fats: u32,
    pub mirroring: bool,
    pub first_data_sector: u64,
    pub root_cluster: u32,
    /// Highest valid cluster number; valid clusters are 2..=cluster_count.
    pub cluster_count: u32,
    /// FAT entries held by one cached FAT sector.
    pub entries_per_fat_sector: u32,
    pub dir_entries_per_cluster: u32,
}

impl std::fmt::Display for VolumeGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FAT32, {} B/sector, {} sectors/cluster, {} clusters, root at {:#x}",
            self.bytes_per_sector, self.sectors_per_cluster, self.cluster_count, self.root_cluster
        )
    }
}

impl VolumeGeometry {
    #[inline]
    pub fn bytes_per_cluster(&self) -> usize {
        (self.bytes_per_sector * self.sectors_per_cluster) as usize
    }

    /// First sector of a data cluster.
    #[inline]
    pub fn cluster_to_sector(&self, cluster: u32) -> u64 {
        self.first_data_sector + (cluster as u64 - 2) * self.sectors_per_cluster as u64
    }
}

/// Parse and sanity-check a boot sector from its raw 512 bytes.
pub fn parse_boot_sector(bytes: &[u8]) -> Result<Fat32BootSector, DefragError> {
    if bytes.len() < 512 {
        return Err(DefragError::BadBootSector(format!(
            "boot sector truncated to {} bytes",
            bytes.len()
        )));
    }
    if bytes[BOOT_SIGNATURE_OFFSET..BOOT_SIGNATURE_OFFSET + 2] != BOOT_SIGNATURE {
        return Err(DefragError::BadBootSector(
            "missing 0x55AA signature".into(),
        ));
    }

    let bs = unsafe { std::ptr::read(bytes.as_ptr() as *const Fat32BootSector) };

    let bytes_per_sector = bs.bytes_per_sector;
    let sectors_per_cluster = bs.sectors_per_cluster;
    if bytes_per_sector == 0 || sectors_per_cluster == 0 {
        return Err(DefragError::BadBootSector(
            "zero bytes/sector or sectors/cluster".into(),
        ));
    }
    Ok(bs)
}

/// Determine the FAT type from cluster-count thresholds cross-checked
/// against the `fs_type` label. A 1 MB FAT32 test image has far fewer
/// clusters than the "official" FAT32 minimum, so the label has to break
/// the tie.
pub fn determine_fat_type(bs: &Fat32BootSector, cluster_count: u32) -> Result<FatType, DefragError> {
    let label = bs.fs_type;
    if cluster_count <= FAT12_MAX_CLUSTERS && &label == b"FAT12   " {
        Ok(FatType::Fat12)
    } else if cluster_count <= FAT16_MAX_CLUSTERS && &label == b"FAT16   " {
        Ok(FatType::Fat16)
    } else if &label == b"FAT32   " {
        Ok(FatType::Fat32)
    } else {
        Err(DefragError::BadBootSector(format!(
            "can't determine FAT type (label: '{}')",
            String::from_utf8_lossy(&label)
        )))
    }
}

/// Derive the volume geometry, failing unless the volume is FAT32.
pub fn derive_geometry(bs: &Fat32BootSector) -> Result<VolumeGeometry, DefragError> {
    let bytes_per_sector = bs.bytes_per_sector as u32;
    let sectors_per_cluster = bs.sectors_per_cluster as u32;
    let reserved_sectors = bs.reserved_sectors as u32;
    let num_fats = bs.num_fats as u32;
    let root_entry_count = bs.root_entry_count as u32;
    let ext_flags = bs.ext_flags;
    let root_cluster = bs.root_cluster;

    let fat_size_sectors = if bs.fat_size_16 != 0 {
        bs.fat_size_16 as u64
    } else {
        bs.fat_size_32 as u64
    };
    let total_sectors = if bs.total_sectors_16 != 0 {
        bs.total_sectors_16 as u64
    } else {
        bs.total_sectors_32 as u64
    };
    if fat_size_sectors == 0 || total_sectors == 0 || num_fats == 0 {
        return Err(DefragError::BadBootSector(
            "zero FAT size, sector count, or FAT count".into(),
        ));
    }

    // Legacy root directory area; always empty on FAT32 but kept in the
    // cluster-count formula so FAT12/16 images are classified correctly.
    let root_dir_sectors =
        (root_entry_count * 32 + (bytes_per_sector - 1)) as u64 / bytes_per_sector as u64;

    let metadata_sectors = reserved_sectors as u64 + fat_size_sectors * num_fats as u64 + root_dir_sectors;
    if total_sectors <= metadata_sectors {
        return Err(DefragError::BadBootSector(
            "volume smaller than its own metadata".into(),
        ));
    }
    let cluster_count =
        ((total_sectors - metadata_sectors) / sectors_per_cluster as u64) as u32 + 1;

    let fat_type = determine_fat_type(bs, cluster_count)?;
    if fat_type != FatType::Fat32 {
        return Err(DefragError::NotFat32(format!(
            "filesystem on image is {}, not FAT32",
            fat_type
        )));
    }

    // Mirroring off means writes go to the active FAT copy only.
    let mirroring = ext_flags & EXT_FLAGS_NO_MIRRORING == 0;
    let mut fat_start_sector = reserved_sectors as u64;
    if !mirroring {
        let active = (ext_flags & EXT_FLAGS_ACTIVE_FAT_MASK) as u64;
        fat_start_sector += active * fat_size_sectors;
    }

    let first_data_sector = reserved_sectors as u64 + num_fats as u64 * fat_size_sectors;

    let geometry = VolumeGeometry {
        bytes_per_sector,
        sectors_per_cluster,
        fat_start_sector,
        fat_size_sectors,
        num_fats,
        mirroring,
        first_data_sector,
        root_cluster,
        cluster_count,
        entries_per_fat_sector: bytes_per_sector / 4,
        dir_entries_per_cluster: bytes_per_sector * sectors_per_cluster / DIR_ENTRY_SIZE as u32,
    };
    debug!(
        "Geometry: {} B/sector, {} sectors/cluster, FAT at sector {} ({} sectors, {} copies, mirroring={}), data at sector {}, root cluster {}, {} clusters",
        geometry.bytes_per_sector,
        geometry.sectors_per_cluster,
        geometry.fat_start_sector,
        geometry.fat_size_sectors,
        geometry.num_fats,
        geometry.mirroring,
        geometry.first_data_sector,
        geometry.root_cluster,
        geometry.cluster_count,
    );
    Ok(geometry)
}
