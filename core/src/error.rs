use thiserror::Error;

#[derive(Debug, Error)]
pub enum DefragError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Short transfer at sector {lba}: {got} of {wanted} sectors")]
    ShortTransfer { lba: u64, got: u32, wanted: u32 },

    #[error("Not a FAT32 filesystem: {0}")]
    NotFat32(String),

    #[error("Malformed boot sector: {0}")]
    BadBootSector(String),

    #[error("Catalog is full ({0} entries)")]
    CatalogFull(usize),

    #[error("Cluster {0} out of range (max {1})")]
    ClusterOutOfRange(u32, u32),

    #[error("FAT access beyond table (sector {0})")]
    FatOutOfRange(u64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Other error: {0}")]
    Other(String),
}
